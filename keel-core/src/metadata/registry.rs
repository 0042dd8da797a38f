use crate::{EntityDef, Error, JoinColumn, PropertyDef, RelationDef, RelationKind, Result, Value};
use convert_case::{Case, Casing};
use std::collections::BTreeMap;

/// Immutable descriptor graph, built once and shared for program lifetime.
///
/// Entity names resolve case-insensitively, the same policy used for
/// property-to-column matching.
#[derive(Debug)]
pub struct Registry {
    entities: BTreeMap<String, EntityDef>,
}

/// Collects entity definitions and validates the graph in one shot.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entities: Vec<EntityDef>,
}

/// Default FK column for a to-one owner: snake_case of `<Target>Id`.
fn default_fk_column(target_entity: &str) -> String {
    format!("{target_entity}Id").to_case(Case::Snake)
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, entity: EntityDef) -> Self {
        self.entities.push(entity);
        self
    }

    /// Validate every invariant and freeze the graph.
    ///
    /// Errors:
    /// - `Mapping` for structural violations (no key, a floating-point
    ///   key, duplicate names, owner side carrying both join column and
    ///   join table, ...).
    /// - `Unsupported` for composite primary keys.
    /// - `UnknownEntity` / `UnknownProperty` / `UnknownRelationship` for
    ///   unresolvable references.
    pub fn build(mut self) -> Result<Registry> {
        for entity in &self.entities {
            validate_entity(entity)?;
        }

        // Key columns, needed to synthesize join column defaults.
        let keys: BTreeMap<String, String> = self
            .entities
            .iter()
            .filter_map(|e| {
                e.primary_key()
                    .map(|k| (e.name().to_ascii_lowercase(), k.column_name().to_string()))
            })
            .collect();

        for entity in &mut self.entities {
            for relation in entity.relations_mut() {
                let target_key = keys.get(&relation.target().to_ascii_lowercase()).cloned();
                synthesize_join_column(relation, target_key);
            }
        }

        let mut entities = BTreeMap::new();
        for entity in self.entities {
            let key = entity.name().to_ascii_lowercase();
            let name = entity.name().to_string();
            if entities.insert(key, entity).is_some() {
                return Err(Error::Mapping(format!(
                    "entity `{name}` is registered twice"
                )));
            }
        }
        let registry = Registry { entities };
        for entity in registry.entities.values() {
            registry.validate_relations(entity)?;
        }
        Ok(registry)
    }
}

fn validate_entity(entity: &EntityDef) -> Result<()> {
    let keys = entity
        .properties()
        .iter()
        .filter(|p| p.is_primary_key())
        .count();
    if keys == 0 {
        return Err(Error::Mapping(format!(
            "entity `{}` declares no primary key",
            entity.name()
        )));
    }
    if keys > 1 {
        return Err(Error::Unsupported(format!(
            "entity `{}` declares a composite primary key",
            entity.name()
        )));
    }
    // Float equality does not line up with any usable hashing of key
    // values (-0.0 == 0.0, NaN != NaN), so such keys cannot index the
    // identity map.
    if entity
        .primary_key()
        .is_some_and(|k| matches!(k.template(), Value::Float32(..) | Value::Float64(..)))
    {
        return Err(Error::Mapping(format!(
            "entity `{}` declares a floating-point primary key",
            entity.name()
        )));
    }
    for (i, property) in entity.properties().iter().enumerate() {
        let rest = &entity.properties()[i + 1..];
        if rest
            .iter()
            .any(|p| p.name().eq_ignore_ascii_case(property.name()))
        {
            return Err(Error::Mapping(format!(
                "entity `{}` declares property `{}` twice",
                entity.name(),
                property.name()
            )));
        }
        if rest
            .iter()
            .any(|p| p.column_name().eq_ignore_ascii_case(property.column_name()))
        {
            return Err(Error::Mapping(format!(
                "entity `{}` maps column `{}` twice",
                entity.name(),
                property.column_name()
            )));
        }
    }
    if let Some(tenant) = entity.tenant_property_name()
        && entity.property_def(tenant).is_none()
    {
        return Err(Error::UnknownProperty {
            entity: entity.name().to_string(),
            property: tenant.to_string(),
        });
    }
    Ok(())
}

/// Fill in FK column defaults on owner to-one sides and resolve empty
/// `referenced` columns to the target key.
fn synthesize_join_column(relation: &mut RelationDef, target_key: Option<String>) {
    let owner_to_one = relation.is_owner()
        && matches!(
            relation.kind(),
            RelationKind::ManyToOne | RelationKind::OneToOne
        );
    if owner_to_one && relation.join_column_def().is_none() {
        relation.set_join_column(JoinColumn::new(default_fk_column(relation.target())));
    }
    if let Some(column) = relation.join_column_def()
        && column.referenced.is_empty()
        && let Some(target_key) = target_key
    {
        let filled = JoinColumn {
            referenced: target_key.into(),
            ..column.clone()
        };
        relation.set_join_column(filled);
    }
}

impl Registry {
    /// Look an entity up by logical name.
    pub fn lookup(&self, name: &str) -> Option<&EntityDef> {
        self.entities.get(&name.to_ascii_lowercase())
    }

    /// Like `lookup` but failing with `UnknownEntity`.
    pub fn require(&self, name: &str) -> Result<&EntityDef> {
        self.lookup(name)
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityDef> {
        self.entities.values()
    }

    /// Ordered column-bearing properties of an entity.
    pub fn column_list<'a>(&self, entity: &'a EntityDef) -> impl Iterator<Item = &'a PropertyDef> {
        entity.properties().iter()
    }

    /// The primary key property; registered entities always have one.
    pub fn key_property<'a>(&self, entity: &'a EntityDef) -> Result<&'a PropertyDef> {
        entity.primary_key().ok_or_else(|| {
            Error::Mapping(format!("entity `{}` has no primary key", entity.name()))
        })
    }

    /// Resolve the FK column name carried by a relationship.
    ///
    /// Owner sides answer from their own join column. Inverse sides walk
    /// `mapped_by` to the matching owner relationship on the target; when
    /// the walk finds nothing (unilateral one-to-many) the column falls back
    /// to `<OwnerEntityName>Id` in column case.
    pub fn foreign_key_for(&self, source: &EntityDef, relation: &RelationDef) -> Result<String> {
        if relation.is_owner() {
            if let Some(column) = relation.join_column_def() {
                return Ok(column.name.to_string());
            }
            if matches!(
                relation.kind(),
                RelationKind::ManyToOne | RelationKind::OneToOne
            ) {
                return Ok(default_fk_column(relation.target()));
            }
        }
        let target = self.require(relation.target())?;
        if let Some(mapped_by) = relation.mapped_by_name() {
            let owner = target.relation_def(mapped_by).ok_or_else(|| {
                Error::UnknownRelationship {
                    entity: target.name().to_string(),
                    relationship: mapped_by.to_string(),
                }
            })?;
            if let Some(column) = owner.join_column_def() {
                return Ok(column.name.to_string());
            }
        }
        if let Some(column) = relation.join_column_def() {
            return Ok(column.name.to_string());
        }
        Ok(default_fk_column(source.name()))
    }

    fn validate_relations(&self, entity: &EntityDef) -> Result<()> {
        for relation in entity.relations() {
            let target = self.require(relation.target())?;
            if relation.mapped_by_name().is_some()
                && (relation.join_column_def().is_some() || relation.join_table_def().is_some())
            {
                return Err(Error::Mapping(format!(
                    "relationship `{}.{}` is an inverse side but carries a physical mapping",
                    entity.name(),
                    relation.name()
                )));
            }
            if relation.is_owner()
                && relation.join_column_def().is_some()
                && relation.join_table_def().is_some()
            {
                return Err(Error::Mapping(format!(
                    "relationship `{}.{}` carries both a join column and a join table",
                    entity.name(),
                    relation.name()
                )));
            }
            if relation.kind() == RelationKind::ManyToMany
                && relation.is_owner()
                && relation.join_table_def().is_none()
            {
                return Err(Error::Mapping(format!(
                    "many-to-many owner `{}.{}` requires a join table",
                    entity.name(),
                    relation.name()
                )));
            }
            if let Some(mapped_by) = relation.mapped_by_name() {
                let owner = target.relation_def(mapped_by).ok_or_else(|| {
                    Error::UnknownRelationship {
                        entity: target.name().to_string(),
                        relationship: mapped_by.to_string(),
                    }
                })?;
                if !owner.is_owner() || !owner.target().eq_ignore_ascii_case(entity.name()) {
                    return Err(Error::Mapping(format!(
                        "`{}.{}` is mapped by `{}.{}` which is not an owner relationship pointing back",
                        entity.name(),
                        relation.name(),
                        target.name(),
                        mapped_by
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cascade, KeyGeneration, Value};

    fn user() -> EntityDef {
        EntityDef::new("User")
            .property(
                PropertyDef::new("Id", Value::Int64(None)).primary_key(KeyGeneration::Identity),
            )
            .property(PropertyDef::new("Username", Value::Varchar(None)))
    }

    fn order() -> EntityDef {
        EntityDef::new("Order")
            .property(
                PropertyDef::new("Id", Value::Int64(None)).primary_key(KeyGeneration::Identity),
            )
            .property(PropertyDef::new("UserId", Value::Int64(None)))
            .relation(RelationDef::many_to_one("User", "User"))
    }

    #[test]
    fn resolves_entities_case_insensitively() {
        let registry = RegistryBuilder::new().register(user()).build().unwrap();
        assert!(registry.lookup("user").is_some());
        assert!(registry.lookup("USER").is_some());
        assert!(matches!(
            registry.require("Missing"),
            Err(Error::UnknownEntity(..))
        ));
    }

    #[test]
    fn synthesizes_default_join_column() {
        let registry = RegistryBuilder::new()
            .register(user())
            .register(order())
            .build()
            .unwrap();
        let order = registry.require("Order").unwrap();
        let relation = order.relation_def("User").unwrap();
        let column = relation.join_column_def().unwrap();
        assert_eq!(column.name, "user_id");
        assert_eq!(column.referenced, "id");
    }

    #[test]
    fn walks_mapped_by_for_inverse_fk() {
        let user = user().relation(
            RelationDef::one_to_many("Orders", "Order")
                .mapped_by("User")
                .cascade(Cascade::PERSIST),
        );
        let registry = RegistryBuilder::new()
            .register(user)
            .register(order())
            .build()
            .unwrap();
        let user = registry.require("User").unwrap();
        let relation = user.relation_def("Orders").unwrap();
        let column = registry.foreign_key_for(user, relation).unwrap();
        assert_eq!(column, "user_id");
    }

    #[test]
    fn rejects_missing_key() {
        let bare = EntityDef::new("Bare").property(PropertyDef::new("A", Value::Int32(None)));
        assert!(matches!(
            RegistryBuilder::new().register(bare).build(),
            Err(Error::Mapping(..))
        ));
    }

    #[test]
    fn rejects_composite_key() {
        let double = EntityDef::new("Double")
            .property(PropertyDef::new("A", Value::Int32(None)).primary_key(KeyGeneration::None))
            .property(PropertyDef::new("B", Value::Int32(None)).primary_key(KeyGeneration::None));
        assert!(matches!(
            RegistryBuilder::new().register(double).build(),
            Err(Error::Unsupported(..))
        ));
    }

    #[test]
    fn rejects_floating_point_keys() {
        let reading = EntityDef::new("Reading")
            .property(
                PropertyDef::new("Id", Value::Float64(None)).primary_key(KeyGeneration::None),
            )
            .property(PropertyDef::new("Celsius", Value::Float32(None)));
        assert!(matches!(
            RegistryBuilder::new().register(reading).build(),
            Err(Error::Mapping(..))
        ));
    }

    #[test]
    fn rejects_unresolvable_target() {
        let dangling = EntityDef::new("Dangling")
            .property(PropertyDef::new("Id", Value::Int64(None)).primary_key(KeyGeneration::None))
            .relation(RelationDef::many_to_one("Ghost", "Ghost"));
        assert!(matches!(
            RegistryBuilder::new().register(dangling).build(),
            Err(Error::UnknownEntity(..))
        ));
    }

    #[test]
    fn rejects_mapped_by_without_back_reference() {
        let left = EntityDef::new("Left")
            .property(PropertyDef::new("Id", Value::Int64(None)).primary_key(KeyGeneration::None))
            .relation(RelationDef::one_to_many("Rights", "Right").mapped_by("Nope"));
        let right = EntityDef::new("Right")
            .property(PropertyDef::new("Id", Value::Int64(None)).primary_key(KeyGeneration::None));
        assert!(matches!(
            RegistryBuilder::new().register(left).register(right).build(),
            Err(Error::UnknownRelationship { .. })
        ));
    }
}
