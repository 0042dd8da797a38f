use crate::{PropertyDef, RelationDef};
use convert_case::{Case, Casing};
use std::{borrow::Cow, collections::BTreeMap};

/// Query text registered under a name on an entity.
#[derive(Debug, Clone)]
pub struct NamedQuery {
    pub text: String,
    /// Native SQL, passed to the executor verbatim instead of being parsed.
    pub native: bool,
}

/// Entity specification: the logical entity and its table mapping.
#[derive(Debug, Clone)]
pub struct EntityDef {
    name: Cow<'static, str>,
    table: Cow<'static, str>,
    schema: Cow<'static, str>,
    properties: Vec<PropertyDef>,
    relations: Vec<RelationDef>,
    named_queries: BTreeMap<String, NamedQuery>,
    tenant_property: Option<Cow<'static, str>>,
}

/// Default table name: pluralized snake_case of the entity name.
fn default_table_name(entity: &str) -> String {
    let mut name = entity.to_case(Case::Snake);
    if name.ends_with('y')
        && !name
            .chars()
            .rev()
            .nth(1)
            .is_some_and(|c| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u'))
    {
        name.pop();
        name.push_str("ies");
    } else if name.ends_with('s')
        || name.ends_with('x')
        || name.ends_with('z')
        || name.ends_with("ch")
        || name.ends_with("sh")
    {
        name.push_str("es");
    } else {
        name.push('s');
    }
    name
}

impl EntityDef {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        let name = name.into();
        let table = default_table_name(&name);
        Self {
            name,
            table: table.into(),
            schema: "".into(),
            properties: Vec::new(),
            relations: Vec::new(),
            named_queries: BTreeMap::new(),
            tenant_property: None,
        }
    }

    pub fn table(mut self, table: impl Into<Cow<'static, str>>) -> Self {
        self.table = table.into();
        self
    }

    pub fn schema(mut self, schema: impl Into<Cow<'static, str>>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    pub fn relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn named_query(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.named_queries.insert(
            name.into(),
            NamedQuery {
                text: text.into(),
                native: false,
            },
        );
        self
    }

    pub fn native_named_query(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.named_queries.insert(
            name.into(),
            NamedQuery {
                text: text.into(),
                native: true,
            },
        );
        self
    }

    /// Designate the property holding the tenant discriminator.
    pub fn tenant(mut self, property: impl Into<Cow<'static, str>>) -> Self {
        self.tenant_property = Some(property.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn schema_name(&self) -> &str {
        &self.schema
    }

    /// Properties in declaration order.
    pub fn properties(&self) -> &[PropertyDef] {
        &self.properties
    }

    pub fn relations(&self) -> &[RelationDef] {
        &self.relations
    }

    /// Property lookup, case-insensitive like column matching.
    pub fn property_def(&self, name: &str) -> Option<&PropertyDef> {
        self.properties
            .iter()
            .find(|p| p.name() == name)
            .or_else(|| {
                self.properties
                    .iter()
                    .find(|p| p.name().eq_ignore_ascii_case(name))
            })
    }

    pub fn property_by_column(&self, column: &str) -> Option<&PropertyDef> {
        self.properties
            .iter()
            .find(|p| p.column_name().eq_ignore_ascii_case(column))
    }

    pub fn relation_def(&self, name: &str) -> Option<&RelationDef> {
        self.relations
            .iter()
            .find(|r| r.name() == name)
            .or_else(|| {
                self.relations
                    .iter()
                    .find(|r| r.name().eq_ignore_ascii_case(name))
            })
    }

    /// The single primary key property, when declared.
    pub fn primary_key(&self) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.is_primary_key())
    }

    /// Relationships with at least one cascade flag set.
    pub fn cascade_relations(&self) -> impl Iterator<Item = &RelationDef> {
        self.relations
            .iter()
            .filter(|r| !r.cascade_flags().is_empty())
    }

    pub fn tenant_property_name(&self) -> Option<&str> {
        self.tenant_property.as_deref()
    }

    pub fn tenant_property_def(&self) -> Option<&PropertyDef> {
        self.tenant_property
            .as_deref()
            .and_then(|name| self.property_def(name))
    }

    pub fn named_query_def(&self, name: &str) -> Option<&NamedQuery> {
        self.named_queries.get(name)
    }

    pub(crate) fn relations_mut(&mut self) -> &mut [RelationDef] {
        &mut self.relations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_name_defaults() {
        assert_eq!(EntityDef::new("User").table_name(), "users");
        assert_eq!(EntityDef::new("TestCustomer").table_name(), "test_customers");
        assert_eq!(EntityDef::new("Company").table_name(), "companies");
        assert_eq!(EntityDef::new("Employee").table_name(), "employees");
        assert_eq!(EntityDef::new("Address").table_name(), "addresses");
        assert_eq!(EntityDef::new("Day").table_name(), "days");
    }
}
