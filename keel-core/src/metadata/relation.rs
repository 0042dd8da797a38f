use std::{borrow::Cow, ops::BitOr};

/// Relationship shape between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    ManyToOne,
    OneToMany,
    OneToOne,
    ManyToMany,
}

impl RelationKind {
    /// Collection-valued on this side.
    pub fn is_collection(&self) -> bool {
        matches!(self, RelationKind::OneToMany | RelationKind::ManyToMany)
    }
}

/// When related records are loaded.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    Eager,
    #[default]
    Lazy,
}

/// Which lifecycle operations propagate across a relationship.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Cascade {
    pub persist: bool,
    pub merge: bool,
    pub remove: bool,
}

impl Cascade {
    pub const NONE: Cascade = Cascade {
        persist: false,
        merge: false,
        remove: false,
    };
    pub const PERSIST: Cascade = Cascade {
        persist: true,
        merge: false,
        remove: false,
    };
    pub const MERGE: Cascade = Cascade {
        persist: false,
        merge: true,
        remove: false,
    };
    pub const REMOVE: Cascade = Cascade {
        persist: false,
        merge: false,
        remove: true,
    };
    pub const ALL: Cascade = Cascade {
        persist: true,
        merge: true,
        remove: true,
    };

    pub fn is_empty(&self) -> bool {
        !(self.persist || self.merge || self.remove)
    }
}

impl BitOr for Cascade {
    type Output = Cascade;
    fn bitor(self, rhs: Cascade) -> Cascade {
        Cascade {
            persist: self.persist || rhs.persist,
            merge: self.merge || rhs.merge,
            remove: self.remove || rhs.remove,
        }
    }
}

/// Foreign key column on the owner side of a to-one relationship (or on the
/// target side of a unilateral one-to-many).
#[derive(Debug, Clone)]
pub struct JoinColumn {
    pub name: Cow<'static, str>,
    /// Column referenced on the target table; empty means the target's key.
    pub referenced: Cow<'static, str>,
    pub nullable: bool,
    pub unique: bool,
    pub insertable: bool,
    pub updatable: bool,
}

impl JoinColumn {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            referenced: "".into(),
            nullable: true,
            unique: false,
            insertable: true,
            updatable: true,
        }
    }

    pub fn referenced(mut self, column: impl Into<Cow<'static, str>>) -> Self {
        self.referenced = column.into();
        self
    }

    pub fn not_nullable(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Join table carrying a many-to-many association (owner side only).
#[derive(Debug, Clone)]
pub struct JoinTable {
    pub name: Cow<'static, str>,
    pub schema: Cow<'static, str>,
    /// FK column referencing the owner entity's key.
    pub owner_column: Cow<'static, str>,
    /// FK column referencing the target entity's key.
    pub inverse_column: Cow<'static, str>,
}

impl JoinTable {
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        owner_column: impl Into<Cow<'static, str>>,
        inverse_column: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            name: name.into(),
            schema: "".into(),
            owner_column: owner_column.into(),
            inverse_column: inverse_column.into(),
        }
    }

    pub fn schema(mut self, schema: impl Into<Cow<'static, str>>) -> Self {
        self.schema = schema.into();
        self
    }
}

/// Relationship specification on one entity side.
///
/// The owner side is the one physically holding the foreign key (or the join
/// table); `mapped_by` marks the inverse side and names the owner
/// relationship on the target entity.
#[derive(Debug, Clone)]
pub struct RelationDef {
    name: Cow<'static, str>,
    kind: RelationKind,
    target: Cow<'static, str>,
    mapped_by: Option<Cow<'static, str>>,
    join_column: Option<JoinColumn>,
    join_table: Option<JoinTable>,
    fetch: FetchMode,
    cascade: Cascade,
    orphan_removal: bool,
}

impl RelationDef {
    fn new(name: impl Into<Cow<'static, str>>, kind: RelationKind, target: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            kind,
            target: target.into(),
            mapped_by: None,
            join_column: None,
            join_table: None,
            fetch: FetchMode::default(),
            cascade: Cascade::NONE,
            orphan_removal: false,
        }
    }

    pub fn many_to_one(
        name: impl Into<Cow<'static, str>>,
        target: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::new(name, RelationKind::ManyToOne, target)
    }

    pub fn one_to_many(
        name: impl Into<Cow<'static, str>>,
        target: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::new(name, RelationKind::OneToMany, target)
    }

    pub fn one_to_one(
        name: impl Into<Cow<'static, str>>,
        target: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::new(name, RelationKind::OneToOne, target)
    }

    pub fn many_to_many(
        name: impl Into<Cow<'static, str>>,
        target: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::new(name, RelationKind::ManyToMany, target)
    }

    /// Mark this as the inverse side, naming the owner relationship on the
    /// target entity.
    pub fn mapped_by(mut self, property: impl Into<Cow<'static, str>>) -> Self {
        self.mapped_by = Some(property.into());
        self
    }

    pub fn join_column(mut self, join_column: JoinColumn) -> Self {
        self.join_column = Some(join_column);
        self
    }

    pub fn join_table(mut self, join_table: JoinTable) -> Self {
        self.join_table = Some(join_table);
        self
    }

    pub fn fetch(mut self, fetch: FetchMode) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn cascade(mut self, cascade: Cascade) -> Self {
        self.cascade = cascade;
        self
    }

    /// Delete collection elements dropped from a managed parent on merge.
    pub fn orphan_removal(mut self) -> Self {
        self.orphan_removal = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Owner iff no `mapped_by`.
    pub fn is_owner(&self) -> bool {
        self.mapped_by.is_none()
    }

    pub fn mapped_by_name(&self) -> Option<&str> {
        self.mapped_by.as_deref()
    }

    pub fn join_column_def(&self) -> Option<&JoinColumn> {
        self.join_column.as_ref()
    }

    pub fn join_table_def(&self) -> Option<&JoinTable> {
        self.join_table.as_ref()
    }

    pub fn fetch_mode(&self) -> FetchMode {
        self.fetch
    }

    pub fn cascade_flags(&self) -> Cascade {
        self.cascade
    }

    pub fn is_orphan_removal(&self) -> bool {
        self.orphan_removal
    }

    pub(crate) fn set_join_column(&mut self, join_column: JoinColumn) {
        self.join_column = Some(join_column);
    }
}
