use crate::Value;
use convert_case::{Case, Casing};
use std::borrow::Cow;

/// How a primary key obtains its value.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum KeyGeneration {
    /// The caller is expected to set the key (no generation involved).
    #[default]
    None,
    /// Backend identity/autoincrement column, read back after insert.
    Identity,
    /// Backend sequence, read back after insert.
    Sequence,
    /// Client-side UUID, generated right before insert.
    Uuid,
    /// Application-assigned: the key must be present when persisting.
    Application,
}

impl KeyGeneration {
    /// True when the backend produces the value during the insert.
    pub fn is_database_generated(&self) -> bool {
        matches!(self, KeyGeneration::Identity | KeyGeneration::Sequence)
    }
}

/// Property specification: one entity property mapped onto one column.
#[derive(Debug, Clone)]
pub struct PropertyDef {
    name: Cow<'static, str>,
    column: Cow<'static, str>,
    template: Value,
    nullable: bool,
    length: Option<u32>,
    primary_key: bool,
    generation: KeyGeneration,
    insertable: bool,
    updatable: bool,
}

impl PropertyDef {
    /// New property with the default column name (snake_case of the
    /// property name) and a type template.
    pub fn new(name: impl Into<Cow<'static, str>>, template: Value) -> Self {
        let name = name.into();
        let column = name.to_case(Case::Snake);
        Self {
            name,
            column: column.into(),
            template,
            nullable: false,
            length: None,
            primary_key: false,
            generation: KeyGeneration::None,
            insertable: true,
            updatable: true,
        }
    }

    /// Override the mapped column name.
    pub fn column(mut self, column: impl Into<Cow<'static, str>>) -> Self {
        self.column = column.into();
        self
    }

    /// Mark as the primary key. Keys are never updatable; identity and
    /// sequence keys are not insertable either (the backend fills them).
    pub fn primary_key(mut self, generation: KeyGeneration) -> Self {
        self.primary_key = true;
        self.generation = generation;
        self.updatable = false;
        self.insertable = !generation.is_database_generated();
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn insertable(mut self, insertable: bool) -> Self {
        self.insertable = insertable;
        self
    }

    pub fn updatable(mut self, updatable: bool) -> Self {
        self.updatable = updatable;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_name(&self) -> &str {
        &self.column
    }

    /// Type template (a `Value` with no value inside).
    pub fn template(&self) -> &Value {
        &self.template
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn generation(&self) -> KeyGeneration {
        self.generation
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn max_length(&self) -> Option<u32> {
        self.length
    }

    pub fn is_insertable(&self) -> bool {
        self.insertable
    }

    pub fn is_updatable(&self) -> bool {
        self.updatable
    }
}
