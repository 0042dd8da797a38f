use crate::Value;
use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

/// Shared handle to a live record.
///
/// The `Rc` identity is what the identity map deduplicates on: two `find`
/// calls for the same key inside one manager yield clones of the same handle.
/// Managers are single-threaded values; parallel managers each own their
/// records.
pub type EntityRef = Rc<RefCell<Record>>;

/// Relationship slot on a record.
#[derive(Debug, Clone, Default)]
pub enum Related {
    #[default]
    Unset,
    One(Option<EntityRef>),
    Many(Vec<EntityRef>),
}

/// A runtime entity instance: property values plus relationship slots.
///
/// Records are untyped on purpose; the registry descriptor carries the type
/// information and the manager validates against it. Property lookups fall
/// back to a case-insensitive match the same way the registry matches
/// properties to columns.
#[derive(Debug, Clone, Default)]
pub struct Record {
    entity: String,
    values: BTreeMap<String, Value>,
    related: BTreeMap<String, Related>,
}

impl Record {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            values: BTreeMap::new(),
            related: BTreeMap::new(),
        }
    }

    /// Logical entity name this record claims to be an instance of.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Builder-style `set`.
    pub fn with(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(property, value);
        self
    }

    pub fn set(&mut self, property: impl Into<String>, value: impl Into<Value>) {
        let property = property.into();
        let key = self
            .values
            .keys()
            .find(|k| k.eq_ignore_ascii_case(&property))
            .cloned()
            .unwrap_or(property);
        self.values.insert(key, value.into());
    }

    pub fn get(&self, property: &str) -> Option<&Value> {
        self.values.get(property).or_else(|| {
            self.values
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(property))
                .map(|(_, v)| v)
        })
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Set a to-one relationship slot.
    pub fn set_related_one(&mut self, relation: impl Into<String>, target: Option<EntityRef>) {
        self.related.insert(relation.into(), Related::One(target));
    }

    /// Set (or replace) a collection relationship slot.
    pub fn set_related_many(&mut self, relation: impl Into<String>, targets: Vec<EntityRef>) {
        self.related.insert(relation.into(), Related::Many(targets));
    }

    /// Append to a collection relationship slot.
    pub fn push_related(&mut self, relation: impl Into<String>, target: EntityRef) {
        let slot = self.related.entry(relation.into()).or_default();
        match slot {
            Related::Many(items) => items.push(target),
            _ => *slot = Related::Many(vec![target]),
        }
    }

    pub fn related(&self, relation: &str) -> &Related {
        const UNSET: &Related = &Related::Unset;
        self.related
            .get(relation)
            .or_else(|| {
                self.related
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(relation))
                    .map(|(_, v)| v)
            })
            .unwrap_or(UNSET)
    }

    /// All populated relationship slots.
    pub fn related_slots(&self) -> impl Iterator<Item = (&str, &Related)> {
        self.related.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Remove an element from a collection slot by handle identity.
    ///
    /// Returns true when something was removed. Used by callers that detach
    /// children before a merge so orphan removal can pick them up.
    pub fn remove_related(&mut self, relation: &str, target: &EntityRef) -> bool {
        let key = self
            .related
            .keys()
            .find(|k| k.eq_ignore_ascii_case(relation))
            .cloned();
        let Some(key) = key else {
            return false;
        };
        match self.related.get_mut(&key) {
            Some(Related::Many(items)) => {
                let before = items.len();
                items.retain(|v| !Rc::ptr_eq(v, target));
                items.len() < before
            }
            Some(Related::One(slot)) => {
                if slot.as_ref().is_some_and(|v| Rc::ptr_eq(v, target)) {
                    *slot = None;
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    /// Wrap into the shared handle form the manager works with.
    pub fn into_ref(self) -> EntityRef {
        Rc::new(RefCell::new(self))
    }
}

impl Related {
    /// Iterate the referenced records, whatever the slot shape.
    pub fn iter(&self) -> impl Iterator<Item = &EntityRef> {
        let slice: &[EntityRef] = match self {
            Related::Unset => &[],
            Related::One(None) => &[],
            Related::One(Some(v)) => std::slice::from_ref(v),
            Related::Many(v) => v,
        };
        slice.iter()
    }
}
