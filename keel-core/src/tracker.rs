use crate::{EntityDef, EntityRef, Value};
use std::{
    collections::{BTreeMap, HashMap},
    rc::Rc,
};

/// Lifecycle state of a record inside one entity manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// Known but never flushed; the state of a record queued by `persist`.
    Transient,
    /// Attached to the identity map with a snapshot.
    Managed,
    /// Queued for deletion.
    Removed,
    /// Evicted; the manager no longer tracks it.
    Detached,
}

/// Deferred mutation kind. Priorities order a flush: inserts, then updates,
/// then deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
}

impl OperationKind {
    pub fn priority(&self) -> u8 {
        match self {
            OperationKind::Insert => 1,
            OperationKind::Update => 2,
            OperationKind::Delete => 3,
        }
    }
}

/// One queued mutation.
#[derive(Debug, Clone)]
pub struct QueuedOperation {
    pub kind: OperationKind,
    pub entity: EntityRef,
    pub sequence: u64,
}

/// Pending many-to-many association row.
#[derive(Debug, Clone)]
pub struct LinkOperation {
    pub owner: EntityRef,
    pub target: EntityRef,
    pub relation: String,
}

#[derive(Debug, Default)]
struct Tracked {
    state: Option<EntityState>,
    snapshot: BTreeMap<String, Value>,
    relation_snapshot: BTreeMap<String, Vec<Value>>,
}

/// Identity map plus the ordered queued-operation log.
///
/// No operation executes against the database from here; the entity
/// manager's flush is the only consumer of [`ChangeTracker::flush_order`].
#[derive(Debug, Default)]
pub struct ChangeTracker {
    identity: HashMap<(String, Value), EntityRef>,
    tracked: HashMap<usize, (EntityRef, Tracked)>,
    queue: Vec<QueuedOperation>,
    links: Vec<LinkOperation>,
    sequence: u64,
}

fn handle_key(record: &EntityRef) -> usize {
    Rc::as_ptr(record) as usize
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, record: &EntityRef) -> &mut Tracked {
        &mut self
            .tracked
            .entry(handle_key(record))
            .or_insert_with(|| (record.clone(), Tracked::default()))
            .1
    }

    /// Install a record as `Managed` and snapshot its column values.
    pub fn attach(&mut self, entity: &EntityDef, record: &EntityRef) {
        let snapshot = column_snapshot(entity, record);
        let tracked = self.entry(record);
        tracked.state = Some(EntityState::Managed);
        tracked.snapshot = snapshot;
    }

    /// Current state; records never seen are `Transient`.
    pub fn state(&self, record: &EntityRef) -> EntityState {
        self.tracked
            .get(&handle_key(record))
            .and_then(|(_, t)| t.state)
            .unwrap_or(EntityState::Transient)
    }

    pub fn set_state(&mut self, record: &EntityRef, state: EntityState) {
        self.entry(record).state = Some(state);
    }

    /// Refresh the column snapshot after a successful write.
    pub fn refresh_snapshot(&mut self, entity: &EntityDef, record: &EntityRef) {
        let snapshot = column_snapshot(entity, record);
        self.entry(record).snapshot = snapshot;
    }

    /// Record the key set of a collection relationship for later orphan
    /// detection.
    pub fn set_relation_snapshot(&mut self, record: &EntityRef, relation: &str, keys: Vec<Value>) {
        self.entry(record)
            .relation_snapshot
            .insert(relation.to_string(), keys);
    }

    pub fn relation_snapshot(&self, record: &EntityRef, relation: &str) -> Option<&[Value]> {
        self.tracked
            .get(&handle_key(record))
            .and_then(|(_, t)| t.relation_snapshot.get(relation))
            .map(Vec::as_slice)
    }

    /// Compare current updatable column values against the snapshot.
    pub fn is_dirty(&self, entity: &EntityDef, record: &EntityRef) -> bool {
        !self.dirty_columns(entity, record).is_empty()
    }

    /// Column names whose current value differs from the snapshot,
    /// updatable columns only, in declaration order.
    pub fn dirty_columns(&self, entity: &EntityDef, record: &EntityRef) -> Vec<String> {
        let Some((_, tracked)) = self.tracked.get(&handle_key(record)) else {
            return Vec::new();
        };
        let record = record.borrow();
        entity
            .properties()
            .iter()
            .filter(|p| p.is_updatable())
            .filter(|p| {
                let current = record.get(p.name()).cloned().unwrap_or(Value::Null);
                let previous = tracked
                    .snapshot
                    .get(p.name())
                    .cloned()
                    .unwrap_or(Value::Null);
                current != previous
            })
            .map(|p| p.column_name().to_string())
            .collect()
    }

    /// Queue a mutation, coalescing against what is already queued:
    /// a repeated insert collapses, an update folds into a pending insert,
    /// and a delete annihilates a pending insert entirely.
    pub fn enqueue(&mut self, kind: OperationKind, record: &EntityRef) {
        let same = |op: &QueuedOperation| Rc::ptr_eq(&op.entity, record);
        match kind {
            OperationKind::Insert => {
                if self
                    .queue
                    .iter()
                    .any(|op| same(op) && op.kind == OperationKind::Insert)
                {
                    return;
                }
            }
            OperationKind::Update => {
                if self.queue.iter().any(|op| {
                    same(op)
                        && matches!(op.kind, OperationKind::Insert | OperationKind::Update)
                }) {
                    return;
                }
            }
            OperationKind::Delete => {
                if self
                    .queue
                    .iter()
                    .any(|op| same(op) && op.kind == OperationKind::Insert)
                {
                    // Never flushed: the row does not exist, drop everything.
                    self.queue.retain(|op| !same(op));
                    self.links
                        .retain(|l| !Rc::ptr_eq(&l.owner, record) && !Rc::ptr_eq(&l.target, record));
                    return;
                }
                if self
                    .queue
                    .iter()
                    .any(|op| same(op) && op.kind == OperationKind::Delete)
                {
                    return;
                }
            }
        }
        self.sequence += 1;
        self.queue.push(QueuedOperation {
            kind,
            entity: record.clone(),
            sequence: self.sequence,
        });
    }

    pub fn push_link(&mut self, link: LinkOperation) {
        let exists = self.links.iter().any(|l| {
            Rc::ptr_eq(&l.owner, &link.owner)
                && Rc::ptr_eq(&l.target, &link.target)
                && l.relation == link.relation
        });
        if !exists {
            self.links.push(link);
        }
    }

    pub fn take_links(&mut self) -> Vec<LinkOperation> {
        std::mem::take(&mut self.links)
    }

    pub fn restore_links(&mut self, links: Vec<LinkOperation>) {
        self.links = links;
    }

    /// The queued operations sorted by `(priority, sequence)`: inserts
    /// before updates before deletes, FIFO within each class.
    pub fn flush_order(&self) -> Vec<QueuedOperation> {
        let mut operations = self.queue.clone();
        operations.sort_by_key(|op| (op.kind.priority(), op.sequence));
        operations
    }

    pub fn queued(&self) -> &[QueuedOperation] {
        &self.queue
    }

    /// Drop the given sequence numbers from the queue (the successfully
    /// executed prefix of a failed immediate-mode flush).
    pub fn remove_sequences(&mut self, sequences: &[u64]) {
        self.queue.retain(|op| !sequences.contains(&op.sequence));
    }

    /// Empty the operation log, typically on commit or rollback.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.links.clear();
    }

    pub fn identity_get(&self, entity: &str, key: &Value) -> Option<EntityRef> {
        self.identity
            .get(&(entity.to_ascii_lowercase(), key.clone()))
            .cloned()
    }

    pub fn identity_insert(&mut self, entity: &str, key: Value, record: EntityRef) {
        self.identity
            .insert((entity.to_ascii_lowercase(), key), record);
    }

    pub fn identity_remove(&mut self, entity: &str, key: &Value) {
        self.identity
            .remove(&(entity.to_ascii_lowercase(), key.clone()));
    }

    /// Evict everything: identity map, snapshots and the queue.
    pub fn detach_all(&mut self) {
        for (_, (_, tracked)) in self.tracked.iter_mut() {
            tracked.state = Some(EntityState::Detached);
        }
        self.identity.clear();
        self.clear();
    }
}

fn column_snapshot(entity: &EntityDef, record: &EntityRef) -> BTreeMap<String, Value> {
    let record = record.borrow();
    entity
        .properties()
        .iter()
        .map(|p| {
            (
                p.name().to_string(),
                record.get(p.name()).cloned().unwrap_or(Value::Null),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{KeyGeneration, PropertyDef, Record};

    fn sample_entity() -> EntityDef {
        EntityDef::new("Thing")
            .property(
                PropertyDef::new("Id", Value::Int64(None)).primary_key(KeyGeneration::Identity),
            )
            .property(PropertyDef::new("Name", Value::Varchar(None)))
    }

    fn record(name: &str) -> EntityRef {
        Record::new("Thing").with("Name", name).into_ref()
    }

    #[test]
    fn flush_order_sorts_by_priority_then_fifo() {
        let mut tracker = ChangeTracker::new();
        let a = record("a");
        let b = record("b");
        let c = record("c");
        let d = record("d");
        tracker.enqueue(OperationKind::Update, &a);
        tracker.enqueue(OperationKind::Delete, &b);
        tracker.enqueue(OperationKind::Insert, &c);
        tracker.enqueue(OperationKind::Insert, &d);
        let order: Vec<OperationKind> = tracker.flush_order().iter().map(|op| op.kind).collect();
        assert_eq!(
            order,
            vec![
                OperationKind::Insert,
                OperationKind::Insert,
                OperationKind::Update,
                OperationKind::Delete,
            ]
        );
        // FIFO within the insert class.
        let inserts: Vec<u64> = tracker
            .flush_order()
            .iter()
            .filter(|op| op.kind == OperationKind::Insert)
            .map(|op| op.sequence)
            .collect();
        assert!(inserts[0] < inserts[1]);
    }

    #[test]
    fn duplicate_insert_coalesces() {
        let mut tracker = ChangeTracker::new();
        let a = record("a");
        tracker.enqueue(OperationKind::Insert, &a);
        tracker.enqueue(OperationKind::Insert, &a);
        assert_eq!(tracker.queued().len(), 1);
    }

    #[test]
    fn update_folds_into_pending_insert() {
        let mut tracker = ChangeTracker::new();
        let a = record("a");
        tracker.enqueue(OperationKind::Insert, &a);
        tracker.enqueue(OperationKind::Update, &a);
        assert_eq!(tracker.queued().len(), 1);
        assert_eq!(tracker.queued()[0].kind, OperationKind::Insert);
    }

    #[test]
    fn delete_annihilates_pending_insert() {
        let mut tracker = ChangeTracker::new();
        let a = record("a");
        let b = record("b");
        tracker.enqueue(OperationKind::Insert, &a);
        tracker.enqueue(OperationKind::Insert, &b);
        tracker.enqueue(OperationKind::Delete, &a);
        assert_eq!(tracker.queued().len(), 1);
        assert!(Rc::ptr_eq(&tracker.queued()[0].entity, &b));
    }

    #[test]
    fn dirty_tracking_respects_updatable_columns() {
        let entity = sample_entity();
        let mut tracker = ChangeTracker::new();
        let a = record("before");
        a.borrow_mut().set("Id", 7i64);
        tracker.attach(&entity, &a);
        assert!(!tracker.is_dirty(&entity, &a));
        a.borrow_mut().set("Name", "after");
        assert_eq!(tracker.dirty_columns(&entity, &a), vec!["name"]);
        // The key is not updatable: changing it does not mark dirty.
        a.borrow_mut().set("Name", "before");
        a.borrow_mut().set("Id", 9i64);
        assert!(!tracker.is_dirty(&entity, &a));
    }

    #[test]
    fn identity_map_is_keyed_by_entity_and_key() {
        let mut tracker = ChangeTracker::new();
        let a = record("a");
        tracker.identity_insert("Thing", Value::Int64(Some(1)), a.clone());
        let hit = tracker.identity_get("thing", &Value::Int64(Some(1)));
        assert!(hit.is_some_and(|h| Rc::ptr_eq(&h, &a)));
        assert!(tracker.identity_get("Thing", &Value::Int64(Some(2))).is_none());
        tracker.identity_remove("THING", &Value::Int64(Some(1)));
        assert!(tracker.identity_get("Thing", &Value::Int64(Some(1))).is_none());
    }
}
