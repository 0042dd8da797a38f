use crate::{
    ChangeTracker, Command, CommandExecutor, Dialect, EntityDef, EntityRef, EntityState, Error,
    FetchMode, Isolation, KeyGeneration, LinkOperation, OperationKind, QueryHandle, QueryOutcome,
    QueuedOperation, Record, Registry, RelationKind, RenderedSql, Result, RowLabeled,
    RowsAffected, TENANT_PARAMETER, TenantContext, Value, delete_by_key_statement,
    insert_statement, link_delete_statement, link_insert_statement, select_by_key_statement,
    stream::StreamExt, update_by_key_statement,
};
use futures::{TryStreamExt, pin_mut};
use std::{rc::Rc, sync::Arc};
use uuid::Uuid;

/// The unit-of-work façade.
///
/// One manager owns one executor (connection) and one change tracker. It is
/// a single-threaded value: records are shared `Rc` handles, so a manager
/// and its futures stay on the thread that created them; run parallel
/// managers on their own threads, each with its own connection.
///
/// Mutations queue while a transaction is armed and flush on commit in
/// `(priority, sequence)` order; outside a transaction each mutation
/// flushes immediately and generated keys are resolved before the call
/// returns.
pub struct EntityManager<E: CommandExecutor> {
    registry: Arc<Registry>,
    executor: E,
    dialect: Dialect,
    tracker: ChangeTracker,
    transactional: bool,
}

impl<E: CommandExecutor> EntityManager<E> {
    pub fn new(registry: Arc<Registry>, executor: E, dialect: Dialect) -> Self {
        Self {
            registry,
            executor,
            dialect,
            tracker: ChangeTracker::new(),
            transactional: false,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Lifecycle state of a record as this manager sees it.
    pub fn state_of(&self, record: &EntityRef) -> EntityState {
        self.tracker.state(record)
    }

    pub fn is_transactional(&self) -> bool {
        self.transactional
    }

    /// Queued operations, in flush order. Mostly useful for diagnostics.
    pub fn pending_operations(&self) -> Vec<QueuedOperation> {
        self.tracker.flush_order()
    }

    // ------------------------------------------------------------------
    // Lifecycle operations.

    /// Schedule a record (and its cascade-persist closure) for insertion.
    ///
    /// Populates the tenant column from the ambient context, generates
    /// client-side keys, and outside a transaction flushes immediately so
    /// the generated key is available on return.
    pub async fn persist(&mut self, record: &EntityRef) -> Result<()> {
        let mut visited = Vec::new();
        self.persist_recursive(record, &mut visited)?;
        if !self.transactional {
            self.flush().await?;
        }
        Ok(())
    }

    /// Synchronize a managed record: queue an update when dirty, delete
    /// orphaned collection elements, cascade to merge-flagged relations.
    ///
    /// Errors with `CrossTenantViolation` before queuing anything when the
    /// record belongs to a different tenant than the ambient one.
    pub async fn merge(&mut self, record: &EntityRef) -> Result<()> {
        let mut visited = Vec::new();
        self.merge_recursive(record, &mut visited)?;
        if !self.transactional {
            self.flush().await?;
        }
        Ok(())
    }

    /// Schedule deletion, cascading depth-first so children drop before
    /// their parent.
    pub async fn remove(&mut self, record: &EntityRef) -> Result<()> {
        let mut visited = Vec::new();
        self.remove_recursive(record, &mut visited)?;
        if !self.transactional {
            self.flush().await?;
        }
        Ok(())
    }

    /// Single-row lookup by primary key.
    ///
    /// An identity-map hit short-circuits without touching the executor;
    /// otherwise the row is selected (tenant-filtered when applicable),
    /// attached and returned. A missing row is `Ok(None)`.
    pub async fn find(&mut self, entity: &str, key: impl Into<Value>) -> Result<Option<EntityRef>> {
        let key = key.into();
        let registry = Arc::clone(&self.registry);
        let entity = registry.require(entity)?;
        if let Some(existing) = self.tracker.identity_get(entity.name(), &key) {
            return Ok(Some(existing));
        }
        let tenant = TenantContext::current();
        let tenant_filter = entity.tenant_property_def().is_some() && tenant.is_some();
        let statement = select_by_key_statement(&registry, entity, self.dialect, tenant_filter)?;
        let mut command = Command::new(statement.sql.clone());
        for name in &statement.parameters {
            let value = if name == TENANT_PARAMETER {
                Value::from(tenant.clone().unwrap_or_default())
            } else {
                key.clone()
            };
            command.params.push((name.clone(), value));
        }
        let rows = self.fetch_rows(command).await?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        let values: Vec<(String, Value)> = entity
            .properties()
            .iter()
            .map(|p| {
                (
                    p.name().to_string(),
                    row.get(p.name()).cloned().unwrap_or(Value::Null),
                )
            })
            .collect();
        let record = self.adopt_row(entity.name(), values)?;
        Ok(Some(record))
    }

    /// Parse query text into a handle bound to this manager's metadata.
    /// Lex and parse failures surface here; name resolution failures
    /// surface on first execution.
    pub fn create_query(&self, text: &str) -> Result<QueryHandle> {
        QueryHandle::from_text(text)
    }

    /// Resolve a named query registered on an entity.
    pub fn create_named_query(&self, entity: &str, name: &str) -> Result<QueryHandle> {
        let entity = self.registry.require(entity)?;
        let named = entity.named_query_def(name).ok_or_else(|| {
            Error::Mapping(format!(
                "entity `{}` has no named query `{name}`",
                entity.name()
            ))
        })?;
        if named.native {
            Ok(QueryHandle::native(&named.text, entity.name()))
        } else {
            QueryHandle::from_text(&named.text)
        }
    }

    // ------------------------------------------------------------------
    // Transactions and flushing.

    /// Open a transaction and arm deferred mode. Transactions nest at most
    /// one deep.
    pub async fn begin_transaction(&mut self, isolation: Isolation) -> Result<()> {
        if self.transactional {
            return Err(Error::executor("a transaction is already open"));
        }
        self.executor.begin(isolation).await?;
        self.transactional = true;
        Ok(())
    }

    /// Flush the queue under the open transaction and commit it.
    ///
    /// A flush failure propagates without committing; the caller decides
    /// whether to roll back.
    pub async fn commit(&mut self) -> Result<()> {
        if !self.transactional {
            return Err(Error::executor("no open transaction to commit"));
        }
        self.flush().await?;
        self.executor.commit().await?;
        self.transactional = false;
        Ok(())
    }

    /// Discard the queue and roll the open transaction back.
    pub async fn rollback(&mut self) -> Result<()> {
        if !self.transactional {
            return Err(Error::executor("no open transaction to roll back"));
        }
        self.tracker.clear();
        self.executor.rollback().await?;
        self.transactional = false;
        Ok(())
    }

    /// Run every queued operation in `(priority, sequence)` order: inserts,
    /// then association links, then updates, then deletes.
    ///
    /// After each insert the generated key is written back into the
    /// record. Errors propagate without retry; outside a transaction only
    /// the successfully executed prefix leaves the queue.
    pub async fn flush(&mut self) -> Result<()> {
        let operations = self.tracker.flush_order();
        let mut executed: Vec<u64> = Vec::new();
        let mut links_pending = true;
        for operation in &operations {
            if links_pending && operation.kind != OperationKind::Insert {
                if let Err(error) = self.flush_links().await {
                    return self.fail_flush(&executed, error);
                }
                links_pending = false;
            }
            match self.apply_operation(operation).await {
                Ok(()) => executed.push(operation.sequence),
                Err(error) => return self.fail_flush(&executed, error),
            }
        }
        if links_pending
            && let Err(error) = self.flush_links().await
        {
            return self.fail_flush(&executed, error);
        }
        for operation in &operations {
            if operation.kind != OperationKind::Delete {
                self.refresh_relation_snapshot(&operation.entity)?;
            }
        }
        self.tracker.clear();
        Ok(())
    }

    /// Evict every tracked record and drop the queue.
    pub fn clear(&mut self) {
        self.tracker.detach_all();
    }

    // ------------------------------------------------------------------
    // Cascade recursion.

    fn persist_recursive(&mut self, record: &EntityRef, visited: &mut Vec<usize>) -> Result<()> {
        let pointer = Rc::as_ptr(record) as usize;
        if visited.contains(&pointer) {
            return Ok(());
        }
        visited.push(pointer);

        let registry = Arc::clone(&self.registry);
        let name = record.borrow().entity().to_string();
        let entity = registry.require(&name)?;

        if let Some(property) = entity.tenant_property_def()
            && let Some(tenant) = TenantContext::current()
        {
            let missing = record
                .borrow()
                .get(property.name())
                .is_none_or(Value::is_null);
            if missing {
                record.borrow_mut().set(property.name().to_string(), tenant);
            }
        }

        let key = registry.key_property(entity)?;
        let key_missing = record.borrow().get(key.name()).is_none_or(Value::is_null);
        match key.generation() {
            KeyGeneration::Uuid if key_missing => {
                record
                    .borrow_mut()
                    .set(key.name().to_string(), Uuid::new_v4());
            }
            KeyGeneration::Application | KeyGeneration::None if key_missing => {
                return Err(Error::executor(format!(
                    "`{name}` requires an application-assigned key before persist"
                )));
            }
            _ => {}
        }

        match self.tracker.state(record) {
            EntityState::Managed => {}
            _ => self.tracker.enqueue(OperationKind::Insert, record),
        }

        for relation in entity.cascade_relations() {
            if !relation.cascade_flags().persist {
                continue;
            }
            let children: Vec<EntityRef> = record
                .borrow()
                .related(relation.name())
                .iter()
                .cloned()
                .collect();
            for child in children {
                self.persist_recursive(&child, visited)?;
                if relation.kind() == RelationKind::ManyToMany {
                    self.tracker.push_link(LinkOperation {
                        owner: record.clone(),
                        target: child.clone(),
                        relation: relation.name().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn merge_recursive(&mut self, record: &EntityRef, visited: &mut Vec<usize>) -> Result<()> {
        let pointer = Rc::as_ptr(record) as usize;
        if visited.contains(&pointer) {
            return Ok(());
        }
        visited.push(pointer);

        let registry = Arc::clone(&self.registry);
        let name = record.borrow().entity().to_string();
        let entity = registry.require(&name)?;
        self.check_tenant(entity, record)?;

        if self.tracker.state(record) == EntityState::Managed
            && self.tracker.is_dirty(entity, record)
        {
            self.tracker.enqueue(OperationKind::Update, record);
        }

        for relation in entity.relations() {
            if !relation.is_orphan_removal() || !relation.kind().is_collection() {
                continue;
            }
            let target = registry.require(relation.target())?;
            let target_key = registry.key_property(target)?;
            let current: Vec<Value> = record
                .borrow()
                .related(relation.name())
                .iter()
                .filter_map(|child| child.borrow().get(target_key.name()).cloned())
                .filter(|v| !v.is_null())
                .collect();
            let snapshot: Vec<Value> = self
                .tracker
                .relation_snapshot(record, relation.name())
                .map(<[Value]>::to_vec)
                .unwrap_or_default();
            for orphan_key in snapshot.into_iter().filter(|k| !current.contains(k)) {
                let orphan = self
                    .tracker
                    .identity_get(target.name(), &orphan_key)
                    .unwrap_or_else(|| {
                        Record::new(target.name().to_string())
                            .with(target_key.name().to_string(), orphan_key.clone())
                            .into_ref()
                    });
                self.tracker.set_state(&orphan, EntityState::Removed);
                self.tracker.enqueue(OperationKind::Delete, &orphan);
            }
        }

        for relation in entity.cascade_relations() {
            if !relation.cascade_flags().merge {
                continue;
            }
            let children: Vec<EntityRef> = record
                .borrow()
                .related(relation.name())
                .iter()
                .cloned()
                .collect();
            for child in children {
                self.merge_recursive(&child, visited)?;
            }
        }
        Ok(())
    }

    fn remove_recursive(&mut self, record: &EntityRef, visited: &mut Vec<usize>) -> Result<()> {
        let pointer = Rc::as_ptr(record) as usize;
        if visited.contains(&pointer) {
            return Ok(());
        }
        visited.push(pointer);

        let registry = Arc::clone(&self.registry);
        let name = record.borrow().entity().to_string();
        let entity = registry.require(&name)?;
        self.check_tenant(entity, record)?;

        // Children drop before their parent.
        for relation in entity.cascade_relations() {
            if !relation.cascade_flags().remove {
                continue;
            }
            let children: Vec<EntityRef> = record
                .borrow()
                .related(relation.name())
                .iter()
                .cloned()
                .collect();
            for child in children {
                self.remove_recursive(&child, visited)?;
            }
        }

        self.tracker.set_state(record, EntityState::Removed);
        self.tracker.enqueue(OperationKind::Delete, record);
        Ok(())
    }

    fn check_tenant(&self, entity: &EntityDef, record: &EntityRef) -> Result<()> {
        let Some(property) = entity.tenant_property_def() else {
            return Ok(());
        };
        let Some(ambient) = TenantContext::current() else {
            return Ok(());
        };
        let value = record.borrow().get(property.name()).cloned();
        if let Some(value) = value
            && !value.is_null()
            && value.as_str() != Some(ambient.as_str())
        {
            return Err(Error::CrossTenantViolation {
                entity: entity.name().to_string(),
                entity_tenant: value.as_str().unwrap_or(value.type_name()).to_string(),
                ambient,
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Flush internals.

    fn fail_flush(&mut self, executed: &[u64], error: Error) -> Result<()> {
        if !self.transactional {
            self.tracker.remove_sequences(executed);
        }
        Err(error)
    }

    async fn apply_operation(&mut self, operation: &QueuedOperation) -> Result<()> {
        match operation.kind {
            OperationKind::Insert => self.apply_insert(&operation.entity).await,
            OperationKind::Update => self.apply_update(&operation.entity).await,
            OperationKind::Delete => self.apply_delete(&operation.entity).await,
        }
    }

    async fn apply_insert(&mut self, record: &EntityRef) -> Result<()> {
        let registry = Arc::clone(&self.registry);
        let name = record.borrow().entity().to_string();
        let entity = registry.require(&name)?;
        let key = registry.key_property(entity)?;

        // Owner-side FK columns come from the relationship slots; a parent
        // persisted earlier in this same flush already carries its key.
        for relation in entity.relations() {
            if relation.is_owner()
                && !relation.kind().is_collection()
                && let Some(column) = relation.join_column_def()
                && let Some(property) = entity.property_by_column(&column.name)
            {
                let parent = record.borrow().related(relation.name()).iter().next().cloned();
                if let Some(parent) = parent {
                    let target = registry.require(relation.target())?;
                    let target_key = registry.key_property(target)?;
                    let value = parent.borrow().get(target_key.name()).cloned();
                    if let Some(value) = value
                        && !value.is_null()
                    {
                        record.borrow_mut().set(property.name().to_string(), value);
                    }
                }
            }
        }

        let statement = insert_statement(&registry, entity, self.dialect)?;
        let command = self.bind_columns(entity, record, &statement, None)?;

        let mut generated: Option<Value> = None;
        {
            let stream = self.executor.run(command);
            pin_mut!(stream);
            while let Some(outcome) = stream.next().await {
                match outcome? {
                    QueryOutcome::Row(row) => {
                        if let Some(value) = row.get(key.name()) {
                            generated = Some(value.clone());
                        }
                    }
                    QueryOutcome::Affected(affected) => {
                        if generated.is_none()
                            && let Some(id) = affected.last_insert_id
                            && let Some(value) = key.template().cast_integer(id)
                        {
                            generated = Some(value);
                        }
                    }
                }
            }
        }

        if key.generation().is_database_generated() {
            let value = generated.ok_or_else(|| {
                Error::executor(format!("backend returned no generated key for `{name}`"))
            })?;
            record.borrow_mut().set(key.name().to_string(), value);
        }
        let key_value = record
            .borrow()
            .get(key.name())
            .cloned()
            .unwrap_or(Value::Null);
        if key_value.is_null() {
            return Err(Error::executor(format!(
                "`{name}` carries no key value after insert"
            )));
        }

        // Propagate the key into the FK column of collection children; they
        // flush after this record.
        for relation in entity.relations() {
            if relation.kind() == RelationKind::OneToMany {
                let fk_column = registry.foreign_key_for(entity, relation)?;
                let target = registry.require(relation.target())?;
                if let Some(fk_property) = target.property_by_column(&fk_column) {
                    let children: Vec<EntityRef> = record
                        .borrow()
                        .related(relation.name())
                        .iter()
                        .cloned()
                        .collect();
                    for child in children {
                        child
                            .borrow_mut()
                            .set(fk_property.name().to_string(), key_value.clone());
                    }
                }
            }
        }

        self.tracker.set_state(record, EntityState::Managed);
        self.tracker
            .identity_insert(entity.name(), key_value, record.clone());
        self.tracker.refresh_snapshot(entity, record);
        Ok(())
    }

    async fn apply_update(&mut self, record: &EntityRef) -> Result<()> {
        let registry = Arc::clone(&self.registry);
        let name = record.borrow().entity().to_string();
        let entity = registry.require(&name)?;
        let columns = self.tracker.dirty_columns(entity, record);
        if columns.is_empty() {
            return Ok(());
        }
        let tenant = TenantContext::current();
        let tenant_filter = entity.tenant_property_def().is_some() && tenant.is_some();
        let statement =
            update_by_key_statement(&registry, entity, self.dialect, &columns, tenant_filter)?;
        let command = self.bind_columns(entity, record, &statement, tenant.as_deref())?;
        self.executor.execute(command).await?;
        self.tracker.refresh_snapshot(entity, record);
        Ok(())
    }

    async fn apply_delete(&mut self, record: &EntityRef) -> Result<()> {
        let registry = Arc::clone(&self.registry);
        let name = record.borrow().entity().to_string();
        let entity = registry.require(&name)?;
        let key = registry.key_property(entity)?;
        let key_value = record
            .borrow()
            .get(key.name())
            .cloned()
            .unwrap_or(Value::Null);

        // Association rows referencing this owner go first.
        for relation in entity.relations() {
            if relation.kind() == RelationKind::ManyToMany
                && let Some(join_table) = relation.join_table_def()
            {
                let statement = link_delete_statement(join_table, self.dialect);
                let mut command = Command::new(statement.sql.clone());
                command
                    .params
                    .push((statement.parameters[0].clone(), key_value.clone()));
                self.executor.execute(command).await?;
            }
        }

        let tenant = TenantContext::current();
        let tenant_filter = entity.tenant_property_def().is_some() && tenant.is_some();
        let statement = delete_by_key_statement(&registry, entity, self.dialect, tenant_filter)?;
        let command = self.bind_columns(entity, record, &statement, tenant.as_deref())?;
        self.executor.execute(command).await?;

        self.tracker.set_state(record, EntityState::Detached);
        if !key_value.is_null() {
            self.tracker.identity_remove(entity.name(), &key_value);
        }
        Ok(())
    }

    async fn flush_links(&mut self) -> Result<()> {
        let links = self.tracker.take_links();
        for (index, link) in links.iter().enumerate() {
            if let Err(error) = self.apply_link(link).await {
                self.tracker.restore_links(links[index..].to_vec());
                return Err(error);
            }
        }
        Ok(())
    }

    async fn apply_link(&mut self, link: &LinkOperation) -> Result<()> {
        let registry = Arc::clone(&self.registry);
        let owner_name = link.owner.borrow().entity().to_string();
        let entity = registry.require(&owner_name)?;
        let relation = entity.relation_def(&link.relation).ok_or_else(|| {
            Error::UnknownRelationship {
                entity: entity.name().to_string(),
                relationship: link.relation.clone(),
            }
        })?;
        let target = registry.require(relation.target())?;

        // Resolve the join table from whichever side owns it.
        let (join_table, owner_first) = if let Some(join_table) = relation.join_table_def() {
            (join_table, true)
        } else {
            let mapped_by = relation.mapped_by_name().ok_or_else(|| {
                Error::Mapping(format!(
                    "many-to-many `{owner_name}.{}` has no owning side",
                    link.relation
                ))
            })?;
            let owner_relation = target.relation_def(mapped_by).ok_or_else(|| {
                Error::UnknownRelationship {
                    entity: target.name().to_string(),
                    relationship: mapped_by.to_string(),
                }
            })?;
            let join_table = owner_relation.join_table_def().ok_or_else(|| {
                Error::Mapping(format!(
                    "owner `{}.{mapped_by}` of a many-to-many has no join table",
                    target.name()
                ))
            })?;
            (join_table, false)
        };

        let entity_key = registry.key_property(entity)?;
        let target_key = registry.key_property(target)?;
        let left = link
            .owner
            .borrow()
            .get(entity_key.name())
            .cloned()
            .unwrap_or(Value::Null);
        let right = link
            .target
            .borrow()
            .get(target_key.name())
            .cloned()
            .unwrap_or(Value::Null);
        if left.is_null() || right.is_null() {
            return Err(Error::executor(format!(
                "association `{owner_name}.{}` flushed before both keys were generated",
                link.relation
            )));
        }
        let (owner_value, inverse_value) = if owner_first {
            (left, right)
        } else {
            (right, left)
        };

        let statement = link_insert_statement(join_table, self.dialect);
        let mut command = Command::new(statement.sql.clone());
        command
            .params
            .push((statement.parameters[0].clone(), owner_value));
        command
            .params
            .push((statement.parameters[1].clone(), inverse_value));
        self.executor.execute(command).await?;
        Ok(())
    }

    fn bind_columns(
        &self,
        entity: &EntityDef,
        record: &EntityRef,
        statement: &RenderedSql,
        tenant: Option<&str>,
    ) -> Result<Command> {
        let mut command = Command::new(statement.sql.clone());
        for name in &statement.parameters {
            let value = if name == TENANT_PARAMETER {
                Value::from(tenant.ok_or_else(|| {
                    Error::executor("tenant filter rendered without an ambient tenant")
                })?)
            } else if let Some(property) = entity.property_by_column(name) {
                record
                    .borrow()
                    .get(property.name())
                    .cloned()
                    .unwrap_or(Value::Null)
            } else {
                return Err(Error::executor(format!(
                    "no property of `{}` maps column `{name}`",
                    entity.name()
                )));
            };
            command.params.push((name.clone(), value));
        }
        Ok(command)
    }

    // ------------------------------------------------------------------
    // Row adoption, shared with the query materializer.

    /// Install a result row as a managed record, going through the identity
    /// map so one row has one in-memory representative.
    pub(crate) fn adopt_row(
        &mut self,
        entity_name: &str,
        values: Vec<(String, Value)>,
    ) -> Result<EntityRef> {
        let registry = Arc::clone(&self.registry);
        let entity = registry.require(entity_name)?;
        let key_property = registry.key_property(entity)?;
        let key = values
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key_property.name()))
            .map(|(_, value)| value.clone())
            .unwrap_or(Value::Null);
        if key.is_null() {
            return Err(Error::executor(format!(
                "row for `{entity_name}` carries no key value"
            )));
        }
        if let Some(existing) = self.tracker.identity_get(entity.name(), &key) {
            return Ok(existing);
        }
        let mut record = Record::new(entity.name().to_string());
        for (name, value) in values {
            record.set(name, value);
        }
        let handle = record.into_ref();
        self.tracker.attach(entity, &handle);
        self.tracker
            .identity_insert(entity.name(), key, handle.clone());
        self.hydrate_eager(entity, &handle);
        Ok(handle)
    }

    /// Fill eager to-one slots from the identity map when the FK value is
    /// already loaded. No extra statements are issued.
    fn hydrate_eager(&mut self, entity: &EntityDef, record: &EntityRef) {
        for relation in entity.relations() {
            if relation.fetch_mode() == FetchMode::Eager
                && relation.is_owner()
                && !relation.kind().is_collection()
                && let Some(column) = relation.join_column_def()
                && let Some(property) = entity.property_by_column(&column.name)
            {
                let fk = record.borrow().get(property.name()).cloned();
                if let Some(fk) = fk
                    && !fk.is_null()
                    && let Some(target) = self.tracker.identity_get(relation.target(), &fk)
                {
                    record
                        .borrow_mut()
                        .set_related_one(relation.name().to_string(), Some(target));
                }
            }
        }
    }

    /// Capture the key set of every collection slot for orphan detection.
    pub(crate) fn refresh_relation_snapshot(&mut self, record: &EntityRef) -> Result<()> {
        let registry = Arc::clone(&self.registry);
        let name = record.borrow().entity().to_string();
        let Some(entity) = registry.lookup(&name) else {
            return Ok(());
        };
        for relation in entity.relations() {
            if !relation.kind().is_collection() {
                continue;
            }
            let target = registry.require(relation.target())?;
            let target_key = registry.key_property(target)?;
            let keys: Vec<Value> = record
                .borrow()
                .related(relation.name())
                .iter()
                .filter_map(|child| child.borrow().get(target_key.name()).cloned())
                .filter(|v| !v.is_null())
                .collect();
            self.tracker.set_relation_snapshot(record, relation.name(), keys);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Executor plumbing for the query handle.

    pub(crate) async fn fetch_rows(&mut self, command: Command) -> Result<Vec<RowLabeled>> {
        self.executor.fetch(command).try_collect().await
    }

    pub(crate) async fn execute_command(&mut self, command: Command) -> Result<RowsAffected> {
        self.executor.execute(command).await
    }
}
