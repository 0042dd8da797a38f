use crate::{
    Command, CommandExecutor, EntityManager, EntityRef, Error, ParsedQuery, ProjectionShape,
    RenderedSelect, Result, SqlRenderer, Statement, TENANT_PARAMETER, TenantContext, Value,
    parse_query,
};
use std::{rc::Rc, sync::Arc};

#[derive(Debug, Clone)]
enum QuerySource {
    Parsed(ParsedQuery),
    /// Native SQL registered as a named query; passed through verbatim.
    Native { text: String, entity: String },
}

/// Lazy query bound to an entity manager's metadata.
///
/// The text is parsed once when the handle is created; SQL is rendered per
/// execution so the ambient tenant is read at the latest possible moment.
/// Execution methods borrow the manager explicitly.
#[derive(Debug, Clone)]
pub struct QueryHandle {
    source: QuerySource,
    bound: Vec<(String, Value)>,
}

impl QueryHandle {
    pub(crate) fn from_text(text: &str) -> Result<Self> {
        Ok(Self {
            source: QuerySource::Parsed(parse_query(text)?),
            bound: Vec::new(),
        })
    }

    pub(crate) fn native(text: &str, entity: &str) -> Self {
        Self {
            source: QuerySource::Native {
                text: text.to_string(),
                entity: entity.to_string(),
            },
            bound: Vec::new(),
        }
    }

    /// Parameter names collected during parse, in first-occurrence order.
    /// Empty for native queries.
    pub fn parameter_names(&self) -> &[String] {
        match &self.source {
            QuerySource::Parsed(parsed) => &parsed.parameters,
            QuerySource::Native { .. } => &[],
        }
    }

    /// Bind a value to a `:name` parameter.
    ///
    /// Fails with `UnknownParameter` when the name was not seen during
    /// parse. Native queries accept any name; values bind in insertion
    /// order.
    pub fn set_parameter(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<&mut Self> {
        let name = name.into();
        if name == TENANT_PARAMETER {
            return Err(Error::Unsupported(format!(
                "parameter name `{TENANT_PARAMETER}` is reserved for the tenant filter"
            )));
        }
        if let QuerySource::Parsed(parsed) = &self.source
            && !parsed.parameters.iter().any(|p| *p == name)
        {
            return Err(Error::UnknownParameter(name));
        }
        let value = value.into();
        if let Some(slot) = self.bound.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.bound.push((name, value));
        }
        Ok(self)
    }

    /// Run a SELECT and materialize the root entities, deduplicated through
    /// the identity map and row-collapsed over joined collections.
    pub async fn result_list<E: CommandExecutor>(
        &self,
        manager: &mut EntityManager<E>,
    ) -> Result<Vec<EntityRef>> {
        match &self.source {
            QuerySource::Parsed(parsed) => {
                let Statement::Select(select) = &parsed.statement else {
                    return Err(Error::Unsupported(
                        "result_list requires a SELECT query".to_string(),
                    ));
                };
                let tenant = TenantContext::current();
                let registry = Arc::clone(manager.registry());
                let rendered = SqlRenderer::new(&registry, manager.dialect())
                    .tenant(tenant.clone())
                    .render_select(select)?;
                let command =
                    self.build_command(&rendered.sql, &rendered.parameters, tenant.as_deref())?;
                let rows = manager.fetch_rows(command).await?;
                self.collapse_rows(manager, &rendered, rows)
            }
            QuerySource::Native { text, entity } => {
                let command = self.native_command(text);
                let rows = manager.fetch_rows(command).await?;
                let registry = Arc::clone(manager.registry());
                let definition = registry.require(entity)?;
                let mut roots: Vec<EntityRef> = Vec::new();
                for row in rows {
                    let values: Vec<(String, Value)> = definition
                        .properties()
                        .iter()
                        .map(|p| {
                            let value = row
                                .get(p.name())
                                .or_else(|| row.get(p.column_name()))
                                .cloned()
                                .unwrap_or(Value::Null);
                            (p.name().to_string(), value)
                        })
                        .collect();
                    let record = manager.adopt_row(definition.name(), values)?;
                    if !roots.iter().any(|r| Rc::ptr_eq(r, &record)) {
                        roots.push(record);
                    }
                }
                Ok(roots)
            }
        }
    }

    /// Like [`QueryHandle::result_list`] but expecting at most one root.
    pub async fn single_result<E: CommandExecutor>(
        &self,
        manager: &mut EntityManager<E>,
    ) -> Result<Option<EntityRef>> {
        let mut results = self.result_list(manager).await?;
        if results.len() > 1 {
            return Err(Error::NonUnique(results.len()));
        }
        Ok(results.pop())
    }

    /// First column of the first row, `None` on an empty result.
    pub async fn scalar<E: CommandExecutor>(
        &self,
        manager: &mut EntityManager<E>,
    ) -> Result<Option<Value>> {
        let command = match &self.source {
            QuerySource::Parsed(parsed) => {
                let Statement::Select(select) = &parsed.statement else {
                    return Err(Error::Unsupported(
                        "scalar requires a SELECT query".to_string(),
                    ));
                };
                let tenant = TenantContext::current();
                let registry = Arc::clone(manager.registry());
                let rendered = SqlRenderer::new(&registry, manager.dialect())
                    .tenant(tenant.clone())
                    .render_select(select)?;
                self.build_command(&rendered.sql, &rendered.parameters, tenant.as_deref())?
            }
            QuerySource::Native { text, .. } => self.native_command(text),
        };
        let rows = manager.fetch_rows(command).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.values().first().cloned()))
    }

    /// Run an UPDATE or DELETE and return the affected-row count.
    ///
    /// Executes directly against the connection: queued operations stay
    /// queued and the identity map is left alone.
    pub async fn execute_update<E: CommandExecutor>(
        &self,
        manager: &mut EntityManager<E>,
    ) -> Result<u64> {
        let command = match &self.source {
            QuerySource::Parsed(parsed) => {
                let tenant = TenantContext::current();
                let registry = Arc::clone(manager.registry());
                let renderer = SqlRenderer::new(&registry, manager.dialect()).tenant(tenant.clone());
                let rendered = match &parsed.statement {
                    Statement::Update(update) => renderer.render_update(update)?,
                    Statement::Delete(delete) => renderer.render_delete(delete)?,
                    Statement::Select(..) => {
                        return Err(Error::Unsupported(
                            "execute_update requires an UPDATE or DELETE query".to_string(),
                        ));
                    }
                };
                self.build_command(&rendered.sql, &rendered.parameters, tenant.as_deref())?
            }
            QuerySource::Native { text, .. } => self.native_command(text),
        };
        let affected = manager.execute_command(command).await?;
        Ok(affected.rows_affected.unwrap_or_default())
    }

    fn collapse_rows<E: CommandExecutor>(
        &self,
        manager: &mut EntityManager<E>,
        rendered: &RenderedSelect,
        rows: Vec<crate::RowLabeled>,
    ) -> Result<Vec<EntityRef>> {
        let registry = Arc::clone(manager.registry());
        let mut roots: Vec<EntityRef> = Vec::new();
        let mut touched: Vec<EntityRef> = Vec::new();
        for row in rows {
            // One record per entity-shaped projection item of this row.
            let mut by_alias: Vec<(String, EntityRef)> = Vec::new();
            for shape in &rendered.shapes {
                let ProjectionShape::Entity {
                    alias,
                    entity,
                    properties,
                    start,
                } = shape
                else {
                    continue;
                };
                if row.values().len() < start + properties.len() {
                    return Err(Error::executor(format!(
                        "result row is narrower than the projection of `{entity}`"
                    )));
                }
                let slice = &row.values()[*start..*start + properties.len()];
                // A LEFT JOIN miss projects all NULLs; there is no record.
                if slice.iter().all(Value::is_null) {
                    continue;
                }
                let values: Vec<(String, Value)> = properties
                    .iter()
                    .cloned()
                    .zip(slice.iter().cloned())
                    .collect();
                let record = manager.adopt_row(entity, values)?;
                if !touched.iter().any(|r| Rc::ptr_eq(r, &record)) {
                    touched.push(record.clone());
                }
                by_alias.push((alias.clone(), record));
            }
            // Wire joined records onto their source's relationship slot.
            for join in &rendered.joins {
                let source = by_alias
                    .iter()
                    .find(|(alias, _)| *alias == join.source_alias)
                    .map(|(_, record)| record.clone());
                let target = by_alias
                    .iter()
                    .find(|(alias, _)| *alias == join.alias)
                    .map(|(_, record)| record.clone());
                let (Some(source), Some(target)) = (source, target) else {
                    continue;
                };
                let source_entity = registry.require(&source.borrow().entity().to_string())?;
                let Some(relation) = source_entity.relation_def(&join.relation) else {
                    continue;
                };
                if relation.kind().is_collection() {
                    let present = source
                        .borrow()
                        .related(relation.name())
                        .iter()
                        .any(|r| Rc::ptr_eq(r, &target));
                    if !present {
                        source
                            .borrow_mut()
                            .push_related(relation.name().to_string(), target);
                    }
                } else {
                    source
                        .borrow_mut()
                        .set_related_one(relation.name().to_string(), Some(target));
                }
            }
            if let Some(root) = by_alias
                .iter()
                .find(|(alias, _)| *alias == rendered.root_alias)
                .map(|(_, record)| record.clone())
                && !roots.iter().any(|r| Rc::ptr_eq(r, &root))
            {
                roots.push(root);
            }
        }
        // Collection membership observed here is the orphan-removal
        // baseline for later merges.
        for record in &touched {
            manager.refresh_relation_snapshot(record)?;
        }
        Ok(roots)
    }

    fn native_command(&self, text: &str) -> Command {
        let mut command = Command::new(text);
        command.params = self.bound.clone();
        command
    }

    fn build_command(
        &self,
        sql: &str,
        parameters: &[String],
        tenant: Option<&str>,
    ) -> Result<Command> {
        let mut command = Command::new(sql);
        for name in parameters {
            let value = if name == TENANT_PARAMETER {
                Value::from(tenant.ok_or_else(|| {
                    Error::executor("tenant filter rendered without an ambient tenant")
                })?)
            } else {
                self.bound
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| {
                        Error::executor(format!("parameter `:{name}` has no bound value"))
                    })?
            };
            command.params.push((name.clone(), value));
        }
        Ok(command)
    }
}
