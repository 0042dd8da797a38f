use crate::{
    AggregateFunction, BinaryOp, DeleteStatement, Dialect, EntityDef, Error, Expr, InList, Join,
    JoinKind, ParsedQuery, Registry, Result, SelectStatement, SqlBuffer, Statement, UnaryOp,
    UpdateStatement, Value, separated_by, util::truncate_for_log, write_escaped,
};
use std::fmt::Write;

/// Reserved parameter name carrying the ambient tenant value.
pub const TENANT_PARAMETER: &str = "__tenant";

/// A rendered statement: parameterized SQL plus the parameter names it
/// references, in first-reference order. Values never appear in the text.
#[derive(Debug, Clone)]
pub struct RenderedSql {
    pub sql: String,
    pub parameters: Vec<String>,
}

/// One projection item of a rendered SELECT, used to slice result rows.
#[derive(Debug, Clone)]
pub enum ProjectionShape {
    /// A bare alias expanded to the full column list of its entity.
    Entity {
        alias: String,
        entity: String,
        properties: Vec<String>,
        start: usize,
    },
    /// A single-column expression.
    Scalar { label: Option<String>, start: usize },
}

impl ProjectionShape {
    pub fn width(&self) -> usize {
        match self {
            ProjectionShape::Entity { properties, .. } => properties.len(),
            ProjectionShape::Scalar { .. } => 1,
        }
    }
}

/// Alias binding introduced by a join, kept for row-collapse.
#[derive(Debug, Clone)]
pub struct JoinBinding {
    pub alias: String,
    pub source_alias: String,
    pub relation: String,
    pub entity: String,
    pub kind: JoinKind,
}

/// Rendered SELECT with the metadata the materializer needs.
#[derive(Debug, Clone)]
pub struct RenderedSelect {
    pub sql: String,
    pub parameters: Vec<String>,
    pub shapes: Vec<ProjectionShape>,
    pub joins: Vec<JoinBinding>,
    pub root_entity: String,
    pub root_alias: String,
}

#[derive(Debug, Clone)]
pub enum RenderedStatement {
    Select(RenderedSelect),
    Modify(RenderedSql),
}

/// Dialect-aware SQL generator.
///
/// Rewrites entity-level identifiers into table and column identifiers using
/// the registry, expands bare aliases, synthesizes join conditions from
/// relationship metadata and conjoins the implicit tenant predicate. Output
/// is deterministic for a given statement, registry, dialect and tenant.
pub struct SqlRenderer<'a> {
    registry: &'a Registry,
    dialect: Dialect,
    tenant: Option<String>,
}

/// Alias bindings and the parameter order of one render pass.
struct Scope<'a> {
    aliases: Vec<(String, &'a EntityDef)>,
    parameters: Vec<String>,
    qualify: bool,
}

impl<'a> Scope<'a> {
    fn new(qualify: bool) -> Self {
        Self {
            aliases: Vec::new(),
            parameters: Vec::new(),
            qualify,
        }
    }

    fn bind(&mut self, alias: &str, entity: &'a EntityDef) -> Result<()> {
        if self.aliases.iter().any(|(a, _)| a == alias) {
            return Err(Error::Mapping(format!("alias `{alias}` is bound twice")));
        }
        self.aliases.push((alias.to_string(), entity));
        Ok(())
    }

    fn resolve(&self, alias: &str) -> Result<&'a EntityDef> {
        self.aliases
            .iter()
            .find(|(a, _)| a == alias)
            .map(|(_, def)| *def)
            .ok_or_else(|| Error::UnknownAlias(alias.to_string()))
    }
}

impl<'a> SqlRenderer<'a> {
    pub fn new(registry: &'a Registry, dialect: Dialect) -> Self {
        Self {
            registry,
            dialect,
            tenant: None,
        }
    }

    /// Ambient tenant applied as an implicit predicate on tenant-scoped
    /// entities. `None` disables the filter.
    pub fn tenant(mut self, tenant: Option<String>) -> Self {
        self.tenant = tenant;
        self
    }

    pub fn render(&self, parsed: &ParsedQuery) -> Result<RenderedStatement> {
        Ok(match &parsed.statement {
            Statement::Select(select) => RenderedStatement::Select(self.render_select(select)?),
            Statement::Update(update) => RenderedStatement::Modify(self.render_update(update)?),
            Statement::Delete(delete) => RenderedStatement::Modify(self.render_delete(delete)?),
        })
    }

    pub fn render_select(&self, select: &SelectStatement) -> Result<RenderedSelect> {
        let root = self.registry.require(&select.from.entity)?;
        let mut scope = Scope::new(true);
        scope.bind(&select.from.alias, root)?;

        // Bind every join alias up front so projections may reference them.
        let mut bindings = Vec::with_capacity(select.joins.len());
        for join in &select.joins {
            let source = scope.resolve(&join.source_alias)?;
            let relation = source.relation_def(&join.property).ok_or_else(|| {
                Error::UnknownRelationship {
                    entity: source.name().to_string(),
                    relationship: join.property.clone(),
                }
            })?;
            let target = self.registry.require(relation.target())?;
            scope.bind(&join.alias, target)?;
            bindings.push(JoinBinding {
                alias: join.alias.clone(),
                source_alias: join.source_alias.clone(),
                relation: relation.name().to_string(),
                entity: target.name().to_string(),
                kind: join.kind,
            });
        }

        let mut out = SqlBuffer::with_capacity(256);
        out.push_str("SELECT ");
        if select.distinct {
            out.push_str("DISTINCT ");
        }
        let mut shapes = Vec::with_capacity(select.items.len());
        let mut column_index = 0usize;
        separated_by(
            &mut out,
            &select.items,
            |out, item| {
                match &item.expr {
                    Expr::Object(alias) => {
                        let def = scope.resolve(alias)?;
                        let properties: Vec<String> = def
                            .properties()
                            .iter()
                            .map(|p| p.name().to_string())
                            .collect();
                        separated_by(
                            out,
                            def.properties(),
                            |out, property| {
                                let _ = write!(out, "{alias}.{} AS ", property.column_name());
                                self.dialect.write_alias_identifier(out, property.name());
                                Ok::<(), Error>(())
                            },
                            ", ",
                        )?;
                        shapes.push(ProjectionShape::Entity {
                            alias: alias.clone(),
                            entity: def.name().to_string(),
                            properties,
                            start: column_index,
                        });
                        column_index += def.properties().len();
                    }
                    expr => {
                        self.write_expr(out, &mut scope, expr)?;
                        if let Some(alias) = &item.alias {
                            out.push_str(" AS ");
                            self.dialect.write_alias_identifier(out, alias);
                        }
                        shapes.push(ProjectionShape::Scalar {
                            label: item.alias.clone(),
                            start: column_index,
                        });
                        column_index += 1;
                    }
                }
                Ok::<(), Error>(())
            },
            ", ",
        )?;

        out.push_str(" FROM ");
        self.write_table(&mut out, root);
        let _ = write!(out, " AS {}", select.from.alias);

        for join in &select.joins {
            self.write_join(&mut out, &mut scope, join)?;
        }

        self.write_where(
            &mut out,
            &mut scope,
            select.where_clause.as_ref(),
            root,
            Some(&select.from.alias),
            false,
        )?;

        if !select.group_by.is_empty() {
            out.push_str(" GROUP BY ");
            separated_by(
                &mut out,
                &select.group_by,
                |out, expr| self.write_expr(out, &mut scope, expr),
                ", ",
            )?;
        }
        if let Some(having) = &select.having {
            out.push_str(" HAVING ");
            self.write_expr(&mut out, &mut scope, having)?;
        }
        if !select.order_by.is_empty() {
            out.push_str(" ORDER BY ");
            separated_by(
                &mut out,
                &select.order_by,
                |out, item| {
                    self.write_expr(out, &mut scope, &item.expr)?;
                    if item.descending {
                        out.push_str(" DESC");
                    }
                    Ok::<(), Error>(())
                },
                ", ",
            )?;
        }

        let sql = out.into_string();
        log::debug!("generated select: {}", truncate_for_log(&sql));
        Ok(RenderedSelect {
            sql,
            parameters: scope.parameters,
            shapes,
            joins: bindings,
            root_entity: root.name().to_string(),
            root_alias: select.from.alias.clone(),
        })
    }

    pub fn render_update(&self, update: &UpdateStatement) -> Result<RenderedSql> {
        let target = self.registry.require(&update.target.entity)?;
        // The alias is elided: UPDATE has no alias binding in most backends,
        // so every column reference renders bare.
        let mut scope = Scope::new(false);
        scope.bind(&update.target.alias, target)?;

        let mut out = SqlBuffer::with_capacity(128);
        out.push_str("UPDATE ");
        self.write_table(&mut out, target);
        out.push_str(" SET ");
        separated_by(
            &mut out,
            &update.assignments,
            |out, assignment| {
                if scope.resolve(&assignment.alias)?.name() != target.name() {
                    return Err(Error::UnknownAlias(assignment.alias.clone()));
                }
                let column = self.column_of(target, &assignment.property)?;
                let _ = write!(out, "{column} = ");
                self.write_expr(out, &mut scope, &assignment.value)
            },
            ", ",
        )?;

        self.write_where(
            &mut out,
            &mut scope,
            update.where_clause.as_ref(),
            target,
            None,
            false,
        )?;

        let sql = out.into_string();
        log::debug!("generated update: {}", truncate_for_log(&sql));
        Ok(RenderedSql {
            sql,
            parameters: scope.parameters,
        })
    }

    pub fn render_delete(&self, delete: &DeleteStatement) -> Result<RenderedSql> {
        let target = self.registry.require(&delete.target.entity)?;
        let mut scope = Scope::new(false);
        scope.bind(&delete.target.alias, target)?;

        let mut out = SqlBuffer::with_capacity(128);
        out.push_str("DELETE FROM ");
        self.write_table(&mut out, target);

        self.write_where(
            &mut out,
            &mut scope,
            delete.where_clause.as_ref(),
            target,
            None,
            true,
        )?;

        let sql = out.into_string();
        log::debug!("generated delete: {}", truncate_for_log(&sql));
        Ok(RenderedSql {
            sql,
            parameters: scope.parameters,
        })
    }

    fn write_table(&self, out: &mut SqlBuffer, entity: &EntityDef) {
        if !entity.schema_name().is_empty() {
            out.push_str(entity.schema_name());
            out.push('.');
        }
        out.push_str(entity.table_name());
    }

    fn write_join(&self, out: &mut SqlBuffer, scope: &mut Scope<'a>, join: &Join) -> Result<()> {
        use crate::RelationKind::*;
        if join.kind == JoinKind::Right && !self.dialect.supports_right_join() {
            return Err(Error::Unsupported(
                "RIGHT JOIN is not available on this dialect".to_string(),
            ));
        }
        let keyword = match join.kind {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
        };
        let source = scope.resolve(&join.source_alias)?;
        let relation = source.relation_def(&join.property).ok_or_else(|| {
            Error::UnknownRelationship {
                entity: source.name().to_string(),
                relationship: join.property.clone(),
            }
        })?;
        let target = self.registry.require(relation.target())?;
        let source_alias = &join.source_alias;
        let alias = &join.alias;

        match relation.kind() {
            ManyToOne | OneToOne if relation.is_owner() => {
                let fk = self.registry.foreign_key_for(source, relation)?;
                let target_key = self.registry.key_property(target)?.column_name();
                let _ = write!(out, " {keyword} ");
                self.write_table(out, target);
                let _ = write!(
                    out,
                    " AS {alias} ON {source_alias}.{fk} = {alias}.{target_key}"
                );
            }
            ManyToOne | OneToMany | OneToOne => {
                // FK lives on the target side; `foreign_key_for` walks the
                // inverse mapping to find its column.
                let fk = self.registry.foreign_key_for(source, relation)?;
                let source_key = self.registry.key_property(source)?.column_name();
                let _ = write!(out, " {keyword} ");
                self.write_table(out, target);
                let _ = write!(
                    out,
                    " AS {alias} ON {source_alias}.{source_key} = {alias}.{fk}"
                );
            }
            ManyToMany => {
                let (join_table, source_column, target_column) =
                    if let Some(join_table) = relation.join_table_def() {
                        (join_table, &join_table.owner_column, &join_table.inverse_column)
                    } else {
                        let mapped_by = relation.mapped_by_name().ok_or_else(|| {
                            Error::Mapping(format!(
                                "many-to-many `{}.{}` has neither a join table nor an owner",
                                source.name(),
                                relation.name()
                            ))
                        })?;
                        let owner = target.relation_def(mapped_by).ok_or_else(|| {
                            Error::UnknownRelationship {
                                entity: target.name().to_string(),
                                relationship: mapped_by.to_string(),
                            }
                        })?;
                        let join_table = owner.join_table_def().ok_or_else(|| {
                            Error::Mapping(format!(
                                "owner `{}.{}` of a many-to-many has no join table",
                                target.name(),
                                mapped_by
                            ))
                        })?;
                        (join_table, &join_table.inverse_column, &join_table.owner_column)
                    };
                let source_key = self.registry.key_property(source)?.column_name();
                let target_key = self.registry.key_property(target)?.column_name();
                let link_alias = format!("{alias}_jt");
                let _ = write!(out, " {keyword} ");
                if !join_table.schema.is_empty() {
                    out.push_str(&join_table.schema);
                    out.push('.');
                }
                out.push_str(&join_table.name);
                let _ = write!(
                    out,
                    " AS {link_alias} ON {source_alias}.{source_key} = {link_alias}.{source_column}"
                );
                let _ = write!(out, " {keyword} ");
                self.write_table(out, target);
                let _ = write!(
                    out,
                    " AS {alias} ON {link_alias}.{target_column} = {alias}.{target_key}"
                );
            }
        }
        Ok(())
    }

    fn write_where(
        &self,
        out: &mut SqlBuffer,
        scope: &mut Scope<'a>,
        where_clause: Option<&Expr>,
        root: &EntityDef,
        root_alias: Option<&str>,
        is_delete: bool,
    ) -> Result<()> {
        let tenant_column = root.tenant_property_def().map(|p| p.column_name());
        let tenant_filter = tenant_column.is_some() && self.tenant.is_some();
        if tenant_column.is_some() && self.tenant.is_none() && is_delete {
            log::info!(
                "delete on tenant-scoped entity `{}` with no ambient tenant: filter bypassed",
                root.name()
            );
        }
        if where_clause.is_none() && !tenant_filter {
            return Ok(());
        }
        out.push_str(" WHERE ");
        if let Some(expr) = where_clause {
            out.push('(');
            self.write_expr(out, scope, expr)?;
            out.push(')');
            if tenant_filter {
                out.push_str(" AND ");
            }
        }
        if tenant_filter {
            let column = tenant_column.unwrap_or_default();
            if let Some(alias) = root_alias {
                let _ = write!(out, "{alias}.");
            }
            let _ = write!(out, "{column} = ");
            self.write_parameter(out, scope, TENANT_PARAMETER);
        }
        Ok(())
    }

    /// Column mapped by a property path; an owner to-one relationship name
    /// resolves to its foreign key column.
    fn column_of(&self, entity: &EntityDef, property: &str) -> Result<String> {
        if let Some(def) = entity.property_def(property) {
            return Ok(def.column_name().to_string());
        }
        if let Some(relation) = entity.relation_def(property)
            && !relation.kind().is_collection()
            && relation.is_owner()
        {
            return self.registry.foreign_key_for(entity, relation);
        }
        Err(Error::UnknownProperty {
            entity: entity.name().to_string(),
            property: property.to_string(),
        })
    }

    fn write_column(
        &self,
        out: &mut SqlBuffer,
        scope: &mut Scope<'a>,
        alias: &str,
        property: &str,
    ) -> Result<()> {
        let entity = scope.resolve(alias)?;
        let column = self.column_of(entity, property)?;
        if scope.qualify {
            let _ = write!(out, "{alias}.");
        }
        out.push_str(&column);
        Ok(())
    }

    fn write_parameter(&self, out: &mut SqlBuffer, scope: &mut Scope<'a>, name: &str) {
        let ordinal = match scope.parameters.iter().position(|p| p == name) {
            Some(index) => index + 1,
            None => {
                scope.parameters.push(name.to_string());
                scope.parameters.len()
            }
        };
        self.dialect.write_placeholder(out, name, ordinal);
    }

    fn write_literal(&self, out: &mut SqlBuffer, value: &Value) -> Result<()> {
        if value.is_null() {
            out.push_str("NULL");
            return Ok(());
        }
        match value {
            Value::Boolean(Some(v)) => out.push_str(if *v { "TRUE" } else { "FALSE" }),
            Value::Int32(Some(v)) => {
                let _ = write!(out, "{v}");
            }
            Value::Int64(Some(v)) => {
                let _ = write!(out, "{v}");
            }
            Value::Float64(Some(v)) => {
                let _ = write!(out, "{v}");
            }
            Value::Varchar(Some(v)) => {
                out.push('\'');
                write_escaped(out, v, '\'', "''");
                out.push('\'');
            }
            other => {
                return Err(Error::Unsupported(format!(
                    "{} literals cannot appear in query text",
                    other.type_name()
                )));
            }
        }
        Ok(())
    }

    fn write_expr(&self, out: &mut SqlBuffer, scope: &mut Scope<'a>, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Object(alias) => Err(Error::Unsupported(format!(
                "bare alias `{alias}` is only valid in projections and aggregates"
            ))),
            Expr::Column { alias, property } => self.write_column(out, scope, alias, property),
            Expr::Parameter(name) => {
                self.write_parameter(out, scope, name);
                Ok(())
            }
            Expr::Literal(value) => self.write_literal(out, value),
            Expr::Aggregate {
                function,
                distinct,
                operand,
            } => self.write_aggregate(out, scope, *function, *distinct, operand),
            Expr::Function { name, args } => {
                out.push_str(name);
                out.push('(');
                separated_by(
                    out,
                    args,
                    |out, arg| self.write_expr(out, scope, arg),
                    ", ",
                )?;
                out.push(')');
                Ok(())
            }
            Expr::Binary { op, left, right } => {
                let precedence = binary_precedence(*op);
                self.write_operand(out, scope, left, precedence)?;
                let _ = write!(out, " {} ", binary_symbol(*op));
                self.write_operand(out, scope, right, precedence)
            }
            Expr::Unary { op, operand } => match op {
                UnaryOp::Not => {
                    out.push_str("NOT ");
                    self.write_operand(out, scope, operand, u8::MAX)
                }
                UnaryOp::Neg => {
                    out.push('-');
                    self.write_operand(out, scope, operand, u8::MAX)
                }
            },
            Expr::In { operand, list } => {
                self.write_operand(out, scope, operand, COMPARISON_PRECEDENCE)?;
                out.push_str(" IN (");
                match list {
                    InList::Items(items) => {
                        separated_by(
                            out,
                            items,
                            |out, item| self.write_expr(out, scope, item),
                            ", ",
                        )?;
                    }
                    InList::Parameter(name) => self.write_parameter(out, scope, name),
                }
                out.push(')');
                Ok(())
            }
            Expr::Between { operand, low, high } => {
                self.write_operand(out, scope, operand, COMPARISON_PRECEDENCE)?;
                out.push_str(" BETWEEN ");
                self.write_operand(out, scope, low, COMPARISON_PRECEDENCE)?;
                out.push_str(" AND ");
                self.write_operand(out, scope, high, COMPARISON_PRECEDENCE)
            }
            Expr::Like {
                operand,
                pattern,
                negated,
            } => {
                self.write_operand(out, scope, operand, COMPARISON_PRECEDENCE)?;
                out.push_str(if *negated { " NOT LIKE " } else { " LIKE " });
                self.write_operand(out, scope, pattern, COMPARISON_PRECEDENCE)
            }
            Expr::IsNull { operand, negated } => {
                self.write_operand(out, scope, operand, COMPARISON_PRECEDENCE)?;
                out.push_str(if *negated { " IS NOT NULL" } else { " IS NULL" });
                Ok(())
            }
            Expr::Case {
                operand,
                branches,
                otherwise,
            } => {
                out.push_str("CASE");
                if let Some(operand) = operand {
                    out.push(' ');
                    self.write_expr(out, scope, operand)?;
                }
                for branch in branches {
                    out.push_str(" WHEN ");
                    self.write_expr(out, scope, &branch.when)?;
                    out.push_str(" THEN ");
                    self.write_expr(out, scope, &branch.then)?;
                }
                if let Some(otherwise) = otherwise {
                    out.push_str(" ELSE ");
                    self.write_expr(out, scope, otherwise)?;
                }
                out.push_str(" END");
                Ok(())
            }
        }
    }

    fn write_aggregate(
        &self,
        out: &mut SqlBuffer,
        scope: &mut Scope<'a>,
        function: AggregateFunction,
        distinct: bool,
        operand: &Expr,
    ) -> Result<()> {
        out.push_str(function.as_str());
        out.push('(');
        if distinct {
            out.push_str("DISTINCT ");
        }
        match operand {
            // A bare alias aggregates over the entity's primary key column.
            Expr::Object(alias) => {
                let entity = scope.resolve(alias)?;
                let key = self.registry.key_property(entity)?;
                if scope.qualify {
                    let _ = write!(out, "{alias}.");
                }
                out.push_str(key.column_name());
            }
            Expr::Column { alias, property } => {
                let entity = scope.resolve(alias)?;
                if entity
                    .relation_def(property)
                    .is_some_and(|r| r.kind().is_collection())
                {
                    return Err(Error::AmbiguousAggregate(format!("{alias}.{property}")));
                }
                self.write_column(out, scope, alias, property)?;
            }
            other => self.write_expr(out, scope, other)?,
        }
        out.push(')');
        Ok(())
    }

    /// Write a child expression, parenthesized when it binds looser than the
    /// surrounding operator.
    fn write_operand(
        &self,
        out: &mut SqlBuffer,
        scope: &mut Scope<'a>,
        operand: &Expr,
        parent_precedence: u8,
    ) -> Result<()> {
        let needs_parens = expr_precedence(operand) < parent_precedence;
        if needs_parens {
            out.push('(');
        }
        self.write_expr(out, scope, operand)?;
        if needs_parens {
            out.push(')');
        }
        Ok(())
    }
}

const COMPARISON_PRECEDENCE: u8 = 3;

fn binary_precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Or => 1,
        BinaryOp::And => 2,
        BinaryOp::Eq
        | BinaryOp::Ne
        | BinaryOp::Lt
        | BinaryOp::Le
        | BinaryOp::Gt
        | BinaryOp::Ge => COMPARISON_PRECEDENCE,
        BinaryOp::Add | BinaryOp::Sub => 4,
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 5,
    }
}

fn expr_precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Binary { op, .. } => binary_precedence(*op),
        Expr::Unary { op: UnaryOp::Not, .. } => 2,
        Expr::In { .. }
        | Expr::Between { .. }
        | Expr::Like { .. }
        | Expr::IsNull { .. }
        | Expr::Case { .. } => COMPARISON_PRECEDENCE,
        _ => u8::MAX,
    }
}

fn binary_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Or => "OR",
        BinaryOp::And => "AND",
        BinaryOp::Eq => "=",
        BinaryOp::Ne => "<>",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
    }
}
