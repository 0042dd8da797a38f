use crate::{
    Dialect, EntityDef, IdentityReturn, JoinTable, Registry, RenderedSql, Result, SqlBuffer,
    TENANT_PARAMETER, separated_by,
};
use std::fmt::Write;

/// Statement writers for the flush path and key lookups.
///
/// These do not originate from query text: they are derived from a
/// descriptor plus a dialect. Parameter names are column names; the caller
/// binds values in the returned order. Result columns are labeled with
/// property names so rows bind back onto records by name.

fn write_table(out: &mut SqlBuffer, entity: &EntityDef) {
    if !entity.schema_name().is_empty() {
        out.push_str(entity.schema_name());
        out.push('.');
    }
    out.push_str(entity.table_name());
}

fn write_param(out: &mut SqlBuffer, dialect: Dialect, parameters: &mut Vec<String>, name: &str) {
    let ordinal = match parameters.iter().position(|p| p == name) {
        Some(index) => index + 1,
        None => {
            parameters.push(name.to_string());
            parameters.len()
        }
    };
    dialect.write_placeholder(out, name, ordinal);
}

/// INSERT over the insertable columns, with the dialect's identity readback
/// when the key is backend-generated.
pub fn insert_statement(
    registry: &Registry,
    entity: &EntityDef,
    dialect: Dialect,
) -> Result<RenderedSql> {
    let key = registry.key_property(entity)?;
    let generated = key.generation().is_database_generated();
    let mut out = SqlBuffer::with_capacity(128);
    let mut parameters = Vec::new();

    out.push_str("INSERT INTO ");
    write_table(&mut out, entity);
    out.push_str(" (");
    separated_by(
        &mut out,
        entity.properties().iter().filter(|p| p.is_insertable()),
        |out, property| {
            out.push_str(property.column_name());
            Ok::<(), crate::Error>(())
        },
        ", ",
    )?;
    out.push(')');

    if generated && dialect.identity_return() == IdentityReturn::OutputClause {
        let _ = write!(&mut out, " OUTPUT INSERTED.{} AS ", key.column_name());
        dialect.write_alias_identifier(&mut out, key.name());
    }

    out.push_str(" VALUES (");
    let insertable: Vec<&str> = entity
        .properties()
        .iter()
        .filter(|p| p.is_insertable())
        .map(|p| p.column_name())
        .collect();
    separated_by(
        &mut out,
        insertable,
        |out, column| {
            write_param(out, dialect, &mut parameters, column);
            Ok::<(), crate::Error>(())
        },
        ", ",
    )?;
    out.push(')');

    if generated && dialect.identity_return() == IdentityReturn::Returning {
        let _ = write!(&mut out, " RETURNING {} AS ", key.column_name());
        dialect.write_alias_identifier(&mut out, key.name());
    }

    Ok(RenderedSql {
        sql: out.into_string(),
        parameters,
    })
}

/// UPDATE of the given columns for one row, addressed by primary key and,
/// when requested, the tenant discriminator.
pub fn update_by_key_statement(
    registry: &Registry,
    entity: &EntityDef,
    dialect: Dialect,
    columns: &[String],
    tenant_filter: bool,
) -> Result<RenderedSql> {
    let key = registry.key_property(entity)?;
    let mut out = SqlBuffer::with_capacity(128);
    let mut parameters = Vec::new();

    out.push_str("UPDATE ");
    write_table(&mut out, entity);
    out.push_str(" SET ");
    separated_by(
        &mut out,
        columns,
        |out, column| {
            let _ = write!(out, "{column} = ");
            write_param(out, dialect, &mut parameters, column);
            Ok::<(), crate::Error>(())
        },
        ", ",
    )?;
    let _ = write!(&mut out, " WHERE {} = ", key.column_name());
    write_param(&mut out, dialect, &mut parameters, key.column_name());
    if tenant_filter && let Some(tenant) = entity.tenant_property_def() {
        let _ = write!(&mut out, " AND {} = ", tenant.column_name());
        write_param(&mut out, dialect, &mut parameters, TENANT_PARAMETER);
    }

    Ok(RenderedSql {
        sql: out.into_string(),
        parameters,
    })
}

/// DELETE of one row by primary key, optionally tenant-guarded.
pub fn delete_by_key_statement(
    registry: &Registry,
    entity: &EntityDef,
    dialect: Dialect,
    tenant_filter: bool,
) -> Result<RenderedSql> {
    let key = registry.key_property(entity)?;
    let mut out = SqlBuffer::with_capacity(64);
    let mut parameters = Vec::new();

    out.push_str("DELETE FROM ");
    write_table(&mut out, entity);
    let _ = write!(&mut out, " WHERE {} = ", key.column_name());
    write_param(&mut out, dialect, &mut parameters, key.column_name());
    if tenant_filter && let Some(tenant) = entity.tenant_property_def() {
        let _ = write!(&mut out, " AND {} = ", tenant.column_name());
        write_param(&mut out, dialect, &mut parameters, TENANT_PARAMETER);
    }

    Ok(RenderedSql {
        sql: out.into_string(),
        parameters,
    })
}

/// Single-row SELECT by primary key with property-labeled columns.
pub fn select_by_key_statement(
    registry: &Registry,
    entity: &EntityDef,
    dialect: Dialect,
    tenant_filter: bool,
) -> Result<RenderedSql> {
    let key = registry.key_property(entity)?;
    let mut out = SqlBuffer::with_capacity(128);
    let mut parameters = Vec::new();

    out.push_str("SELECT ");
    separated_by(
        &mut out,
        entity.properties(),
        |out, property| {
            let _ = write!(out, "{} AS ", property.column_name());
            dialect.write_alias_identifier(out, property.name());
            Ok::<(), crate::Error>(())
        },
        ", ",
    )?;
    out.push_str(" FROM ");
    write_table(&mut out, entity);
    let _ = write!(&mut out, " WHERE {} = ", key.column_name());
    write_param(&mut out, dialect, &mut parameters, key.column_name());
    if tenant_filter && let Some(tenant) = entity.tenant_property_def() {
        let _ = write!(&mut out, " AND {} = ", tenant.column_name());
        write_param(&mut out, dialect, &mut parameters, TENANT_PARAMETER);
    }

    Ok(RenderedSql {
        sql: out.into_string(),
        parameters,
    })
}

/// INSERT of one association row into a many-to-many join table.
pub fn link_insert_statement(join_table: &JoinTable, dialect: Dialect) -> RenderedSql {
    let mut out = SqlBuffer::with_capacity(64);
    let mut parameters = Vec::new();

    out.push_str("INSERT INTO ");
    if !join_table.schema.is_empty() {
        out.push_str(&join_table.schema);
        out.push('.');
    }
    out.push_str(&join_table.name);
    let _ = write!(
        &mut out,
        " ({}, {}) VALUES (",
        join_table.owner_column, join_table.inverse_column
    );
    write_param(&mut out, dialect, &mut parameters, &join_table.owner_column);
    out.push_str(", ");
    write_param(&mut out, dialect, &mut parameters, &join_table.inverse_column);
    out.push(')');

    RenderedSql {
        sql: out.into_string(),
        parameters,
    }
}

/// DELETE of every association row of one owner from a join table.
pub fn link_delete_statement(join_table: &JoinTable, dialect: Dialect) -> RenderedSql {
    let mut out = SqlBuffer::with_capacity(64);
    let mut parameters = Vec::new();

    out.push_str("DELETE FROM ");
    if !join_table.schema.is_empty() {
        out.push_str(&join_table.schema);
        out.push('.');
    }
    out.push_str(&join_table.name);
    let _ = write!(&mut out, " WHERE {} = ", join_table.owner_column);
    write_param(&mut out, dialect, &mut parameters, &join_table.owner_column);

    RenderedSql {
        sql: out.into_string(),
        parameters,
    }
}
