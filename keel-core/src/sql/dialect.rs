use crate::{SqlBuffer, write_escaped};
use std::fmt::Write;

/// Target SQL dialect.
///
/// The tag selects parameter placeholder syntax, identifier quoting for
/// projection aliases, the identity readback mechanism and a couple of
/// feature gates. Everything else the generator emits is common SQL.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    #[default]
    Generic,
    SqlServer,
    Postgres,
    MySql,
    MariaDb,
    Sqlite,
}

/// How a backend hands generated identity values back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityReturn {
    /// `OUTPUT INSERTED.<key>` clause.
    OutputClause,
    /// `RETURNING <key>` clause.
    Returning,
    /// Out-of-band last-insert-id reported with the affected count.
    LastInsertId,
}

impl Dialect {
    /// Placeholders are ordinal (`$1`) instead of named (`@name`).
    pub fn uses_ordinal_parameters(&self) -> bool {
        matches!(self, Dialect::Postgres | Dialect::Sqlite)
    }

    /// Write one parameter placeholder. `ordinal` is 1-based.
    pub fn write_placeholder(&self, out: &mut SqlBuffer, name: &str, ordinal: usize) {
        if self.uses_ordinal_parameters() {
            let _ = write!(out, "${ordinal}");
        } else {
            let _ = write!(out, "@{name}");
        }
    }

    /// Write an identifier exposed through `AS`, quoted the way the backend
    /// wants quoted aliases (double quotes, backticks, or nothing at all).
    pub fn write_alias_identifier(&self, out: &mut SqlBuffer, name: &str) {
        match self {
            Dialect::Postgres | Dialect::Sqlite => {
                out.push('"');
                write_escaped(out, name, '"', "\"\"");
                out.push('"');
            }
            Dialect::MySql | Dialect::MariaDb => {
                out.push('`');
                write_escaped(out, name, '`', "``");
                out.push('`');
            }
            Dialect::SqlServer | Dialect::Generic => out.push_str(name),
        }
    }

    pub fn supports_right_join(&self) -> bool {
        !matches!(self, Dialect::Sqlite)
    }

    pub fn identity_return(&self) -> IdentityReturn {
        match self {
            Dialect::SqlServer => IdentityReturn::OutputClause,
            Dialect::Postgres | Dialect::Sqlite => IdentityReturn::Returning,
            Dialect::MySql | Dialect::MariaDb | Dialect::Generic => IdentityReturn::LastInsertId,
        }
    }
}
