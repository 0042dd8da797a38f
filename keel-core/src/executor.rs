use crate::{
    Result, RowLabeled, RowsAffected, Value,
    stream::{Stream, StreamExt, TryStreamExt},
};
use std::future::Future;

/// A parameterized statement handed to the connection provider.
///
/// `params` carries `(name, value)` pairs in the order the placeholders were
/// first referenced; ordinal-placeholder backends bind positionally, named
/// backends bind by name. Values never appear inside `sql`.
#[derive(Debug, Default, Clone)]
pub struct Command {
    pub sql: String,
    pub params: Vec<(String, Value)>,
}

impl Command {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }
}

/// Transaction isolation requested from the connection provider.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// Items streamed back from `CommandExecutor::run`: rows or effects.
#[derive(Debug)]
pub enum QueryOutcome {
    /// A labeled result row.
    Row(RowLabeled),
    /// A modify effect aggregation.
    Affected(RowsAffected),
}

impl From<RowLabeled> for QueryOutcome {
    fn from(value: RowLabeled) -> Self {
        QueryOutcome::Row(value)
    }
}

impl From<RowsAffected> for QueryOutcome {
    fn from(value: RowsAffected) -> Self {
        QueryOutcome::Affected(value)
    }
}

/// The opaque connection seam.
///
/// One executor is owned by one entity manager for its lifetime; transactions
/// nest at most one deep. Implementations must roll an open transaction back
/// when dropped without `commit`.
pub trait CommandExecutor {
    /// Execute a statement, streaming rows and/or affected counts.
    fn run<'s>(&'s mut self, command: Command) -> impl Stream<Item = Result<QueryOutcome>> + 's;

    /// Execute and yield only the result rows.
    fn fetch<'s>(&'s mut self, command: Command) -> impl Stream<Item = Result<RowLabeled>> + 's {
        self.run(command).filter_map(|v| async move {
            match v {
                Ok(QueryOutcome::Row(v)) => Some(Ok(v)),
                Err(e) => Some(Err(e)),
                _ => None,
            }
        })
    }

    /// Execute and aggregate the affected-rows outcome.
    fn execute<'s>(&'s mut self, command: Command) -> impl Future<Output = Result<RowsAffected>> + 's {
        self.run(command)
            .filter_map(|v| async move {
                match v {
                    Ok(QueryOutcome::Affected(v)) => Some(Ok(v)),
                    Err(e) => Some(Err(e)),
                    _ => None,
                }
            })
            .try_collect()
    }

    /// Open a transaction on the underlying connection.
    fn begin(&mut self, isolation: Isolation) -> impl Future<Output = Result<()>>;

    /// Commit the open transaction.
    fn commit(&mut self) -> impl Future<Output = Result<()>>;

    /// Roll the open transaction back.
    fn rollback(&mut self) -> impl Future<Output = Result<()>>;
}
