use crate::Value;
use std::sync::Arc;

/// Shared column label list.
pub type RowNames = Arc<[String]>;
/// Owned row values aligned with a `RowNames`.
pub type Row = Box<[Value]>;

/// Outcome metadata of a modifying statement.
#[derive(Default, Debug, Clone, Copy)]
pub struct RowsAffected {
    /// Affected row count, when the backend reports one.
    pub rows_affected: Option<u64>,
    /// Identity value generated by the last insert, on backends that report
    /// it out of band instead of returning a row.
    pub last_insert_id: Option<i64>,
}

/// Row with column labels.
///
/// The entity statement writers label columns with property names, so a
/// labeled row can be bound back onto a record without positional knowledge.
#[derive(Debug, Clone)]
pub struct RowLabeled {
    pub labels: RowNames,
    pub values: Row,
}

impl RowLabeled {
    pub fn new(labels: RowNames, values: Row) -> Self {
        Self { labels, values }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Look up a value by label, falling back to a case-insensitive match.
    pub fn get(&self, label: &str) -> Option<&Value> {
        self.labels
            .iter()
            .position(|v| v == label)
            .or_else(|| {
                self.labels
                    .iter()
                    .position(|v| v.eq_ignore_ascii_case(label))
            })
            .map(|i| &self.values[i])
    }
}

impl Extend<RowsAffected> for RowsAffected {
    fn extend<T: IntoIterator<Item = RowsAffected>>(&mut self, iter: T) {
        for elem in iter {
            if self.rows_affected.is_some() || elem.rows_affected.is_some() {
                self.rows_affected = Some(
                    self.rows_affected.unwrap_or_default() + elem.rows_affected.unwrap_or_default(),
                );
            }
            if elem.last_insert_id.is_some() {
                self.last_insert_id = elem.last_insert_id;
            }
        }
    }
}

impl From<RowLabeled> for Row {
    fn from(value: RowLabeled) -> Self {
        value.values
    }
}
