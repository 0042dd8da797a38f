use thiserror::Error;

/// Crate-wide result alias over the fixed error taxonomy.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure surfaced by the core, as a single tagged value.
///
/// Textual positions are byte offsets into the query source. Executor
/// failures are wrapped unchanged; the core never retries them.
#[derive(Debug, Error)]
pub enum Error {
    #[error("lex error at offset {position}: {message}")]
    Lex { position: usize, message: String },

    #[error("parse error at offset {position}: expected {expected}, found {found}")]
    Parse {
        position: usize,
        expected: String,
        found: String,
    },

    #[error("unknown entity `{0}`")]
    UnknownEntity(String),

    #[error("unknown property `{property}` on entity `{entity}`")]
    UnknownProperty { entity: String, property: String },

    #[error("unknown alias `{0}`")]
    UnknownAlias(String),

    #[error("unknown relationship `{relationship}` on entity `{entity}`")]
    UnknownRelationship {
        entity: String,
        relationship: String,
    },

    #[error("unknown parameter `:{0}`")]
    UnknownParameter(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("ambiguous aggregate over `{0}`")]
    AmbiguousAggregate(String),

    #[error("invalid mapping: {0}")]
    Mapping(String),

    #[error("query returned {0} rows where at most one was expected")]
    NonUnique(usize),

    #[error("entity of `{entity}` belongs to tenant `{entity_tenant}` while the ambient tenant is `{ambient}`")]
    CrossTenantViolation {
        entity: String,
        entity_tenant: String,
        ambient: String,
    },

    /// Reserved for optimistic locking.
    #[error("concurrency conflict")]
    ConcurrencyConflict,

    #[error("executor failure: {0:#}")]
    Executor(#[from] anyhow::Error),
}

impl Error {
    /// Wrap an execution-seam misuse message as an executor failure.
    pub fn executor(message: impl Into<String>) -> Self {
        Error::Executor(anyhow::Error::msg(message.into()))
    }
}
