mod eql;
mod error;
mod executor;
mod manager;
mod metadata;
mod query;
mod record;
mod row;
mod sql;
mod tenant;
mod tracker;
mod util;
mod value;

pub use ::anyhow::Context as ErrorContext;
pub use eql::*;
pub use error::*;
pub use executor::*;
pub use manager::*;
pub use metadata::*;
pub use query::*;
pub use record::*;
pub use row::*;
pub use sql::*;
pub use tenant::*;
pub use tracker::*;
pub use value::*;
pub mod stream {
    pub use ::futures::stream::*;
}
pub use ::futures::future;
