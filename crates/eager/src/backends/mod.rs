//! Query executors for concrete data sources

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::{LoggedQuery, MemoryExecutor};
#[cfg(feature = "postgres")]
pub use postgres::PgQueryExecutor;
