//! # elif-eager: Eager loading for elif.rs models
//!
//! Loads trees of related rows described by a compact relation expression
//! (`children.[pets, movies]`, `parent.^`, `*`) onto rows that were already
//! fetched, issuing one batched query per relation per level.
//!
//! The pieces, leaf first: [`expression`] parses and whitelists expressions,
//! [`relationships`] holds the per-model relation mappings, [`loading`] plans,
//! executes and stitches, and [`backends`] provides query executors.
//!
//! ```
//! use elif_eager::parse;
//!
//! let expression = parse("children.[pets, movies]").unwrap();
//! assert_eq!(expression.child("children").unwrap().children.len(), 2);
//! assert_eq!(expression.to_string(), "children.[pets, movies]");
//! ```

pub mod backends;
pub mod config;
pub mod error;
pub mod expression;
pub mod loading;
pub mod query;
pub mod relationships;
pub mod security;

pub use backends::MemoryExecutor;
#[cfg(feature = "postgres")]
pub use backends::PgQueryExecutor;
pub use config::EagerLoadConfig;
pub use error::{BoxError, EagerError, EagerResult};
pub use expression::{parse, AllowedExpression, ExpressionParser, RelationExpression};
pub use loading::{
    EagerLoadRequest, EagerLoadResult, EagerLoadStats, EagerLoader, EagerPlan, EagerPlanner,
    Expansion, FetchExecutor, FetchStep, GraphStitcher,
};
pub use query::{QueryExecutor, RelationQuery, THROUGH_OWNER_KEY};
pub use relationships::{RelationKind, RelationMapping, RelationRegistry, ThroughTable};
