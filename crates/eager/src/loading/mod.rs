//! Eager loading: planning, execution and graph stitching
//! Turns relation expressions into batched queries and attaches the results

pub mod eager_loader;
pub mod executor;
pub mod plan;
pub mod planner;
pub mod stitcher;

pub use eager_loader::{EagerLoadRequest, EagerLoadResult, EagerLoadStats, EagerLoader};
pub use executor::{ExecutionStats, FetchExecutor};
pub use plan::{EagerPlan, Expansion, FetchStep};
pub use planner::EagerPlanner;
pub use stitcher::{collect_keys, GraphStitcher, JoinKey};
