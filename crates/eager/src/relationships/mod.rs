//! Relationships Module - Relation mappings and the registry they live in

pub mod metadata;
pub mod registry;

pub use metadata::*;
pub use registry::*;
