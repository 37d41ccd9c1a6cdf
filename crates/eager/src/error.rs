//! Error types for the eager loading engine
//!
//! Every failure surfaces as a single [`EagerError`] carrying enough structure
//! (kind plus the offending identifier, path or offset) for callers to act on
//! it without re-parsing the message.

use std::time::Duration;
use thiserror::Error;

/// Boxed error produced by a query executor
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for eager loading operations
pub type EagerResult<T> = Result<T, EagerError>;

/// Error types for expression parsing, planning and execution
#[derive(Error, Debug)]
pub enum EagerError {
    /// Malformed relation expression
    #[error("Parse error at position {position}: {message}")]
    Parse { position: usize, message: String },

    /// Invalid or conflicting relation registration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A named relation is not declared on the resolved model
    #[error("Relation '{relation}' is not defined for model '{model}'")]
    UnknownRelation { model: String, relation: String },

    /// The requested expression reaches outside the allowed expression
    #[error("Relation path '{}' is not allowed", .path.join("."))]
    DisallowedExpression { path: Vec<String> },

    /// The expression (or its lazy expansion) went deeper than the configured guard
    #[error("Relation path '{}' exceeds the maximum depth of {max_depth}", .path.join("."))]
    ExpressionTooDeep { path: Vec<String>, max_depth: usize },

    /// The query executor failed; the cause is kept verbatim
    #[error("Query for relation '{relation}' failed: {source}")]
    QueryExecution {
        relation: String,
        #[source]
        source: BoxError,
    },

    /// A query or the whole load did not finish in time
    #[error("Loading '{relation}' timed out after {after:?}")]
    Timeout { relation: String, after: Duration },

    /// A row handed to the engine is not a JSON object
    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

impl EagerError {
    /// Create a parse error at the given character offset
    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        EagerError::Parse {
            position,
            message: message.into(),
        }
    }

    /// Create an unknown relation error
    pub fn unknown_relation(model: &str, relation: &str) -> Self {
        EagerError::UnknownRelation {
            model: model.to_string(),
            relation: relation.to_string(),
        }
    }

    /// Stable identifier of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            EagerError::Parse { .. } => "parse",
            EagerError::Configuration(_) => "configuration",
            EagerError::UnknownRelation { .. } => "unknown_relation",
            EagerError::DisallowedExpression { .. } => "disallowed_expression",
            EagerError::ExpressionTooDeep { .. } => "expression_too_deep",
            EagerError::QueryExecution { .. } => "query_execution",
            EagerError::Timeout { .. } => "timeout",
            EagerError::InvalidRow(_) => "invalid_row",
        }
    }

    /// Whether the error was raised before any query was issued
    pub fn is_pre_execution(&self) -> bool {
        matches!(
            self,
            EagerError::Parse { .. }
                | EagerError::Configuration(_)
                | EagerError::UnknownRelation { .. }
                | EagerError::DisallowedExpression { .. }
        )
    }
}
