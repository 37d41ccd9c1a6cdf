//! Relation queries - the descriptors handed to a query executor
//!
//! One `RelationQuery` fetches the related rows of one fetch step for a whole
//! batch of owner keys.

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::loading::stitcher::JoinKey;
use crate::relationships::RelationMapping;
use crate::security::{escape_identifier, qualified_column};

pub mod execution;

pub use execution::QueryExecutor;

/// Column carrying the owner key on rows fetched through a join table
pub const THROUGH_OWNER_KEY: &str = "__eager_owner_key";

/// Join against a through table for many-to-many relations
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThroughJoin {
    pub table: String,
    /// Join table column matched against the owner keys
    pub owner_column: String,
    /// Join table column pointing at the related rows
    pub related_column: String,
    /// Column on the related table the join table points at
    pub target_column: String,
}

/// Batched query for the related rows of one fetch step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationQuery {
    /// Relation being loaded, for diagnostics
    pub relation: String,
    /// Table holding the related rows
    pub table: String,
    /// Column filtered by `keys` (on `table`, or on the join table)
    pub key_column: String,
    /// Distinct, non-null owner keys
    pub keys: Vec<JsonValue>,
    pub through: Option<ThroughJoin>,
}

impl RelationQuery {
    /// Build the query for a relation mapping and a set of owner keys
    pub fn for_relation(relation: &str, mapping: &RelationMapping, keys: Vec<JsonValue>) -> Self {
        match &mapping.through {
            Some(through) => Self {
                relation: relation.to_string(),
                table: mapping.related_table.clone(),
                key_column: through.owner_column.clone(),
                keys,
                through: Some(ThroughJoin {
                    table: through.table.clone(),
                    owner_column: through.owner_column.clone(),
                    related_column: through.related_column.clone(),
                    target_column: mapping.related_column.clone(),
                }),
            },
            None => Self {
                relation: relation.to_string(),
                table: mapping.related_table.clone(),
                key_column: mapping.related_column.clone(),
                keys,
                through: None,
            },
        }
    }

    /// Copy of this query restricted to a subset of keys
    pub fn with_keys(&self, keys: Vec<JsonValue>) -> Self {
        Self {
            keys,
            ..self.clone()
        }
    }

    /// Owner keys in their normalised text form, the form they are bound in
    pub fn key_params(&self) -> Vec<String> {
        self.keys
            .iter()
            .filter_map(JoinKey::from_value)
            .map(|key| key.as_str().to_string())
            .collect()
    }

    /// Render PostgreSQL SQL with `$n` placeholders, one per key
    ///
    /// The key column is compared as `text` so that a key matches whatever
    /// the column type is, with the same normalisation the stitcher uses.
    pub fn to_sql_with_params(&self) -> (String, Vec<String>) {
        let params = self.key_params();
        let placeholders: Vec<String> = (1..=params.len()).map(|i| format!("${}", i)).collect();
        let placeholders = placeholders.join(", ");

        let sql = match &self.through {
            Some(join) => format!(
                "SELECT {table}.*, {owner} AS {alias} FROM {table} INNER JOIN {join_table} ON {join_related} = {target} WHERE {owner}::text IN ({placeholders})",
                table = escape_identifier(&self.table),
                owner = qualified_column(&join.table, &join.owner_column),
                alias = escape_identifier(THROUGH_OWNER_KEY),
                join_table = escape_identifier(&join.table),
                join_related = qualified_column(&join.table, &join.related_column),
                target = qualified_column(&self.table, &join.target_column),
                placeholders = placeholders,
            ),
            None => format!(
                "SELECT {table}.* FROM {table} WHERE {column}::text IN ({placeholders})",
                table = escape_identifier(&self.table),
                column = qualified_column(&self.table, &self.key_column),
                placeholders = placeholders,
            ),
        };

        (sql, params)
    }

    /// Whether a fetched row matches one of the owner keys
    pub fn matches_key(&self, value: &JsonValue) -> bool {
        let Some(key) = JoinKey::from_value(value) else {
            return false;
        };
        self.keys
            .iter()
            .filter_map(JoinKey::from_value)
            .any(|candidate| candidate == key)
    }
}
