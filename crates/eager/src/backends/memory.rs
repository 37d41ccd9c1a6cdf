//! In-memory query executor
//!
//! Evaluates [`RelationQuery`]s over tables of JSON rows with the same join
//! key rules the stitcher uses, and records every query it receives. Used as
//! the stub data source in tests, benches and demos.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;

use crate::error::BoxError;
use crate::loading::stitcher::JoinKey;
use crate::query::{QueryExecutor, RelationQuery, THROUGH_OWNER_KEY};

/// A query as the executor received it
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedQuery {
    pub query: RelationQuery,
    /// Scope label the query ran under
    pub scope: Option<String>,
}

/// Tables of JSON rows answering relation queries
#[derive(Debug, Default)]
pub struct MemoryExecutor {
    tables: HashMap<String, Vec<JsonValue>>,
    failing: HashSet<String>,
    latency: Option<Duration>,
    log: Mutex<Vec<LoggedQuery>>,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a table
    pub fn with_table(mut self, table: &str, rows: Vec<JsonValue>) -> Self {
        self.tables.insert(table.to_string(), rows);
        self
    }

    /// Make every query against `table` fail
    pub fn fail_table(mut self, table: &str) -> Self {
        self.failing.insert(table.to_string());
        self
    }

    /// Delay every query by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn table(&self, table: &str) -> Option<&[JsonValue]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    /// Every query received so far, in arrival order
    pub async fn queries(&self) -> Vec<LoggedQuery> {
        self.log.lock().await.clone()
    }

    pub async fn query_count(&self) -> usize {
        self.log.lock().await.len()
    }

    /// Relation names of the received queries, in arrival order
    pub async fn queried_relations(&self) -> Vec<String> {
        self.log
            .lock()
            .await
            .iter()
            .map(|entry| entry.query.relation.clone())
            .collect()
    }

    pub async fn clear_log(&self) {
        self.log.lock().await.clear();
    }

    fn rows(&self, table: &str) -> Result<&[JsonValue], BoxError> {
        self.tables
            .get(table)
            .map(Vec::as_slice)
            .ok_or_else(|| format!("relation \"{}\" does not exist", table).into())
    }

    fn select(&self, query: &RelationQuery) -> Result<Vec<JsonValue>, BoxError> {
        let related = self.rows(&query.table)?;

        let Some(join) = &query.through else {
            return Ok(related
                .iter()
                .filter(|row| {
                    row.get(&query.key_column)
                        .is_some_and(|value| query.matches_key(value))
                })
                .cloned()
                .collect());
        };

        let mut rows = Vec::new();
        for link in self.rows(&join.table)? {
            let Some(owner) = link.get(&join.owner_column).filter(|v| query.matches_key(v)) else {
                continue;
            };
            let Some(target) = link.get(&join.related_column).and_then(JoinKey::from_value) else {
                continue;
            };

            for row in related {
                let matches = row
                    .get(&join.target_column)
                    .and_then(JoinKey::from_value)
                    .is_some_and(|key| key == target);
                if !matches {
                    continue;
                }
                let mut row = row.clone();
                if let Some(object) = row.as_object_mut() {
                    object.insert(THROUGH_OWNER_KEY.to_string(), owner.clone());
                }
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

#[async_trait]
impl QueryExecutor for MemoryExecutor {
    /// Label recorded alongside each query
    type Scope = String;

    async fn run_query(
        &self,
        query: &RelationQuery,
        scope: Option<&Self::Scope>,
    ) -> Result<Vec<JsonValue>, BoxError> {
        self.log.lock().await.push(LoggedQuery {
            query: query.clone(),
            scope: scope.cloned(),
        });

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.contains(&query.table) {
            return Err(format!("table \"{}\" is unavailable", query.table).into());
        }

        self.select(query)
    }
}
