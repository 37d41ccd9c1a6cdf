//! Fetch executor - runs an eager plan wave by wave and stitches the graph
//!
//! A wave is every step whose parent step has already run. The queries of a
//! wave run concurrently, each step writing into its own buffer. Recursive and
//! wildcard steps append new steps once their rows are known, which the next
//! wave picks up. Stitching happens once, bottom-up, after the last wave.

use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value as JsonValue;
use tracing::{debug, trace, warn};

use super::plan::{EagerPlan, Expansion, FetchStep};
use super::stitcher::{collect_keys, GraphStitcher};
use crate::config::EagerLoadConfig;
use crate::error::{EagerError, EagerResult};
use crate::query::{QueryExecutor, RelationQuery};
use crate::relationships::RelationRegistry;

/// Counters collected while executing a plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    /// Queries sent to the executor
    pub query_count: usize,
    /// Related rows returned by those queries
    pub records_loaded: usize,
    /// Deepest step that returned rows
    pub depth_loaded: usize,
    /// Steps skipped because their owner key set was empty
    pub skipped_steps: usize,
    /// Steps run, including lazily synthesized ones
    pub steps_executed: usize,
    pub waves: usize,
}

/// Executes [`EagerPlan`]s through a [`QueryExecutor`]
pub struct FetchExecutor<'a, E: QueryExecutor> {
    executor: &'a E,
    registry: &'a RelationRegistry,
    config: &'a EagerLoadConfig,
}

impl<'a, E: QueryExecutor> FetchExecutor<'a, E> {
    pub fn new(executor: &'a E, registry: &'a RelationRegistry, config: &'a EagerLoadConfig) -> Self {
        Self {
            executor,
            registry,
            config,
        }
    }

    /// Run the plan against `base_rows` and return them with relations attached
    ///
    /// The first failing query aborts the load; nothing partial is returned.
    pub async fn execute(
        &self,
        base_rows: Vec<JsonValue>,
        plan: EagerPlan,
        scope: Option<&E::Scope>,
    ) -> EagerResult<(Vec<JsonValue>, ExecutionStats)> {
        let mut base_rows = base_rows;
        if let Some(position) = base_rows.iter().position(|row| !row.is_object()) {
            return Err(EagerError::InvalidRow(format!(
                "base row {} is not an object",
                position
            )));
        }

        let mut steps = plan.steps;
        let mut buffers: Vec<Vec<JsonValue>> = vec![Vec::new(); steps.len()];
        let mut executed = vec![false; steps.len()];
        let mut stats = ExecutionStats::default();

        loop {
            let wave: Vec<usize> = (0..steps.len())
                .filter(|&i| !executed[i])
                .filter(|&i| steps[i].parent.map_or(true, |p| executed[p]))
                .collect();
            if wave.is_empty() {
                break;
            }
            stats.waves += 1;

            let mut queries = Vec::new();
            for &index in &wave {
                let step = &steps[index];
                let owners = match step.parent {
                    Some(parent) => &buffers[parent],
                    None => &base_rows,
                };
                let keys = collect_keys(owners, &step.mapping.owner_column);

                if keys.is_empty() {
                    debug!(relation = %step.path_string(), depth = step.depth, "no owner keys, skipping step");
                    stats.skipped_steps += 1;
                    continue;
                }

                debug!(
                    relation = %step.path_string(),
                    depth = step.depth,
                    keys = keys.len(),
                    "dispatching fetch step"
                );
                let query = RelationQuery::for_relation(&step.relation, &step.mapping, Vec::new());
                for chunk in self.chunk_keys(keys) {
                    queries.push((index, query.with_keys(chunk)));
                }
            }

            let results: Vec<(usize, Vec<JsonValue>)> = stream::iter(queries)
                .map(|(index, query)| async move {
                    let rows = self.run_query(&query, scope).await?;
                    Ok::<_, EagerError>((index, rows))
                })
                .buffered(self.config.effective_parallelism())
                .try_collect()
                .await?;

            for (index, rows) in results {
                stats.query_count += 1;
                stats.records_loaded += rows.len();
                buffers[index].extend(rows);
            }

            for &index in &wave {
                executed[index] = true;
                stats.steps_executed += 1;
                if buffers[index].is_empty() {
                    continue;
                }
                stats.depth_loaded = stats.depth_loaded.max(steps[index].depth);

                for step in self.expand(&steps[index], steps.len())? {
                    steps.push(step);
                    buffers.push(Vec::new());
                    executed.push(false);
                }
            }
        }

        // children always sit at higher indices than their parents
        for index in (0..steps.len()).rev() {
            let step = &steps[index];
            let children = std::mem::take(&mut buffers[index]);
            let parents = match step.parent {
                Some(parent) => &mut buffers[parent],
                None => &mut base_rows,
            };
            GraphStitcher::attach(parents, children, &step.relation, &step.mapping)?;
        }

        debug!(
            queries = stats.query_count,
            records = stats.records_loaded,
            skipped = stats.skipped_steps,
            waves = stats.waves,
            "eager load executed"
        );
        Ok((base_rows, stats))
    }

    /// Steps synthesized below a step that returned rows
    fn expand(&self, step: &FetchStep, next_index: usize) -> EagerResult<Vec<FetchStep>> {
        let owner_model = &step.mapping.related_model;

        match step.expansion {
            Expansion::None => Ok(Vec::new()),
            Expansion::Recursive { limit, level } => {
                if limit.is_some_and(|limit| level >= limit) {
                    return Ok(Vec::new());
                }
                if limit.is_none() && level >= self.config.max_recursion_depth {
                    warn!(relation = %step.path_string(), level, "recursive relation exceeded guard");
                    return Err(EagerError::ExpressionTooDeep {
                        path: step.child_path(&step.relation),
                        max_depth: self.config.max_recursion_depth,
                    });
                }

                let mapping = self.registry.require(owner_model, &step.relation)?.clone();
                Ok(vec![FetchStep {
                    index: next_index,
                    parent: Some(step.index),
                    path: step.child_path(&step.relation),
                    owner_model: owner_model.clone(),
                    relation: step.relation.clone(),
                    mapping,
                    depth: step.depth + 1,
                    expansion: Expansion::Recursive {
                        limit,
                        level: level + 1,
                    },
                }])
            }
            Expansion::WildcardAll => {
                let relations = self.registry.relations_for(owner_model);
                if let Some((relation, _)) = relations.first() {
                    if step.depth >= self.config.max_depth {
                        warn!(relation = %step.path_string(), "wildcard expansion exceeded guard");
                        return Err(EagerError::ExpressionTooDeep {
                            path: step.child_path(relation),
                            max_depth: self.config.max_depth,
                        });
                    }
                }

                Ok(relations
                    .into_iter()
                    .enumerate()
                    .map(|(offset, (relation, mapping))| FetchStep {
                        index: next_index + offset,
                        parent: Some(step.index),
                        path: step.child_path(relation),
                        owner_model: owner_model.clone(),
                        relation: relation.to_string(),
                        mapping: mapping.clone(),
                        depth: step.depth + 1,
                        expansion: Expansion::WildcardAll,
                    })
                    .collect())
            }
        }
    }

    fn chunk_keys(&self, keys: Vec<JsonValue>) -> Vec<Vec<JsonValue>> {
        match self.config.max_batch_size {
            Some(size) if size > 0 && keys.len() > size => {
                keys.chunks(size).map(|chunk| chunk.to_vec()).collect()
            }
            _ => vec![keys],
        }
    }

    async fn run_query(
        &self,
        query: &RelationQuery,
        scope: Option<&E::Scope>,
    ) -> EagerResult<Vec<JsonValue>> {
        let timeout: Duration = self.config.query_timeout;
        if tracing::enabled!(tracing::Level::TRACE) {
            let (sql, params) = query.to_sql_with_params();
            trace!(relation = %query.relation, sql = %sql, params = params.len(), "relation query");
        }

        match tokio::time::timeout(timeout, self.executor.run_query(query, scope)).await {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(source)) => {
                warn!(relation = %query.relation, error = %source, "relation query failed");
                Err(EagerError::QueryExecution {
                    relation: query.relation.clone(),
                    source,
                })
            }
            Err(_) => {
                warn!(relation = %query.relation, ?timeout, "relation query timed out");
                Err(EagerError::Timeout {
                    relation: query.relation.clone(),
                    after: timeout,
                })
            }
        }
    }
}
