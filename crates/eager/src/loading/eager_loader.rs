use std::sync::Arc;
use std::time::Instant;

use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use super::executor::{ExecutionStats, FetchExecutor};
use super::plan::EagerPlan;
use super::planner::EagerPlanner;
use crate::config::EagerLoadConfig;
use crate::error::{EagerError, EagerResult};
use crate::expression::{AllowedExpression, RelationExpression};
use crate::query::QueryExecutor;
use crate::relationships::RelationRegistry;

/// Result of an eager loading operation
#[derive(Debug, Clone)]
pub struct EagerLoadResult {
    /// Base rows with every requested relation attached
    pub rows: Vec<JsonValue>,
    /// Performance statistics
    pub stats: EagerLoadStats,
}

/// Statistics about the eager loading operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EagerLoadStats {
    /// Total execution time in milliseconds
    pub execution_time_ms: u64,
    /// Number of queries executed
    pub query_count: usize,
    /// Total related records loaded
    pub records_loaded: usize,
    /// Number of relationship levels that returned rows
    pub depth_loaded: usize,
    /// Steps that issued no query because there was nothing to load
    pub skipped_steps: usize,
}

impl EagerLoadStats {
    fn from_execution(stats: ExecutionStats, started: Instant) -> Self {
        Self {
            execution_time_ms: started.elapsed().as_millis() as u64,
            query_count: stats.query_count,
            records_loaded: stats.records_loaded,
            depth_loaded: stats.depth_loaded,
            skipped_steps: stats.skipped_steps,
        }
    }
}

/// Entry point for eager loading relations onto already fetched rows
pub struct EagerLoader<E: QueryExecutor> {
    registry: Arc<RelationRegistry>,
    executor: E,
    config: EagerLoadConfig,
}

impl<E: QueryExecutor> EagerLoader<E> {
    /// Create a loader with the default configuration
    pub fn new(registry: Arc<RelationRegistry>, executor: E) -> Self {
        Self {
            registry,
            executor,
            config: EagerLoadConfig::default(),
        }
    }

    /// Create a loader with a custom configuration
    pub fn with_config(
        registry: Arc<RelationRegistry>,
        executor: E,
        config: EagerLoadConfig,
    ) -> EagerResult<Self> {
        config.validate()?;
        Ok(Self {
            registry,
            executor,
            config,
        })
    }

    pub fn registry(&self) -> &RelationRegistry {
        &self.registry
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn config(&self) -> &EagerLoadConfig {
        &self.config
    }

    pub fn planner(&self) -> EagerPlanner {
        EagerPlanner::with_config(Arc::clone(&self.registry), self.config.clone())
    }

    /// Parse, validate and plan an expression without running it
    pub fn plan(
        &self,
        model: &str,
        expression: &str,
        allowed: Option<&str>,
    ) -> EagerResult<EagerPlan> {
        let expression = RelationExpression::parse(expression)?;
        let allowed = allowed.map(AllowedExpression::parse).transpose()?;
        self.planner().plan(model, &expression, allowed.as_ref())
    }

    /// Load the relations described by `expression` onto `base_rows`
    pub async fn load_related(
        &self,
        base_rows: Vec<JsonValue>,
        model: &str,
        expression: &str,
        allowed: Option<&str>,
    ) -> EagerResult<Vec<JsonValue>> {
        self.request(model)
            .with(expression)
            .allow_str(allowed)
            .load(base_rows)
            .await
            .map(|result| result.rows)
    }

    /// Like [`load_related`](Self::load_related), issuing every query against `scope`
    pub async fn load_related_scoped(
        &self,
        base_rows: Vec<JsonValue>,
        model: &str,
        expression: &str,
        allowed: Option<&str>,
        scope: &E::Scope,
    ) -> EagerResult<Vec<JsonValue>> {
        self.request(model)
            .with(expression)
            .allow_str(allowed)
            .scope(scope)
            .load(base_rows)
            .await
            .map(|result| result.rows)
    }

    /// Start building an eager load for rows of `model`
    pub fn request(&self, model: &str) -> EagerLoadRequest<'_, E> {
        EagerLoadRequest {
            loader: self,
            model: model.to_string(),
            expression: RelationExpression::root(),
            allowed: None,
            scope: None,
            error: None,
        }
    }

    async fn run(
        &self,
        base_rows: Vec<JsonValue>,
        model: &str,
        expression: &RelationExpression,
        allowed: Option<&AllowedExpression>,
        scope: Option<&E::Scope>,
    ) -> EagerResult<EagerLoadResult> {
        let started = Instant::now();
        let plan = self.planner().plan(model, expression, allowed)?;
        let executor = FetchExecutor::new(&self.executor, &self.registry, &self.config);

        let execution = executor.execute(base_rows, plan, scope);
        let (rows, stats) = match self.config.load_timeout {
            Some(limit) => match tokio::time::timeout(limit, execution).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(model, expression = %expression, ?limit, "eager load timed out");
                    return Err(EagerError::Timeout {
                        relation: expression.to_string(),
                        after: limit,
                    });
                }
            },
            None => execution.await?,
        };

        let stats = EagerLoadStats::from_execution(stats, started);
        debug!(
            model,
            expression = %expression,
            queries = stats.query_count,
            records = stats.records_loaded,
            elapsed_ms = stats.execution_time_ms,
            "eager load finished"
        );
        Ok(EagerLoadResult { rows, stats })
    }
}

/// Builder for one eager load invocation
///
/// Parse errors from [`with`](Self::with) and [`allow`](Self::allow) are kept
/// and returned by [`load`](Self::load) before anything is queried.
pub struct EagerLoadRequest<'a, E: QueryExecutor> {
    loader: &'a EagerLoader<E>,
    model: String,
    expression: RelationExpression,
    allowed: Option<AllowedExpression>,
    scope: Option<&'a E::Scope>,
    error: Option<EagerError>,
}

impl<'a, E: QueryExecutor> EagerLoadRequest<'a, E> {
    /// Add relations to load; repeated calls are merged
    pub fn with(mut self, expression: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        let merged = RelationExpression::parse(expression)
            .and_then(|parsed| self.expression.merge(parsed));
        if let Err(e) = merged {
            self.error = Some(e);
        }
        self
    }

    /// Add an already parsed expression
    pub fn with_expression(mut self, expression: RelationExpression) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.expression.merge(expression) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Restrict the request to the given allowed expression
    pub fn allow(mut self, allowed: &str) -> Self {
        match AllowedExpression::parse(allowed) {
            Ok(allowed) => self.allowed = Some(allowed),
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    pub fn allow_expression(mut self, allowed: AllowedExpression) -> Self {
        self.allowed = Some(allowed);
        self
    }

    fn allow_str(self, allowed: Option<&str>) -> Self {
        match allowed {
            Some(allowed) => self.allow(allowed),
            None => self,
        }
    }

    /// Issue every query of this load against `scope`
    pub fn scope(mut self, scope: &'a E::Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// The merged expression so far
    pub fn expression(&self) -> &RelationExpression {
        &self.expression
    }

    pub async fn load(self, base_rows: Vec<JsonValue>) -> EagerResult<EagerLoadResult> {
        if let Some(error) = self.error {
            return Err(error);
        }

        self.loader
            .run(
                base_rows,
                &self.model,
                &self.expression,
                self.allowed.as_ref(),
                self.scope,
            )
            .await
    }
}
