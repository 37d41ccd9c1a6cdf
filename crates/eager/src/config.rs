//! Eager loading configuration

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{EagerError, EagerResult};

/// Configuration for the eager loader
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EagerLoadConfig {
    /// Maximum depth of an expression and of lazy wildcard expansion
    pub max_depth: usize,
    /// Guard for unbounded `^` recursion
    pub max_recursion_depth: usize,
    /// Split owner key sets larger than this into several queries
    pub max_batch_size: Option<usize>,
    /// Dispatch sibling relations of the same wave concurrently
    pub parallel_siblings: bool,
    /// Upper bound on concurrently running queries
    pub max_parallel_queries: usize,
    /// Timeout for a single query
    #[serde(with = "duration_ms")]
    pub query_timeout: Duration,
    /// Timeout for a whole eager load invocation
    #[serde(with = "optional_duration_ms")]
    pub load_timeout: Option<Duration>,
}

impl Default for EagerLoadConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            max_recursion_depth: 100,
            max_batch_size: None,
            parallel_siblings: true,
            max_parallel_queries: 10,
            query_timeout: Duration::from_secs(30),
            load_timeout: None,
        }
    }
}

impl EagerLoadConfig {
    /// Load configuration from `ELIF_EAGER_*` environment variables
    pub fn from_env() -> EagerResult<Self> {
        let mut config = Self::default();

        if let Some(value) = env_var::<usize>("ELIF_EAGER_MAX_DEPTH")? {
            config.max_depth = value;
        }
        if let Some(value) = env_var::<usize>("ELIF_EAGER_MAX_RECURSION_DEPTH")? {
            config.max_recursion_depth = value;
        }
        if let Some(value) = env_var::<usize>("ELIF_EAGER_MAX_BATCH_SIZE")? {
            config.max_batch_size = Some(value);
        }
        if let Some(value) = env_var::<bool>("ELIF_EAGER_PARALLEL")? {
            config.parallel_siblings = value;
        }
        if let Some(value) = env_var::<usize>("ELIF_EAGER_MAX_PARALLEL_QUERIES")? {
            config.max_parallel_queries = value;
        }
        if let Some(value) = env_var::<u64>("ELIF_EAGER_QUERY_TIMEOUT_MS")? {
            config.query_timeout = Duration::from_millis(value);
        }
        if let Some(value) = env_var::<u64>("ELIF_EAGER_LOAD_TIMEOUT_MS")? {
            config.load_timeout = Some(Duration::from_millis(value));
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> EagerResult<()> {
        if self.max_depth == 0 {
            return Err(EagerError::Configuration(
                "max_depth must be at least 1".to_string(),
            ));
        }
        if self.max_recursion_depth == 0 {
            return Err(EagerError::Configuration(
                "max_recursion_depth must be at least 1".to_string(),
            ));
        }
        if self.max_batch_size == Some(0) {
            return Err(EagerError::Configuration(
                "max_batch_size must be greater than 0".to_string(),
            ));
        }
        if self.max_parallel_queries == 0 {
            return Err(EagerError::Configuration(
                "max_parallel_queries must be at least 1".to_string(),
            ));
        }
        if self.query_timeout.is_zero() {
            return Err(EagerError::Configuration(
                "query_timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_recursion_depth(mut self, max_recursion_depth: usize) -> Self {
        self.max_recursion_depth = max_recursion_depth;
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = Some(max_batch_size);
        self
    }

    pub fn with_parallel_siblings(mut self, parallel: bool) -> Self {
        self.parallel_siblings = parallel;
        self
    }

    pub fn with_max_parallel_queries(mut self, max: usize) -> Self {
        self.max_parallel_queries = max;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = Some(timeout);
        self
    }

    /// Number of queries allowed in flight at once
    pub fn effective_parallelism(&self) -> usize {
        if self.parallel_siblings {
            self.max_parallel_queries.max(1)
        } else {
            1
        }
    }
}

fn env_var<T: FromStr>(name: &str) -> EagerResult<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|_| {
            EagerError::Configuration(format!("Invalid value '{}' for {}", raw, name))
        }),
        Err(_) => Ok(None),
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod optional_duration_ms {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}
