//! Query execution capability consumed by the fetch executor

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use super::RelationQuery;
use crate::error::BoxError;

/// Runs relation queries against a data source
///
/// Rows come back as JSON objects. For queries with a through join, every row
/// must carry the owning key under [`super::THROUGH_OWNER_KEY`]. Failures are
/// returned as-is and surface as `EagerError::QueryExecution`.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Connection or transaction scope shared by every query of one eager load
    type Scope: Send + Sync;

    async fn run_query(
        &self,
        query: &RelationQuery,
        scope: Option<&Self::Scope>,
    ) -> Result<Vec<JsonValue>, BoxError>;
}

#[async_trait]
impl<E> QueryExecutor for std::sync::Arc<E>
where
    E: QueryExecutor + ?Sized,
{
    type Scope = E::Scope;

    async fn run_query(
        &self,
        query: &RelationQuery,
        scope: Option<&Self::Scope>,
    ) -> Result<Vec<JsonValue>, BoxError> {
        (**self).run_query(query, scope).await
    }
}
