//! PostgreSQL query executor on top of sqlx
//!
//! Keys are bound as `text` and compared against `"column"::text`, so a key
//! joins whatever the column type is (`integer`, `uuid`, `varchar`).

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Transaction};
use tokio::sync::Mutex;
use tracing::trace;

use crate::error::BoxError;
use crate::query::{QueryExecutor, RelationQuery};

/// Runs relation queries on a `PgPool`, or on a caller supplied transaction
#[derive(Debug, Clone)]
pub struct PgQueryExecutor {
    pool: PgPool,
}

impl PgQueryExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl QueryExecutor for PgQueryExecutor {
    type Scope = Mutex<Transaction<'static, Postgres>>;

    async fn run_query(
        &self,
        query: &RelationQuery,
        scope: Option<&Self::Scope>,
    ) -> Result<Vec<JsonValue>, BoxError> {
        let (sql, params) = query.to_sql_with_params();
        trace!(relation = %query.relation, sql = %sql, "executing relation query");

        let mut statement = sqlx::query(&sql);
        for param in params {
            statement = statement.bind(param);
        }

        let rows = match scope {
            Some(transaction) => {
                let mut transaction = transaction.lock().await;
                statement.fetch_all(&mut **transaction).await?
            }
            None => statement.fetch_all(&self.pool).await?,
        };

        Ok(rows.iter().map(row_to_json).collect())
    }
}

/// Convert a PostgreSQL row to a JSON object
pub fn row_to_json(row: &PgRow) -> JsonValue {
    use sqlx::{Column, Row};
    let mut map = serde_json::Map::new();

    for (i, column) in row.columns().iter().enumerate() {
        let value = if let Ok(value) = row.try_get::<Option<String>, _>(i) {
            value.map_or(JsonValue::Null, JsonValue::String)
        } else if let Ok(value) = row.try_get::<Option<i64>, _>(i) {
            value.map_or(JsonValue::Null, JsonValue::from)
        } else if let Ok(value) = row.try_get::<Option<i32>, _>(i) {
            value.map_or(JsonValue::Null, JsonValue::from)
        } else if let Ok(value) = row.try_get::<Option<i16>, _>(i) {
            value.map_or(JsonValue::Null, JsonValue::from)
        } else if let Ok(value) = row.try_get::<Option<f64>, _>(i) {
            value.map_or(JsonValue::Null, JsonValue::from)
        } else if let Ok(value) = row.try_get::<Option<f32>, _>(i) {
            value.map_or(JsonValue::Null, |v| JsonValue::from(v as f64))
        } else if let Ok(value) = row.try_get::<Option<bool>, _>(i) {
            value.map_or(JsonValue::Null, JsonValue::Bool)
        } else if let Ok(value) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i) {
            value.map_or(JsonValue::Null, |v| JsonValue::String(v.to_rfc3339()))
        } else if let Ok(value) = row.try_get::<Option<chrono::NaiveDateTime>, _>(i) {
            value.map_or(JsonValue::Null, |v| JsonValue::String(v.to_string()))
        } else if let Ok(value) = row.try_get::<Option<uuid::Uuid>, _>(i) {
            value.map_or(JsonValue::Null, |v| JsonValue::String(v.to_string()))
        } else if let Ok(value) = row.try_get::<Option<JsonValue>, _>(i) {
            value.unwrap_or(JsonValue::Null)
        } else {
            JsonValue::Null
        };

        map.insert(column.name().to_string(), value);
    }

    JsonValue::Object(map)
}
