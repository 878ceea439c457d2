//! PostgreSQL storage backend
//!
//! Statements are rendered by `storage::sql` and executed through sqlx.
//! Selects are wrapped in `to_jsonb` so every row comes back as one JSON
//! object regardless of column types.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::query::Query;
use sqlx::{Executor, PgPool, Postgres, Row as SqlxRow};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::PoolConfig;
use crate::error::{ModelError, ModelResult};
use crate::storage::sql::{
    render_delete, render_insert, render_select, render_update, ColumnTypes, RenderedSql,
    SqlValue,
};
use crate::storage::statement::{DeleteStatement, InsertStatement, SelectStatement, UpdateStatement};
use crate::storage::{Row, Storage, StorageTransaction};
use crate::transaction::TransactionConfig;

#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
    types: Arc<ColumnTypes>,
}

impl PostgresStorage {
    pub async fn connect(database_url: &str, config: &PoolConfig) -> ModelResult<Self> {
        let mut options = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .test_before_acquire(config.test_before_acquire);

        if let Some(idle_timeout) = config.idle_timeout {
            options = options.idle_timeout(idle_timeout);
        }

        if let Some(max_lifetime) = config.max_lifetime {
            options = options.max_lifetime(max_lifetime);
        }

        let pool = options.connect(database_url).await.map_err(|e| {
            ModelError::Database(format!("Failed to create PostgreSQL pool: {}", e))
        })?;

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            types: Arc::new(ColumnTypes::default()),
        }
    }

    /// Column types used to cast text and null parameters
    pub fn with_column_types(mut self, types: ColumnTypes) -> Self {
        self.types = Arc::new(types);
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &SqlValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        SqlValue::Null => query.bind(Option::<String>::None),
        SqlValue::Bool(b) => query.bind(*b),
        SqlValue::Int(i) => query.bind(*i),
        SqlValue::Float(f) => query.bind(*f),
        SqlValue::Text(s) => query.bind(s.clone()),
        SqlValue::Json(j) => query.bind(j.clone()),
    }
}

fn build_query(rendered: &RenderedSql) -> Query<'_, Postgres, PgArguments> {
    let mut query = sqlx::query(&rendered.sql);
    for param in &rendered.params {
        query = bind_value(query, param);
    }
    query
}

fn wrap_select(rendered: RenderedSql) -> RenderedSql {
    RenderedSql {
        sql: format!("SELECT to_jsonb(q) AS row FROM ({}) q", rendered.sql),
        params: rendered.params,
    }
}

async fn fetch_rows<'c, E>(
    executor: E,
    statement: &SelectStatement,
    types: &ColumnTypes,
) -> ModelResult<Vec<Row>>
where
    E: Executor<'c, Database = Postgres>,
{
    let rendered = wrap_select(render_select(statement, types)?);
    debug!("Executing select: {}", rendered.sql);

    let rows = build_query(&rendered)
        .fetch_all(executor)
        .await
        .map_err(|e| ModelError::Database(format!("Query fetch failed: {}", e)))?;

    let mut decoded = Vec::with_capacity(rows.len());
    for row in rows {
        let value: Value = row
            .try_get("row")
            .map_err(|e| ModelError::Serialization(format!("Failed to decode row: {}", e)))?;
        match value {
            Value::Object(map) => decoded.push(map),
            other => {
                return Err(ModelError::Serialization(format!(
                    "expected a row object, got {}",
                    other
                )))
            }
        }
    }
    Ok(decoded)
}

async fn insert_rows<'c, E>(
    executor: E,
    statement: &InsertStatement,
    types: &ColumnTypes,
) -> ModelResult<Vec<i64>>
where
    E: Executor<'c, Database = Postgres>,
{
    if statement.rows.is_empty() {
        return Ok(Vec::new());
    }

    let rendered = render_insert(statement, types)?;
    debug!("Executing insert: {}", rendered.sql);

    let rows = build_query(&rendered)
        .fetch_all(executor)
        .await
        .map_err(|e| ModelError::Database(format!("Insert failed: {}", e)))?;

    rows.iter()
        .map(|row| {
            row.try_get::<i64, _>(0)
                .map_err(|e| ModelError::Database(format!("Failed to read generated key: {}", e)))
        })
        .collect()
}

async fn execute_rendered<'c, E>(executor: E, rendered: RenderedSql) -> ModelResult<u64>
where
    E: Executor<'c, Database = Postgres>,
{
    debug!("Executing statement: {}", rendered.sql);
    let result = build_query(&rendered)
        .execute(executor)
        .await
        .map_err(|e| ModelError::Database(format!("Query execution failed: {}", e)))?;
    Ok(result.rows_affected())
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn select(&self, statement: &SelectStatement) -> ModelResult<Vec<Row>> {
        fetch_rows(&self.pool, statement, &self.types).await
    }

    async fn insert(&self, statement: &InsertStatement) -> ModelResult<Vec<i64>> {
        insert_rows(&self.pool, statement, &self.types).await
    }

    async fn update(&self, statement: &UpdateStatement) -> ModelResult<u64> {
        if statement.values.is_empty() {
            return Ok(0);
        }
        execute_rendered(&self.pool, render_update(statement, &self.types)?).await
    }

    async fn delete(&self, statement: &DeleteStatement) -> ModelResult<u64> {
        execute_rendered(&self.pool, render_delete(statement, &self.types)?).await
    }

    async fn begin(&self, config: &TransactionConfig) -> ModelResult<Arc<dyn StorageTransaction>> {
        debug!("Beginning transaction with config: {:?}", config);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ModelError::Transaction(format!("Failed to begin transaction: {}", e)))?;

        if let Some(isolation_level) = config.isolation_level {
            let sql = format!("SET TRANSACTION ISOLATION LEVEL {}", isolation_level.as_sql());
            sqlx::query(&sql).execute(&mut *tx).await.map_err(|e| {
                ModelError::Transaction(format!("Failed to set isolation level: {}", e))
            })?;
        }

        if config.read_only {
            sqlx::query("SET TRANSACTION READ ONLY")
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    ModelError::Transaction(format!("Failed to set read-only mode: {}", e))
                })?;
        }

        Ok(Arc::new(PostgresTransaction {
            inner: Mutex::new(Some(tx)),
            types: Arc::clone(&self.types),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

/// A single sqlx transaction shared by every statement of a
/// `Database::transaction` scope
pub struct PostgresTransaction {
    inner: Mutex<Option<sqlx::Transaction<'static, Postgres>>>,
    types: Arc<ColumnTypes>,
}

fn finished() -> ModelError {
    ModelError::Transaction("Transaction already committed or rolled back".to_string())
}

#[async_trait]
impl Storage for PostgresTransaction {
    async fn select(&self, statement: &SelectStatement) -> ModelResult<Vec<Row>> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        fetch_rows(&mut **tx, statement, &self.types).await
    }

    async fn insert(&self, statement: &InsertStatement) -> ModelResult<Vec<i64>> {
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        insert_rows(&mut **tx, statement, &self.types).await
    }

    async fn update(&self, statement: &UpdateStatement) -> ModelResult<u64> {
        if statement.values.is_empty() {
            return Ok(0);
        }
        let rendered = render_update(statement, &self.types)?;
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        execute_rendered(&mut **tx, rendered).await
    }

    async fn delete(&self, statement: &DeleteStatement) -> ModelResult<u64> {
        let rendered = render_delete(statement, &self.types)?;
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        execute_rendered(&mut **tx, rendered).await
    }

    async fn begin(&self, _config: &TransactionConfig) -> ModelResult<Arc<dyn StorageTransaction>> {
        Err(ModelError::Transaction(
            "Nested transactions are not supported".to_string(),
        ))
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[async_trait]
impl StorageTransaction for PostgresTransaction {
    async fn commit(&self) -> ModelResult<()> {
        let tx = self.inner.lock().await.take().ok_or_else(finished)?;
        tx.commit()
            .await
            .map_err(|e| ModelError::Transaction(format!("Failed to commit transaction: {}", e)))
    }

    async fn rollback(&self) -> ModelResult<()> {
        let tx = self.inner.lock().await.take().ok_or_else(finished)?;
        tx.rollback()
            .await
            .map_err(|e| ModelError::Transaction(format!("Failed to rollback transaction: {}", e)))
    }

    fn as_storage(&self) -> &dyn Storage {
        self
    }
}
