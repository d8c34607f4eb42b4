//! PostgreSQL catalog introspection and statement execution over a shared pool.

use super::{Backend, ColumnInfo, Connector, SchemaIntrospector, SqlExecutor, TableIdentity};
use crate::config::ConnectionConfig;
use crate::error::AppError;
use crate::sql::{from_pg_row, QueryBuf, Row};
use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

const PRIMARY_KEY_SQL: &str = r#"
    SELECT kcu.column_name::text
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
      ON kcu.constraint_name = tc.constraint_name
     AND kcu.constraint_schema = tc.constraint_schema
     AND kcu.table_name = tc.table_name
    WHERE tc.constraint_type = 'PRIMARY KEY'
      AND tc.table_schema = $1
      AND tc.table_name = $2
    ORDER BY kcu.ordinal_position
"#;

const COLUMNS_SQL: &str = r#"
    SELECT a.attname::text,
           t.typname::text,
           format_type(a.atttypid, a.atttypmod),
           format_type(a.atttypid, NULL)
    FROM pg_catalog.pg_attribute a
    JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    JOIN pg_catalog.pg_type t ON t.oid = a.atttypid
    WHERE n.nspname = $1
      AND c.relname = $2
      AND c.relkind IN ('r', 'p', 'v', 'm', 'f')
      AND a.attnum > 0
      AND NOT a.attisdropped
    ORDER BY a.attnum
"#;

const SCHEMAS_SQL: &str = r#"
    SELECT schema_name::text
    FROM information_schema.schemata
    WHERE schema_name NOT LIKE 'pg\_%'
      AND schema_name <> 'information_schema'
    ORDER BY schema_name
"#;

const TABLES_SQL: &str = r#"
    SELECT table_name::text
    FROM information_schema.tables
    WHERE table_schema = $1
      AND table_type IN ('BASE TABLE', 'VIEW')
    ORDER BY table_name
"#;

/// One pool; every statement acquires a connection and returns it when done.
#[derive(Clone)]
pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    pub fn new(pool: PgPool) -> Self {
        PgBackend { pool }
    }

    fn bind<'q>(q: &'q QueryBuf) -> Query<'q, Postgres, PgArguments> {
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(p);
        }
        query
    }
}

#[async_trait]
impl SchemaIntrospector for PgBackend {
    async fn primary_key_columns(&self, table: &TableIdentity) -> Result<Vec<String>, AppError> {
        let rows: Vec<(String,)> = sqlx::query_as(PRIMARY_KEY_SQL)
            .bind(&table.database)
            .bind(&table.table)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(c,)| c).collect())
    }

    async fn columns(&self, table: &TableIdentity) -> Result<Vec<ColumnInfo>, AppError> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(COLUMNS_SQL)
            .bind(&table.database)
            .bind(&table.table)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(name, udt, sql_type, cast_type)| {
                ColumnInfo::new(name, udt, sql_type).with_cast_type(cast_type)
            })
            .collect())
    }

    async fn list_schemas(&self) -> Result<Vec<String>, AppError> {
        let rows: Vec<(String,)> = sqlx::query_as(SCHEMAS_SQL).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(s,)| s).collect())
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<String>, AppError> {
        let rows: Vec<(String,)> = sqlx::query_as(TABLES_SQL)
            .bind(schema)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(t,)| t).collect())
    }
}

#[async_trait]
impl SqlExecutor for PgBackend {
    async fn fetch_all(&self, q: &QueryBuf) -> Result<Vec<Row>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let rows = Self::bind(q)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::from_db)?;
        Ok(rows.iter().map(from_pg_row).collect())
    }

    async fn execute(&self, q: &QueryBuf) -> Result<u64, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
        let done = Self::bind(q)
            .execute(&self.pool)
            .await
            .map_err(AppError::from_db)?;
        Ok(done.rows_affected())
    }
}

/// Hands out one pool per database URL, so every table of a database shares connections.
#[derive(Default)]
pub struct PgConnector {
    pools: Mutex<HashMap<String, PgPool>>,
}

impl PgConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Connector for PgConnector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Backend>, AppError> {
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(&config.database_url) {
            let backend: Arc<dyn Backend> = Arc::new(PgBackend::new(pool.clone()));
            return Ok(backend);
        }
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .map_err(|e| AppError::Configuration(format!("connect: {}", e)))?;
        tracing::info!(max_connections = config.max_connections, "opened connection pool");
        pools.insert(config.database_url.clone(), pool.clone());
        let backend: Arc<dyn Backend> = Arc::new(PgBackend::new(pool));
        Ok(backend)
    }
}
