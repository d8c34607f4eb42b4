//! In-memory backend that records statements instead of running them. Built for unit tests and
//! behind the `testing` feature for the HTTP tests.

use crate::config::ConnectionConfig;
use crate::error::AppError;
use crate::schema::{
    Backend, ColumnInfo, Connector, SchemaIntrospector, SqlExecutor, TableIdentity,
};
use crate::sql::{QueryBuf, Row, SqlValue};
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

type TableKey = (String, String);

#[derive(Default)]
pub struct RecordingBackend {
    tables: BTreeMap<TableKey, (Vec<ColumnInfo>, Vec<String>)>,
    row_count: i64,
    introspection_delay: Option<Duration>,
    introspections: AtomicUsize,
    log: Mutex<Vec<QueryBuf>>,
    results: Mutex<VecDeque<Vec<Row>>>,
    affected: Mutex<VecDeque<u64>>,
    failures: Mutex<VecDeque<AppError>>,
}

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table: columns as (name, udt_name, sql_type), key in declaration order.
    pub fn with_table(
        mut self,
        database: &str,
        table: &str,
        columns: &[(&str, &str, &str)],
        primary_key: &[&str],
    ) -> Self {
        let columns = columns
            .iter()
            .map(|(n, u, s)| ColumnInfo::new(*n, *u, *s))
            .collect();
        let key = primary_key.iter().map(|s| s.to_string()).collect();
        self.tables
            .insert((database.to_string(), table.to_string()), (columns, key));
        self
    }

    /// Value returned by `SELECT count(*)`.
    pub fn with_row_count(mut self, n: i64) -> Self {
        self.row_count = n;
        self
    }

    /// Sleep inside column introspection, to widen races in concurrency tests.
    pub fn with_introspection_delay(mut self, delay: Duration) -> Self {
        self.introspection_delay = Some(delay);
        self
    }

    /// Number of column introspections performed (one per handle construction attempt).
    pub fn introspections(&self) -> usize {
        self.introspections.load(Ordering::SeqCst)
    }

    /// Rows returned by the next non-count SELECT. Without one queued, SELECTs return nothing.
    pub fn push_result(&self, rows: Vec<Row>) {
        locked(&self.results).push_back(rows);
    }

    /// Rows-affected for the next write. Without one queued, writes affect zero rows.
    pub fn push_affected(&self, n: u64) {
        locked(&self.affected).push_back(n);
    }

    /// Fail the next statement that binds parameters, read or write. Handle diagnostics bind
    /// none, so they never take a queued failure. Failures are used in order.
    pub fn fail_next(&self, err: AppError) {
        locked(&self.failures).push_back(err);
    }

    pub fn queries(&self) -> Vec<QueryBuf> {
        locked(&self.log).clone()
    }

    pub fn last_query(&self) -> Option<QueryBuf> {
        locked(&self.log).last().cloned()
    }

    pub fn clear_log(&self) {
        locked(&self.log).clear();
    }

    fn next_failure(&self, q: &QueryBuf) -> Option<AppError> {
        if q.params.is_empty() {
            return None;
        }
        locked(&self.failures).pop_front()
    }

    fn lookup(&self, table: &TableIdentity) -> Option<&(Vec<ColumnInfo>, Vec<String>)> {
        self.tables
            .get(&(table.database.clone(), table.table.clone()))
    }
}

#[async_trait]
impl SchemaIntrospector for RecordingBackend {
    async fn primary_key_columns(&self, table: &TableIdentity) -> Result<Vec<String>, AppError> {
        Ok(self.lookup(table).map(|(_, k)| k.clone()).unwrap_or_default())
    }

    async fn columns(&self, table: &TableIdentity) -> Result<Vec<ColumnInfo>, AppError> {
        self.introspections.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.introspection_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.lookup(table).map(|(c, _)| c.clone()).unwrap_or_default())
    }

    async fn list_schemas(&self) -> Result<Vec<String>, AppError> {
        let mut schemas: Vec<String> = self.tables.keys().map(|(db, _)| db.clone()).collect();
        schemas.dedup();
        Ok(schemas)
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<String>, AppError> {
        Ok(self
            .tables
            .keys()
            .filter(|(db, _)| db == schema)
            .map(|(_, t)| t.clone())
            .collect())
    }
}

#[async_trait]
impl SqlExecutor for RecordingBackend {
    async fn fetch_all(&self, q: &QueryBuf) -> Result<Vec<Row>, AppError> {
        locked(&self.log).push(q.clone());
        if q.sql.starts_with("SELECT count(*)") {
            let mut row = Row::new();
            row.insert("count", SqlValue::Int(self.row_count));
            return Ok(vec![row]);
        }
        if let Some(err) = self.next_failure(q) {
            return Err(err);
        }
        Ok(locked(&self.results).pop_front().unwrap_or_default())
    }

    async fn execute(&self, q: &QueryBuf) -> Result<u64, AppError> {
        locked(&self.log).push(q.clone());
        if let Some(err) = self.next_failure(q) {
            return Err(err);
        }
        Ok(locked(&self.affected).pop_front().unwrap_or(0))
    }
}

/// Connector that always hands out the same recording backend.
pub struct RecordingConnector {
    backend: Arc<RecordingBackend>,
    connects: AtomicUsize,
}

impl RecordingConnector {
    pub fn new(backend: Arc<RecordingBackend>) -> Self {
        RecordingConnector {
            backend,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn backend(&self) -> &Arc<RecordingBackend> {
        &self.backend
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for RecordingConnector {
    async fn connect(&self, _config: &ConnectionConfig) -> Result<Arc<dyn Backend>, AppError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let backend: Arc<dyn Backend> = self.backend.clone();
        Ok(backend)
    }
}
