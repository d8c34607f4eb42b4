//! TableHandle: CRUD by template and by primary key over one introspected table.

use crate::error::AppError;
use crate::schema::{introspect, Backend, ColumnInfo, TableIdentity, TableSchema};
use crate::sql::{self, Row, SqlValue, Template};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// One per table per process, created by the registry. The schema, row count and sample are
/// captured when the handle opens and are not refreshed afterwards.
pub struct TableHandle {
    schema: TableSchema,
    backend: Arc<dyn Backend>,
    row_count: i64,
    sample_rows: Vec<Row>,
}

/// Serializable description of a handle.
#[derive(Clone, Debug, Serialize)]
pub struct TableSummary {
    pub database: String,
    pub table: String,
    pub primary_key: Vec<String>,
    pub columns: Vec<ColumnInfo>,
    pub row_count: i64,
    pub sample_rows: Vec<Row>,
}

impl TableHandle {
    pub(crate) async fn open(
        identity: TableIdentity,
        backend: Arc<dyn Backend>,
        sample_size: u32,
    ) -> Result<Self, AppError> {
        let schema = introspect(backend.as_ref(), &identity).await?;
        let count_rows = backend.fetch_all(&sql::count(&schema)).await?;
        let row_count = count_rows
            .first()
            .and_then(|r| r.get("count"))
            .and_then(SqlValue::as_i64)
            .unwrap_or(0);
        let sample_rows = backend
            .fetch_all(&sql::select(&schema, &[], None, Some(sample_size), None)?)
            .await?;
        if !schema.has_primary_key() {
            tracing::warn!(table = %identity, "table has no primary key; key operations disabled");
        }
        let handle = TableHandle {
            schema,
            backend,
            row_count,
            sample_rows,
        };
        tracing::debug!("{}", handle);
        Ok(handle)
    }

    pub fn identity(&self) -> &TableIdentity {
        &self.schema.identity
    }

    /// Key columns in declaration order. Empty for keyless tables.
    pub fn primary_key(&self) -> &[String] {
        &self.schema.primary_key
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.schema.columns
    }

    /// Row count when the handle opened.
    pub fn row_count(&self) -> i64 {
        self.row_count
    }

    pub fn sample_rows(&self) -> &[Row] {
        &self.sample_rows
    }

    pub fn summary(&self) -> TableSummary {
        TableSummary {
            database: self.schema.identity.database.clone(),
            table: self.schema.identity.table.clone(),
            primary_key: self.schema.primary_key.clone(),
            columns: self.schema.columns.clone(),
            row_count: self.row_count,
            sample_rows: self.sample_rows.clone(),
        }
    }

    /// Zip positional key values onto the key columns, preserving key order.
    pub fn key_template(&self, key_values: &[SqlValue]) -> Result<Template, AppError> {
        let key = &self.schema.primary_key;
        if key.is_empty() {
            return Err(AppError::Schema(format!(
                "{} has no primary key",
                self.schema.identity
            )));
        }
        if key.len() != key_values.len() {
            return Err(AppError::KeyArity {
                expected: key.len(),
                got: key_values.len(),
            });
        }
        Ok(key.iter().cloned().zip(key_values.iter().cloned()).collect())
    }

    /// Rows matching every template entry; empty when nothing matches. A template value the
    /// column's type cannot hold (`yearID=abc`) matches nothing.
    pub async fn find_by_template(
        &self,
        template: &[(String, SqlValue)],
        fields: Option<&[String]>,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<Row>, AppError> {
        let q = sql::select(&self.schema, template, fields, limit, offset)?;
        match self.backend.fetch_all(&q).await {
            Err(AppError::InvalidValue(reason)) => {
                tracing::debug!(table = %self.schema.identity, %reason, "template cannot match");
                Ok(Vec::new())
            }
            other => other,
        }
    }

    /// Whether some template value is not representable in its column, so no row can match.
    async fn template_is_unmatchable(
        &self,
        template: &[(String, SqlValue)],
    ) -> Result<bool, AppError> {
        if template.is_empty() {
            return Ok(false);
        }
        let q = sql::select(&self.schema, template, None, Some(1), None)?;
        match self.backend.fetch_all(&q).await {
            Ok(_) => Ok(false),
            Err(AppError::InvalidValue(_)) => Ok(true),
            Err(e) => Err(e),
        }
    }

    pub async fn find_by_primary_key(
        &self,
        key_values: &[SqlValue],
        fields: Option<&[String]>,
    ) -> Result<Option<Row>, AppError> {
        let template = self.key_template(key_values)?;
        let rows = self.find_by_template(&template, fields, None, None).await?;
        Ok(rows.into_iter().next())
    }

    /// A body value the column rejects (wrong type, too long) is an integrity error.
    pub async fn insert(&self, record: &[(String, SqlValue)]) -> Result<u64, AppError> {
        let q = sql::insert(&self.schema, record)?;
        self.backend.execute(&q).await.map_err(|e| match e {
            AppError::InvalidValue(reason) => AppError::Integrity(reason),
            other => other,
        })
    }

    /// An empty template updates every row. A template value its column cannot hold updates
    /// nothing; a rejected new value is an integrity error.
    pub async fn update_by_template(
        &self,
        template: &[(String, SqlValue)],
        new_values: &[(String, SqlValue)],
    ) -> Result<u64, AppError> {
        let q = sql::update(&self.schema, template, new_values)?;
        match self.backend.execute(&q).await {
            Err(AppError::InvalidValue(reason)) => {
                if self.template_is_unmatchable(template).await? {
                    Ok(0)
                } else {
                    Err(AppError::Integrity(reason))
                }
            }
            other => other,
        }
    }

    pub async fn update_by_key(
        &self,
        key_values: &[SqlValue],
        new_values: &[(String, SqlValue)],
    ) -> Result<u64, AppError> {
        let template = self.key_template(key_values)?;
        self.update_by_template(&template, new_values).await
    }

    /// An empty template deletes every row; one its columns cannot hold deletes nothing.
    pub async fn delete_by_template(
        &self,
        template: &[(String, SqlValue)],
    ) -> Result<u64, AppError> {
        let q = sql::delete(&self.schema, template)?;
        match self.backend.execute(&q).await {
            Err(AppError::InvalidValue(_)) => Ok(0),
            other => other,
        }
    }

    pub async fn delete_by_key(&self, key_values: &[SqlValue]) -> Result<u64, AppError> {
        let template = self.key_template(key_values)?;
        self.delete_by_template(&template).await
    }
}

impl fmt::Display for TableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "TableHandle: {}", self.schema.identity)?;
        writeln!(f, "key columns: {:?}", self.schema.primary_key)?;
        writeln!(f, "rows: {}", self.row_count)?;
        write!(f, "sample: {}", serde_json::to_string(&self.sample_rows).unwrap_or_default())
    }
}

impl fmt::Debug for TableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableHandle")
            .field("identity", &self.schema.identity)
            .field("primary_key", &self.schema.primary_key)
            .field("row_count", &self.row_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingBackend;

    async fn appearances() -> (TableHandle, Arc<RecordingBackend>) {
        // Key declared as (teamID, yearID), the reverse of alphabetical and of column order.
        let backend = Arc::new(
            RecordingBackend::new()
                .with_table(
                    "lahman",
                    "appearances",
                    &[
                        ("yearID", "int4", "integer"),
                        ("teamID", "bpchar", "character(3)"),
                        ("G_all", "int4", "integer"),
                    ],
                    &["teamID", "yearID"],
                )
                .with_row_count(42),
        );
        let identity = TableIdentity::new("lahman", "appearances");
        let handle = TableHandle::open(identity, backend.clone(), 5).await.unwrap();
        backend.clear_log();
        (handle, backend)
    }

    #[tokio::test]
    async fn captures_key_order_and_diagnostics() {
        let (handle, _) = appearances().await;
        assert_eq!(handle.primary_key(), ["teamID", "yearID"]);
        assert_eq!(handle.row_count(), 42);
        assert_eq!(handle.summary().columns.len(), 3);
    }

    #[tokio::test]
    async fn key_values_bind_in_declared_key_order() {
        let (handle, backend) = appearances().await;
        handle
            .find_by_primary_key(&[SqlValue::from("BOS"), SqlValue::from("1960")], None)
            .await
            .unwrap();
        let q = backend.last_query().unwrap();
        assert!(q.sql.contains("WHERE \"teamID\" = $1::bpchar AND \"yearID\" = $2::integer"));
        assert_eq!(q.params, vec![SqlValue::from("BOS"), SqlValue::from("1960")]);
    }

    #[tokio::test]
    async fn missing_row_is_absent_not_error() {
        let (handle, _) = appearances().await;
        let row = handle
            .find_by_primary_key(&[SqlValue::from("BOS"), SqlValue::from("1800")], None)
            .await
            .unwrap();
        assert!(row.is_none());
    }

    #[tokio::test]
    async fn first_match_is_returned() {
        let (handle, backend) = appearances().await;
        let row: Row = vec![
            ("teamID", SqlValue::from("BOS")),
            ("yearID", SqlValue::Int(1960)),
        ]
        .into_iter()
        .collect();
        backend.push_result(vec![row.clone()]);
        let found = handle
            .find_by_primary_key(&[SqlValue::from("BOS"), SqlValue::from("1960")], None)
            .await
            .unwrap();
        assert_eq!(found, Some(row));
    }

    #[tokio::test]
    async fn wrong_key_arity_is_rejected_before_sql() {
        let (handle, backend) = appearances().await;
        let err = handle.delete_by_key(&[SqlValue::from("BOS")]).await.unwrap_err();
        assert!(matches!(err, AppError::KeyArity { expected: 2, got: 1 }));
        assert!(backend.last_query().is_none());
    }

    #[tokio::test]
    async fn delete_of_missing_key_counts_zero() {
        let (handle, _) = appearances().await;
        let n = handle
            .delete_by_key(&[SqlValue::from("XXX"), SqlValue::from("1")])
            .await
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn empty_template_update_has_no_where() {
        let (handle, backend) = appearances().await;
        backend.push_affected(42);
        let n = handle
            .update_by_template(&[], &[("G_all".to_string(), SqlValue::Int(0))])
            .await
            .unwrap();
        assert_eq!(n, 42);
        assert!(!backend.last_query().unwrap().sql.contains("WHERE"));
    }

    #[tokio::test]
    async fn unknown_column_never_reaches_database() {
        let (handle, backend) = appearances().await;
        let err = handle
            .find_by_template(&[("bogus".to_string(), SqlValue::from("1"))], None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidField(_)));
        assert!(backend.last_query().is_none());
    }

    #[tokio::test]
    async fn keyless_table_opens_but_refuses_key_operations() {
        let backend = Arc::new(RecordingBackend::new().with_table(
            "logs",
            "events",
            &[("msg", "text", "text")],
            &[],
        ));
        let handle = TableHandle::open(TableIdentity::new("logs", "events"), backend, 5)
            .await
            .unwrap();
        let err = handle
            .find_by_primary_key(&[SqlValue::from("x")], None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Schema(_)));
        assert!(handle.find_by_template(&[], None, Some(1), None).await.unwrap().is_empty());
    }

    fn unparsable(value: &str) -> AppError {
        AppError::InvalidValue(format!("invalid input syntax for type integer: \"{}\"", value))
    }

    #[tokio::test]
    async fn unparsable_key_is_absent() {
        let (handle, backend) = appearances().await;
        backend.fail_next(unparsable("BOS"));
        let row = handle
            .find_by_primary_key(&[SqlValue::from("1960"), SqlValue::from("BOS")], None)
            .await
            .unwrap();
        assert!(row.is_none());
    }

    #[tokio::test]
    async fn unparsable_filter_matches_nothing() {
        let (handle, backend) = appearances().await;
        backend.fail_next(unparsable("'; DROP TABLE x; --"));
        let template = vec![("yearID".to_string(), SqlValue::from("'; DROP TABLE x; --"))];
        let rows = handle.find_by_template(&template, None, None, None).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn unparsable_key_deletes_nothing() {
        let (handle, backend) = appearances().await;
        backend.fail_next(unparsable("abc"));
        let n = handle
            .delete_by_key(&[SqlValue::from("BOS"), SqlValue::from("abc")])
            .await
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn unparsable_key_updates_nothing() {
        let (handle, backend) = appearances().await;
        backend.fail_next(unparsable("abc"));
        backend.fail_next(unparsable("abc"));
        let n = handle
            .update_by_key(
                &[SqlValue::from("BOS"), SqlValue::from("abc")],
                &[("G_all".to_string(), SqlValue::Int(1))],
            )
            .await
            .unwrap();
        assert_eq!(n, 0);
        let queries = backend.queries();
        assert_eq!(queries.len(), 2);
        assert!(queries[1].sql.starts_with("SELECT"));
    }

    #[tokio::test]
    async fn rejected_new_value_is_integrity_error() {
        let (handle, backend) = appearances().await;
        backend.fail_next(unparsable("many"));
        let err = handle
            .update_by_key(
                &[SqlValue::from("BOS"), SqlValue::from("1960")],
                &[("G_all".to_string(), SqlValue::from("many"))],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Integrity(_)), "{err:?}");

        backend.fail_next(AppError::InvalidValue("value too long for type character(3)".into()));
        let record = vec![("teamID".to_string(), SqlValue::from("NYYANKEES"))];
        let err = handle.insert(&record).await.unwrap_err();
        assert!(matches!(err, AppError::Integrity(_)), "{err:?}");
    }

    #[tokio::test]
    async fn missing_table_is_schema_error() {
        let backend = Arc::new(RecordingBackend::new());
        let err = TableHandle::open(TableIdentity::new("lahman", "nope"), backend, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Schema(_)));
    }
}
