//! Table identity, introspected table shape, and the database capabilities the data layer needs.

mod postgres;

pub use postgres::{PgBackend, PgConnector};

use crate::config::ConnectionConfig;
use crate::error::AppError;
use crate::sql::{QueryBuf, Row};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// (database, table). In PostgreSQL the "database" is a schema.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TableIdentity {
    pub database: String,
    pub table: String,
}

impl TableIdentity {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        TableIdentity {
            database: database.into(),
            table: table.into(),
        }
    }

    /// `database.table`, the registry key.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.database, self.table)
    }
}

impl fmt::Display for TableIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Catalog type name (`int4`, `varchar`, `numeric`, ...).
    pub udt_name: String,
    /// Declared type with its modifiers, e.g. `character varying(9)`. Descriptive only.
    pub sql_type: String,
    /// Type without length or precision, e.g. `character varying`. Parameters are cast to this,
    /// so an over-long value compares unequal instead of being truncated to fit.
    pub cast_type: String,
}

/// udt names the row decoder handles natively.
const DECODABLE_TYPES: &[&str] = &[
    "int2", "int4", "int8", "float4", "float8", "bool", "text", "varchar", "bpchar", "name",
    "uuid", "date", "timestamp", "timestamptz", "json", "jsonb",
];

impl ColumnInfo {
    /// Column whose cast type is derived from the declared one: a declared type carrying a
    /// modifier casts through its catalog name (`character(3)` casts as `bpchar`).
    pub fn new(
        name: impl Into<String>,
        udt_name: impl Into<String>,
        sql_type: impl Into<String>,
    ) -> Self {
        let udt_name = udt_name.into();
        let sql_type = sql_type.into();
        let cast_type = if sql_type.contains('(') {
            udt_name.clone()
        } else {
            sql_type.clone()
        };
        ColumnInfo {
            name: name.into(),
            udt_name,
            sql_type,
            cast_type,
        }
    }

    pub fn with_cast_type(mut self, cast_type: impl Into<String>) -> Self {
        self.cast_type = cast_type.into();
        self
    }

    /// Whether the projection must cast to text (numeric, enums, arrays, intervals, ...).
    pub fn needs_text_cast(&self) -> bool {
        !DECODABLE_TYPES.contains(&self.udt_name.as_str())
    }
}

/// Columns in table order and the primary key in declaration order.
#[derive(Clone, Debug, Serialize)]
pub struct TableSchema {
    pub identity: TableIdentity,
    pub columns: Vec<ColumnInfo>,
    pub primary_key: Vec<String>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }
}

/// Catalog reads. Swap the implementation to target another engine without touching handles.
#[async_trait]
pub trait SchemaIntrospector: Send + Sync {
    /// Primary key column names ordered by their position in the key definition.
    /// Empty when the table has no declared key.
    async fn primary_key_columns(&self, table: &TableIdentity) -> Result<Vec<String>, AppError>;

    /// Columns in table order; empty when the table does not exist.
    async fn columns(&self, table: &TableIdentity) -> Result<Vec<ColumnInfo>, AppError>;

    async fn list_schemas(&self) -> Result<Vec<String>, AppError>;

    async fn list_tables(&self, schema: &str) -> Result<Vec<String>, AppError>;
}

/// Execute a built statement.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn fetch_all(&self, q: &QueryBuf) -> Result<Vec<Row>, AppError>;

    /// Run a write; returns rows affected. Constraint violations surface as `AppError::Integrity`,
    /// values the column type rejects as `AppError::InvalidValue`.
    async fn execute(&self, q: &QueryBuf) -> Result<u64, AppError>;
}

pub trait Backend: SchemaIntrospector + SqlExecutor {}

impl<T: SchemaIntrospector + SqlExecutor> Backend for T {}

/// Produces backends for a connection configuration.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Backend>, AppError>;
}

/// Read both catalog facts for a table. A table with no columns does not exist.
pub async fn introspect(
    introspector: &dyn SchemaIntrospector,
    identity: &TableIdentity,
) -> Result<TableSchema, AppError> {
    let columns = introspector.columns(identity).await?;
    if columns.is_empty() {
        return Err(AppError::Schema(format!("table {} does not exist", identity)));
    }
    let primary_key = introspector.primary_key_columns(identity).await?;
    Ok(TableSchema {
        identity: identity.clone(),
        columns,
        primary_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cast_type_drops_length_and_precision() {
        assert_eq!(ColumnInfo::new("teamID", "bpchar", "character(3)").cast_type, "bpchar");
        let player = ColumnInfo::new("playerID", "varchar", "character varying(9)");
        assert_eq!(player.cast_type, "varchar");
        assert_eq!(ColumnInfo::new("avg", "numeric", "numeric(5,3)").cast_type, "numeric");
        assert_eq!(ColumnInfo::new("yearID", "int4", "integer").cast_type, "integer");
    }

    #[test]
    fn catalog_cast_type_overrides_derived_one() {
        let c = ColumnInfo::new("mood", "mood", "mood").with_cast_type("app.mood");
        assert_eq!(c.cast_type, "app.mood");
    }
}
