//! Builds parameterized SELECT, INSERT, UPDATE, DELETE from an introspected table.
//! Identifiers must name known columns and are always quoted; values are always parameters.

use crate::error::AppError;
use crate::schema::{ColumnInfo, TableSchema};
use crate::sql::SqlValue;

/// Equality predicates, column name to required value. Empty means the whole table.
pub type Template = Vec<(String, SqlValue)>;

/// Quote identifier for PostgreSQL.
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
fn qualified_table(schema: &TableSchema) -> String {
    format!(
        "{}.{}",
        quoted(&schema.identity.database),
        quoted(&schema.identity.table)
    )
}

#[derive(Clone, Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf::default()
    }

    fn push_param(&mut self, v: SqlValue) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }

    /// Push a value and return its placeholder, cast to the column's unmodified type.
    fn placeholder(&mut self, column: &ColumnInfo, v: SqlValue) -> String {
        let n = self.push_param(v);
        format!("${}::{}", n, column.cast_type)
    }
}

fn known_column<'a>(schema: &'a TableSchema, name: &str) -> Result<&'a ColumnInfo, AppError> {
    schema.column(name).ok_or_else(|| {
        AppError::InvalidField(format!("{} has no column '{}'", schema.identity, name))
    })
}

fn projected(c: &ColumnInfo) -> String {
    let q = quoted(&c.name);
    if c.needs_text_cast() {
        format!("{}::text AS {}", q, q)
    } else {
        q
    }
}

/// SELECT list: requested fields in request order, else every column in table order.
fn select_column_list(
    schema: &TableSchema,
    fields: Option<&[String]>,
) -> Result<String, AppError> {
    let cols = match fields {
        Some(fields) if !fields.is_empty() => fields
            .iter()
            .map(|f| known_column(schema, f).map(projected))
            .collect::<Result<Vec<_>, _>>()?,
        _ => schema.columns.iter().map(projected).collect(),
    };
    Ok(cols.join(", "))
}

fn where_clause(
    q: &mut QueryBuf,
    schema: &TableSchema,
    template: &[(String, SqlValue)],
) -> Result<String, AppError> {
    let mut parts = Vec::with_capacity(template.len());
    for (col, val) in template {
        let c = known_column(schema, col)?;
        let ph = q.placeholder(c, val.clone());
        parts.push(format!("{} = {}", quoted(col), ph));
    }
    Ok(if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    })
}

/// SELECT with equality filters, optional projection, ORDER BY primary key, optional LIMIT/OFFSET.
pub fn select(
    schema: &TableSchema,
    template: &[(String, SqlValue)],
    fields: Option<&[String]>,
    limit: Option<u32>,
    offset: Option<u32>,
) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let cols = select_column_list(schema, fields)?;
    let where_clause = where_clause(&mut q, schema, template)?;
    let order_clause = if schema.has_primary_key() {
        let keys: Vec<String> = schema.primary_key.iter().map(|k| quoted(k)).collect();
        format!(" ORDER BY {}", keys.join(", "))
    } else {
        String::new()
    };
    let limit_clause = limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset_clause = offset.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();
    q.sql = format!(
        "SELECT {} FROM {}{}{}{}{}",
        cols,
        qualified_table(schema),
        where_clause,
        order_clause,
        limit_clause,
        offset_clause
    );
    Ok(q)
}

pub fn count(schema: &TableSchema) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!("SELECT count(*) AS count FROM {}", qualified_table(schema));
    q
}

/// INSERT: columns in record order, every value a parameter.
pub fn insert(
    schema: &TableSchema,
    record: &[(String, SqlValue)],
) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema);
    if record.is_empty() {
        q.sql = format!("INSERT INTO {} DEFAULT VALUES", table);
        return Ok(q);
    }
    let mut cols = Vec::with_capacity(record.len());
    let mut placeholders = Vec::with_capacity(record.len());
    for (name, val) in record {
        let c = known_column(schema, name)?;
        placeholders.push(q.placeholder(c, val.clone()));
        cols.push(quoted(name));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        cols.join(", "),
        placeholders.join(", ")
    );
    Ok(q)
}

/// UPDATE: SET from changed columns, WHERE from template. Empty template updates every row.
pub fn update(
    schema: &TableSchema,
    template: &[(String, SqlValue)],
    changed: &[(String, SqlValue)],
) -> Result<QueryBuf, AppError> {
    if changed.is_empty() {
        return Err(AppError::InvalidField("no columns to update".into()));
    }
    let mut q = QueryBuf::new();
    let mut sets = Vec::with_capacity(changed.len());
    for (name, val) in changed {
        let c = known_column(schema, name)?;
        let rhs = q.placeholder(c, val.clone());
        sets.push(format!("{} = {}", quoted(name), rhs));
    }
    let where_clause = where_clause(&mut q, schema, template)?;
    q.sql = format!(
        "UPDATE {} SET {}{}",
        qualified_table(schema),
        sets.join(", "),
        where_clause
    );
    Ok(q)
}

/// DELETE by template. Empty template deletes every row.
pub fn delete(
    schema: &TableSchema,
    template: &[(String, SqlValue)],
) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let where_clause = where_clause(&mut q, schema, template)?;
    q.sql = format!("DELETE FROM {}{}", qualified_table(schema), where_clause);
    Ok(q)
}
