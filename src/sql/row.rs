//! Ordered result rows.

use crate::sql::SqlValue;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Column name to value, in result-set column order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, SqlValue)>,
}

impl Row {
    pub fn new() -> Self {
        Row { cells: Vec::new() }
    }

    /// Set a column; an existing column keeps its position.
    pub fn insert(&mut self, column: impl Into<String>, value: SqlValue) {
        let column = column.into();
        match self.cells.iter_mut().find(|(c, _)| *c == column) {
            Some(cell) => cell.1 = value,
            None => self.cells.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.cells.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }
}

impl<K: Into<String>> FromIterator<(K, SqlValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, SqlValue)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (c, v) in &self.cells {
            map.serialize_entry(c, v)?;
        }
        map.end()
    }
}

/// Decode a PostgreSQL row. Columns whose type has no mapping here are expected to be
/// projected as `::text` by the query builder; anything left undecodable becomes `Null`.
pub fn from_pg_row(row: &sqlx::postgres::PgRow) -> Row {
    use sqlx::Column;
    use sqlx::Row as _;
    row.columns()
        .iter()
        .map(|col| (col.name().to_string(), cell_to_value(row, col.ordinal())))
        .collect()
}

fn cell_to_value(row: &sqlx::postgres::PgRow, idx: usize) -> SqlValue {
    use sqlx::Row as _;
    if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
        return v.map(|n| SqlValue::Int(n.into())).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
        return v.map(|n| SqlValue::Int(n.into())).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(SqlValue::Int).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
        return v.map(|n| SqlValue::Float(n.into())).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map(SqlValue::Float).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map(SqlValue::Bool).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<uuid::Uuid>, _>(idx) {
        return v.map(|u| SqlValue::Text(u.to_string())).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
        return v.map(SqlValue::TimestampTz).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return v.map(SqlValue::Timestamp).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
        return v.map(SqlValue::Date).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(SqlValue::Text).unwrap_or(SqlValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<serde_json::Value>, _>(idx) {
        return v.map(SqlValue::Json).unwrap_or(SqlValue::Null);
    }
    SqlValue::Null
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_in_insertion_order() {
        let row: Row = vec![
            ("yearID", SqlValue::Int(1960)),
            ("playerID", SqlValue::from("willite01")),
            ("AB", SqlValue::Null),
        ]
        .into_iter()
        .collect();
        let s = serde_json::to_string(&row).unwrap();
        assert_eq!(s, r#"{"yearID":1960,"playerID":"willite01","AB":null}"#);
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut row = Row::new();
        row.insert("a", SqlValue::Int(1));
        row.insert("b", SqlValue::Int(2));
        row.insert("a", SqlValue::Int(3));
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(row.get("a"), Some(&SqlValue::Int(3)));
    }
}
