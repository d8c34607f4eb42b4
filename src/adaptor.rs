//! REST-shaped access to tables: composite key strings, reserved query parameters,
//! pagination links and JSON bodies, translated into table handle calls.

use crate::config::ConnectionConfig;
use crate::error::AppError;
use crate::registry::TableRegistry;
use crate::response::{Page, PageLinks};
use crate::schema::Backend;
use crate::sql::{Row, SqlValue, Template};
use crate::table::{TableHandle, TableSummary};
use serde_json::Value;
use std::sync::Arc;

/// Separates positional key values in a path, e.g. `willite01_1960_1`.
pub const KEY_DELIMITER: char = '_';
pub const DEFAULT_LIMIT: u32 = 10;
pub const DEFAULT_OFFSET: u32 = 0;

const FIELDS_PARAM: &str = "fields";
const LIMIT_PARAM: &str = "limit";
const OFFSET_PARAM: &str = "offset";

/// Split a composite key path segment into positional values.
pub fn parse_key(key: &str) -> Vec<SqlValue> {
    key.split(KEY_DELIMITER).map(SqlValue::from).collect()
}

/// `a,b , c` -> `["a", "b", "c"]`; empty means no projection.
pub fn parse_fields(raw: &str) -> Option<Vec<String>> {
    let fields: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(String::from)
        .collect();
    if fields.is_empty() {
        None
    } else {
        Some(fields)
    }
}

fn parse_count(name: &str, raw: &str, default: u32) -> Result<u32, AppError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(default);
    }
    raw.parse().map_err(|_| {
        AppError::BadRequest(format!(
            "{} must be a non-negative integer, got '{}'",
            name, raw
        ))
    })
}

/// A JSON object body as (column, value) pairs.
pub fn body_to_record(body: &Value) -> Result<Vec<(String, SqlValue)>, AppError> {
    match body {
        Value::Object(m) => Ok(m
            .iter()
            .map(|(k, v)| (k.clone(), SqlValue::from_json(v)))
            .collect()),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

/// A templated search as it arrives over HTTP.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchRequest {
    /// Equality filters in request order; reserved names removed.
    pub filters: Vec<(String, String)>,
    pub fields: Option<Vec<String>>,
    pub limit: u32,
    pub offset: u32,
    /// Request URL without query string, the base for page links.
    pub base_url: String,
    pub current_url: String,
}

impl SearchRequest {
    /// Pull `fields`, `limit` and `offset` out of the query; the rest is the template.
    /// For a repeated parameter the first value wins.
    pub fn from_query(
        params: Vec<(String, String)>,
        base_url: impl Into<String>,
        current_url: impl Into<String>,
    ) -> Result<Self, AppError> {
        let mut filters: Vec<(String, String)> = Vec::new();
        let mut fields = None;
        let mut limit = None;
        let mut offset = None;
        for (k, v) in params {
            match k.as_str() {
                FIELDS_PARAM => {
                    if fields.is_none() {
                        fields = Some(parse_fields(&v));
                    }
                }
                LIMIT_PARAM => {
                    if limit.is_none() {
                        limit = Some(parse_count(LIMIT_PARAM, &v, DEFAULT_LIMIT)?);
                    }
                }
                OFFSET_PARAM => {
                    if offset.is_none() {
                        offset = Some(parse_count(OFFSET_PARAM, &v, DEFAULT_OFFSET)?);
                    }
                }
                _ => {
                    if !filters.iter().any(|(f, _)| *f == k) {
                        filters.push((k, v));
                    }
                }
            }
        }
        Ok(SearchRequest {
            filters,
            fields: fields.flatten(),
            limit: limit.unwrap_or(DEFAULT_LIMIT),
            offset: offset.unwrap_or(DEFAULT_OFFSET),
            base_url: base_url.into(),
            current_url: current_url.into(),
        })
    }

    pub fn template(&self) -> Template {
        self.filters
            .iter()
            .map(|(k, v)| (k.clone(), SqlValue::from(v.as_str())))
            .collect()
    }

    pub fn links(&self) -> PageLinks {
        let mut prefix = format!("{}?", self.base_url);
        for (k, v) in &self.filters {
            prefix.push_str(&encode_component(k));
            prefix.push('=');
            prefix.push_str(&encode_component(v));
            prefix.push('&');
        }
        if let Some(fields) = &self.fields {
            let encoded: Vec<String> = fields.iter().map(|f| encode_component(f)).collect();
            prefix.push_str(FIELDS_PARAM);
            prefix.push('=');
            prefix.push_str(&encoded.join(","));
            prefix.push('&');
        }
        let page = |offset: u64| format!("{}limit={}&offset={}", prefix, self.limit, offset);
        let (limit, offset) = (u64::from(self.limit), u64::from(self.offset));
        PageLinks {
            prev_page: page(offset.saturating_sub(limit)),
            current_page: self.current_url.clone(),
            next_page: page(offset + limit),
        }
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn encode_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

/// Entry point for the HTTP layer. Holds the registry and the connection target; each
/// database gets the target re-declared for it, so handles always match their database.
pub struct ResourceAdaptor {
    registry: TableRegistry,
    connection: ConnectionConfig,
}

impl ResourceAdaptor {
    pub fn new(registry: TableRegistry, connection: ConnectionConfig) -> Self {
        ResourceAdaptor { registry, connection }
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    async fn table(&self, db: &str, table: &str) -> Result<Arc<TableHandle>, AppError> {
        self.registry
            .get_or_create(db, table, &self.connection.for_schema(db))
            .await
    }

    async fn catalog(&self) -> Result<Arc<dyn Backend>, AppError> {
        self.registry.connector().connect(&self.connection).await
    }

    pub async fn list_databases(&self) -> Result<Vec<String>, AppError> {
        self.catalog().await?.list_schemas().await
    }

    pub async fn list_tables(&self, db: &str) -> Result<Vec<String>, AppError> {
        self.catalog().await?.list_tables(db).await
    }

    pub async fn describe_table(&self, db: &str, table: &str) -> Result<TableSummary, AppError> {
        Ok(self.table(db, table).await?.summary())
    }

    pub async fn get_by_key(
        &self,
        db: &str,
        table: &str,
        key: &str,
        fields: Option<&[String]>,
    ) -> Result<Option<Row>, AppError> {
        self.table(db, table)
            .await?
            .find_by_primary_key(&parse_key(key), fields)
            .await
    }

    pub async fn get_by_template(
        &self,
        db: &str,
        table: &str,
        req: &SearchRequest,
    ) -> Result<Page, AppError> {
        let handle = self.table(db, table).await?;
        let rows = handle
            .find_by_template(
                &req.template(),
                req.fields.as_deref(),
                Some(req.limit),
                Some(req.offset),
            )
            .await?;
        Ok(Page {
            links: req.links(),
            rows,
        })
    }

    pub async fn create(&self, db: &str, table: &str, body: &Value) -> Result<u64, AppError> {
        let record = body_to_record(body)?;
        self.table(db, table).await?.insert(&record).await
    }

    pub async fn update_by_key(
        &self,
        db: &str,
        table: &str,
        key: &str,
        body: &Value,
    ) -> Result<u64, AppError> {
        let changes = body_to_record(body)?;
        self.table(db, table)
            .await?
            .update_by_key(&parse_key(key), &changes)
            .await
    }

    pub async fn delete_by_key(&self, db: &str, table: &str, key: &str) -> Result<u64, AppError> {
        self.table(db, table).await?.delete_by_key(&parse_key(key)).await
    }
}
