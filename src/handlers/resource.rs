//! Table resource handlers: catalog listing, search, and CRUD by composite key.

use crate::adaptor::{parse_fields, SearchRequest};
use crate::error::AppError;
use crate::response::{entries, success_ok, ENTRIES_DELETED, ENTRIES_INSERTED, ENTRIES_UPDATED};
use crate::state::AppState;
use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    Json,
};
use serde_json::Value;

/// Scheme and authority for links: configured public URL, else the request's Host.
fn origin(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(url) = &state.public_url {
        return url.clone();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{}", host)
}

fn fields_param(params: &[(String, String)]) -> Option<Vec<String>> {
    params
        .iter()
        .find(|(k, _)| k == "fields")
        .and_then(|(_, v)| parse_fields(v))
}

/// GET /api/databases
pub async fn list_databases(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let dbs = state.adaptor.list_databases().await?;
    Ok(success_ok(dbs))
}

/// GET /api/databases/:db
pub async fn list_tables(
    State(state): State<AppState>,
    Path(db): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let tables = state.adaptor.list_tables(&db).await?;
    Ok(success_ok(tables))
}

/// GET /api/databases/:db/:table
pub async fn describe_table(
    State(state): State<AppState>,
    Path((db, table)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let summary = state.adaptor.describe_table(&db, &table).await?;
    Ok(success_ok(summary))
}

/// GET /api/:db/:table?col=value&...&fields=a,b&limit=L&offset=O
pub async fn search(
    State(state): State<AppState>,
    Path((db, table)): Path<(String, String)>,
    Query(params): Query<Vec<(String, String)>>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let origin = origin(&state, &headers);
    let base_url = format!("{}{}", origin, uri.path());
    let current_url = match uri.path_and_query() {
        Some(pq) => format!("{}{}", origin, pq),
        None => base_url.clone(),
    };
    let req = SearchRequest::from_query(params, base_url, current_url)?;
    tracing::debug!(
        db = %db,
        table = %table,
        filters = ?req.filters,
        limit = req.limit,
        offset = req.offset,
        "search"
    );
    let page = state.adaptor.get_by_template(&db, &table, &req).await?;
    Ok(success_ok(page))
}

/// POST /api/:db/:table
pub async fn create(
    State(state): State<AppState>,
    Path((db, table)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let n = state.adaptor.create(&db, &table, &body).await?;
    Ok(entries(ENTRIES_INSERTED, n))
}

/// GET /api/:db/:table/:key
pub async fn read(
    State(state): State<AppState>,
    Path((db, table, key)): Path<(String, String, String)>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, AppError> {
    let fields = fields_param(&params);
    let row = state
        .adaptor
        .get_by_key(&db, &table, &key, fields.as_deref())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{}.{} {}", db, table, key)))?;
    Ok(success_ok(row))
}

/// PUT /api/:db/:table/:key
pub async fn update(
    State(state): State<AppState>,
    Path((db, table, key)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let n = state.adaptor.update_by_key(&db, &table, &key, &body).await?;
    Ok(entries(ENTRIES_UPDATED, n))
}

/// DELETE /api/:db/:table/:key
pub async fn delete(
    State(state): State<AppState>,
    Path((db, table, key)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let n = state.adaptor.delete_by_key(&db, &table, &key).await?;
    Ok(entries(ENTRIES_DELETED, n))
}
