//! Table resource routes. Mounted under `/api`; `databases` is reserved as a first segment.

use crate::handlers::resource::{
    create, delete as delete_handler, describe_table, list_databases, list_tables, read, search,
    update,
};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn resource_routes(state: AppState) -> Router {
    Router::new()
        .route("/databases", get(list_databases))
        .route("/databases/:db", get(list_tables))
        .route("/databases/:db/:table", get(describe_table))
        .route("/:db/:table", get(search).post(create))
        .route("/:db/:table/:key", get(read).put(update).delete(delete_handler))
        .with_state(state)
}
