//! tablerest: any PostgreSQL table as a REST resource, addressed by schema and table name,
//! with composite primary keys, templated equality filters, projection and pagination.

pub mod adaptor;
pub mod config;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod response;
pub mod routes;
pub mod schema;
pub mod sql;
pub mod state;
pub mod table;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use adaptor::{ResourceAdaptor, SearchRequest, KEY_DELIMITER};
pub use config::{ConnectionConfig, ServiceConfig};
pub use error::AppError;
pub use registry::TableRegistry;
pub use response::{Page, PageLinks};
pub use routes::{common_routes_with_ready, resource_routes};
pub use schema::{
    Backend, Connector, PgConnector, SchemaIntrospector, SqlExecutor, TableIdentity, TableSchema,
};
pub use sql::{Row, SqlValue, Template};
pub use state::AppState;
pub use table::{TableHandle, TableSummary};

use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

/// Full application router: common routes at the root, table resources under `/api`.
pub fn app(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .merge(common_routes_with_ready(state.clone()))
        .nest("/api", resource_routes(state))
        .layer(RequestBodyLimitLayer::new(body_limit))
}
