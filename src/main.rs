//! Server: reads configuration from the environment, builds the registry, serves `/api`.

use std::sync::Arc;
use tablerest::{app, AppState, PgConnector, ResourceAdaptor, ServiceConfig, TableRegistry};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tablerest=info")),
        )
        .init();

    let config = ServiceConfig::from_env()?;
    let registry = TableRegistry::new(Arc::new(PgConnector::new()), config.sample_rows);
    // Catalog queries run against the default schema; table handles re-declare per database.
    let adaptor = ResourceAdaptor::new(registry, config.connection("public"));
    let state = AppState {
        adaptor: Arc::new(adaptor),
        public_url: config.public_url.clone(),
    };

    let listener = TcpListener::bind(config.bind).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app(state, config.body_limit)).await?;
    Ok(())
}
