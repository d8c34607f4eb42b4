//! Service and connection configuration from environment variables.

use crate::error::AppError;
use std::net::SocketAddr;
use std::str::FromStr;

pub const DEFAULT_DATABASE_URL: &str = "postgres://localhost/postgres";
pub const DEFAULT_BIND: &str = "127.0.0.1:5002";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_SAMPLE_ROWS: u32 = 5;
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Where a table handle connects. `schema` is the database the connection is declared for;
/// the registry refuses to open a table of any other database with it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub database_url: String,
    pub schema: String,
    pub max_connections: u32,
}

impl ConnectionConfig {
    pub fn new(database_url: impl Into<String>, schema: impl Into<String>) -> Self {
        ConnectionConfig {
            database_url: database_url.into(),
            schema: schema.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Same target, declared for another schema.
    pub fn for_schema(&self, schema: &str) -> Self {
        ConnectionConfig {
            schema: schema.to_string(),
            ..self.clone()
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub database_url: String,
    pub bind: SocketAddr,
    pub max_connections: u32,
    /// Rows captured per table handle as a diagnostic sample.
    pub sample_rows: u32,
    /// Base for pagination links; when unset, `http://{Host}` of the request.
    pub public_url: Option<String>,
    pub body_limit: usize,
}

impl ServiceConfig {
    /// Read `DATABASE_URL` and `TABLEREST_*`. Unset values take defaults; malformed ones fail.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.into());
        let bind = parse_or(&lookup, "TABLEREST_BIND", || {
            SocketAddr::from_str(DEFAULT_BIND).map_err(|e| AppError::Configuration(e.to_string()))
        })?;
        let max_connections = parse_or(&lookup, "TABLEREST_MAX_CONNECTIONS", || {
            Ok(DEFAULT_MAX_CONNECTIONS)
        })?;
        if max_connections == 0 {
            return Err(AppError::Configuration(
                "TABLEREST_MAX_CONNECTIONS must be at least 1".into(),
            ));
        }
        let sample_rows = parse_or(&lookup, "TABLEREST_SAMPLE_ROWS", || Ok(DEFAULT_SAMPLE_ROWS))?;
        let body_limit = parse_or(&lookup, "TABLEREST_BODY_LIMIT", || Ok(DEFAULT_BODY_LIMIT))?;
        let public_url = lookup("TABLEREST_PUBLIC_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty());
        Ok(ServiceConfig {
            database_url,
            bind,
            max_connections,
            sample_rows,
            public_url,
            body_limit,
        })
    }

    /// Connection settings for tables of `schema`.
    pub fn connection(&self, schema: &str) -> ConnectionConfig {
        ConnectionConfig {
            database_url: self.database_url.clone(),
            schema: schema.to_string(),
            max_connections: self.max_connections,
        }
    }
}

fn parse_or<T, F, D>(lookup: &F, key: &str, default: D) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
    D: FnOnce() -> Result<T, AppError>,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|e| AppError::Configuration(format!("{}={}: {}", key, v, e))),
        None => default(),
    }
}
