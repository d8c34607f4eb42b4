//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Bad connection settings, or a connection whose schema does not match the requested database.
    #[error("configuration: {0}")]
    Configuration(String),
    /// Table missing from the catalog, or a key operation on a table without a primary key.
    #[error("schema: {0}")]
    Schema(String),
    #[error("key arity: expected {expected} key value(s), got {got}")]
    KeyArity { expected: usize, got: usize },
    #[error("invalid field: {0}")]
    InvalidField(String),
    #[error("integrity: {0}")]
    Integrity(String),
    /// A value the column's type cannot represent (SQLSTATE class 22, or 42804).
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

impl AppError {
    /// Classify a database failure. Constraint violations become `Integrity`, data exceptions
    /// become `InvalidValue`; everything else stays `Db`.
    pub fn from_db(err: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;
        if let sqlx::Error::Database(db) = &err {
            let constraint = matches!(
                db.kind(),
                ErrorKind::UniqueViolation
                    | ErrorKind::ForeignKeyViolation
                    | ErrorKind::NotNullViolation
                    | ErrorKind::CheckViolation
            );
            if constraint {
                return AppError::Integrity(db.message().to_string());
            }
            if db.code().is_some_and(|c| is_data_exception(&c)) {
                return AppError::InvalidValue(db.message().to_string());
            }
        }
        AppError::Db(err)
    }
}

fn is_data_exception(sqlstate: &str) -> bool {
    sqlstate.starts_with("22") || sqlstate == "42804"
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl AppError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Configuration(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error")
            }
            AppError::Schema(_) => (StatusCode::NOT_FOUND, "schema_error"),
            AppError::KeyArity { .. } => (StatusCode::BAD_REQUEST, "key_arity_error"),
            AppError::InvalidField(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_field"),
            AppError::Integrity(_) => (StatusCode::CONFLICT, "integrity_error"),
            AppError::InvalidValue(_) => (StatusCode::BAD_REQUEST, "invalid_value"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Db(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        // Driver errors are logged above, not returned.
        let message = match &self {
            AppError::Db(_) => "database error".to_string(),
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_are_distinct_per_request_error() {
        assert_eq!(
            AppError::KeyArity { expected: 2, got: 1 }.status_and_code().0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::InvalidField("x".into()).status_and_code().0,
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(AppError::Integrity("dup".into()).status_and_code().0, StatusCode::CONFLICT);
        assert_eq!(AppError::Schema("missing".into()).status_and_code().0, StatusCode::NOT_FOUND);
    }

    #[test]
    fn non_database_errors_are_not_reclassified() {
        let err = AppError::from_db(sqlx::Error::RowNotFound);
        assert!(matches!(err, AppError::Db(sqlx::Error::RowNotFound)));
    }

    #[test]
    fn data_exception_codes() {
        assert!(is_data_exception("22P02"));
        assert!(is_data_exception("22001"));
        assert!(is_data_exception("22003"));
        assert!(is_data_exception("42804"));
        assert!(!is_data_exception("23505"));
        assert!(!is_data_exception("42P01"));
    }

    #[tokio::test]
    async fn driver_error_text_stays_out_of_the_response() {
        let err = AppError::Db(sqlx::Error::Protocol("relation \"secret\" is broken".into()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "database_error");
        assert_eq!(body["error"]["message"], "database error");
        assert!(!String::from_utf8_lossy(&bytes).contains("secret"));
    }

    #[test]
    fn key_arity_message_names_both_counts() {
        let msg = AppError::KeyArity { expected: 4, got: 2 }.to_string();
        assert!(msg.contains('4') && msg.contains('2'));
    }
}
