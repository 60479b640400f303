//! Application error types and result alias.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application result type alias
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Event bus error: {0}")]
    Bus(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// Object store returned 403 for the requested key.
    #[error("Storage access denied: {0}")]
    StorageAccessDenied(String),

    #[error("Search index error: {0}")]
    Search(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Concurrent request holding the same idempotency key.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Map error variant to HTTP status code and machine-readable error code.
    ///
    /// The wire codes are the five the frontend branches on; everything the
    /// caller cannot act on collapses to `INTERNAL`.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Validation(_) | Self::Json(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            Self::Unauthorized(_) | Self::Jwt(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Config(_)
            | Self::Database(_)
            | Self::Sqlx(_)
            | Self::Migration(_)
            | Self::Cache(_)
            | Self::Bus(_)
            | Self::Storage(_)
            | Self::StorageAccessDenied(_)
            | Self::Search(_)
            | Self::Io(_)
            | Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        }
    }

    /// Return a user-facing message. Internal details are hidden for wrapped
    /// foreign errors (Sqlx, Io, etc.) so they never leak to clients.
    fn user_message(&self) -> String {
        match self {
            Self::Sqlx(_) | Self::Database(_) => "Database operation failed".to_string(),
            Self::Migration(_) => "Database migration failed".to_string(),
            Self::Cache(_) => "Cache operation failed".to_string(),
            Self::Bus(_) => "Event delivery failed".to_string(),
            Self::Storage(_) | Self::StorageAccessDenied(_) => "Storage operation failed".to_string(),
            Self::Search(_) => "Search index operation failed".to_string(),
            Self::Io(_) => "IO operation failed".to_string(),
            Self::Json(_) => "Invalid JSON".to_string(),
            Self::Jwt(_) => "Invalid or expired token".to_string(),
            Self::Config(_) | Self::Internal(_) => "Unexpected system error".to_string(),
            // Remaining variants carry their own safe message
            other => other.to_string(),
        }
    }

    /// True when the error should be retried by an at-least-once consumer.
    ///
    /// Validation and not-found conditions will never succeed on redelivery;
    /// infrastructure failures might.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            Self::Validation(_)
                | Self::Json(_)
                | Self::NotFound(_)
                | Self::Unauthorized(_)
                | Self::Conflict(_)
                | Self::Jwt(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = self.user_message();
        let request_id =
            crate::api::middleware::request_id::current_request_id().unwrap_or_default();

        if status.is_server_error() {
            tracing::error!(error = %self, code = code, request_id = %request_id, "Request error");
        } else {
            tracing::warn!(error = %self, code = code, request_id = %request_id, "Request failed");
        }

        let body = Json(json!({
            "error_code": code,
            "message": message,
            "request_id": request_id,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_invalid_input() {
        let (status, code) = AppError::Validation("bad title".into()).status_and_code();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(code, "INVALID_INPUT");
    }

    #[test]
    fn infrastructure_errors_collapse_to_internal() {
        for err in [
            AppError::Database("down".into()),
            AppError::Cache("down".into()),
            AppError::Bus("down".into()),
            AppError::Storage("down".into()),
            AppError::Search("down".into()),
        ] {
            let (status, code) = err.status_and_code();
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(code, "INTERNAL");
        }
    }

    #[test]
    fn foreign_errors_do_not_leak_details() {
        let err = AppError::Database("connection refused at 10.0.0.3:5432".into());
        assert_eq!(err.user_message(), "Database operation failed");
    }

    #[test]
    fn transient_classification() {
        assert!(AppError::Database("down".into()).is_transient());
        assert!(AppError::Search("502".into()).is_transient());
        assert!(!AppError::Validation("bad".into()).is_transient());
        assert!(!AppError::NotFound("gone".into()).is_transient());
    }
}
