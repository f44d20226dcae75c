// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bancho_common::DecodeError;
use thiserror::Error;

/// Application error types with error codes and context.
///
/// Client misbehaviour (not host, slot taken, wrong password) is not an
/// error: handlers log a warning and return `Ok(())`.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invariant violated: {0}")]
    Invariant(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Decode(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Lock(_) | AppError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Decode(_) => "PROTO_001",
            AppError::Storage(_) => "STORE_001",
            AppError::Json(_) => "JSON_001",
            AppError::Lock(_) => "LOCK_001",
            AppError::Auth(_) => "AUTH_001",
            AppError::Config(_) => "CONF_001",
            AppError::Invariant(_) => "INT_001",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::Decode(_) => "Malformed packet stream".to_string(),
            AppError::Auth(_) => "Authentication failed".to_string(),
            AppError::Storage(_) | AppError::Lock(_) => {
                "Service temporarily unavailable".to_string()
            },
            AppError::Json(_) | AppError::Config(_) | AppError::Invariant(_) => {
                "An internal server error occurred".to_string()
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        let body = serde_json::json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<figment::Error> for AppError {
    fn from(err: figment::Error) -> Self {
        AppError::Config(err.to_string())
    }
}
