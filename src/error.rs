//! Error types for the Eventdeck engine
//!
//! One error enum for the whole crate:
//! - `thiserror` derived variants grouped by subsystem
//! - constructors for the common cases
//! - classification helpers (retryable, log level)
//! - HTTP status code and error code mapping for API responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::borrow::Cow;
use thiserror::Error;

/// Result type alias for Eventdeck operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the Eventdeck engine
#[derive(Debug, Error)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    #[error("Configuration error: {message}")]
    Config {
        message: Cow<'static, str>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidConfig {
        key: &'static str,
        message: Cow<'static, str>,
    },

    // ========================================================================
    // Store Errors
    // ========================================================================
    #[error("Database error: {message}")]
    Database {
        message: Cow<'static, str>,
        #[source]
        source: Option<sqlx::Error>,
    },

    #[error("Database connection pool exhausted")]
    PoolExhausted,

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Event store unavailable: {backend}")]
    StoreUnavailable { backend: &'static str },

    #[error("Invalid stored data: {message}")]
    InvalidData { message: Cow<'static, str> },

    // ========================================================================
    // API Errors
    // ========================================================================
    #[error("Invalid value for query parameter {param}: {message}")]
    InvalidParameter {
        param: &'static str,
        message: Cow<'static, str>,
    },

    // ========================================================================
    // Serialization / IO Errors
    // ========================================================================
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl Error {
    // ========================================================================
    // Constructors for common error patterns
    // ========================================================================

    /// Create a configuration error
    pub fn config(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create an invalid query parameter error
    pub fn invalid_parameter(param: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidParameter {
            param,
            message: message.into(),
        }
    }

    pub fn invalid_data(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    // ========================================================================
    // Error Classification
    // ========================================================================

    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Database { .. }
                | Error::PoolExhausted
                | Error::StoreUnavailable { .. }
                | Error::Timeout { .. }
        )
    }

    /// Returns true if this error should be logged at error level
    pub fn is_error_level(&self) -> bool {
        matches!(
            self,
            Error::Database { .. }
                | Error::StoreUnavailable { .. }
                | Error::InvalidData { .. }
                | Error::Migration(_)
                | Error::Io(_)
        )
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::StoreUnavailable { .. } | Error::PoolExhausted => StatusCode::SERVICE_UNAVAILABLE,
            Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } | Error::InvalidConfig { .. } => "CONFIG_ERROR",
            Error::Database { .. }
            | Error::PoolExhausted
            | Error::Migration(_)
            | Error::InvalidData { .. } => "DATABASE_ERROR",
            Error::StoreUnavailable { .. } => "STORE_UNAVAILABLE",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::InvalidParameter { .. } => "INVALID_PARAMETER",
            Error::Json(_) => "SERIALIZATION_ERROR",
            Error::Timeout { .. } => "TIMEOUT",
            Error::Io(_) => "INTERNAL_ERROR",
        }
    }
}

// ============================================================================
// Error Response for API
// ============================================================================

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        if self.is_error_level() {
            tracing::error!(code, error = ?self, "Request failed");
        } else {
            tracing::debug!(code, error = %self, "Request rejected");
        }

        // Don't expose internal error details
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let retry_after = if self.is_retryable() && status == StatusCode::SERVICE_UNAVAILABLE {
            Some(1)
        } else {
            None
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code,
                message,
                retry_after,
            },
        };

        (status, Json(body)).into_response()
    }
}

// ============================================================================
// From implementations for external error types
// ============================================================================

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Error::NotFound {
                entity_type: "record",
                id: "unknown".to_string(),
            },
            sqlx::Error::PoolTimedOut => Error::PoolExhausted,
            sqlx::Error::Database(db_err) => Error::Database {
                message: db_err.message().to_string().into(),
                source: Some(err),
            },
            _ => Error::Database {
                message: err.to_string().into(),
                source: Some(err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(Error::PoolExhausted.is_retryable());
        assert!(Error::StoreUnavailable { backend: "memory" }.is_retryable());
        assert!(!Error::NotFound {
            entity_type: "event",
            id: "123".to_string()
        }
        .is_retryable());
        assert!(!Error::invalid_parameter("limit", "nope").is_retryable());
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            Error::invalid_parameter("maxPrice", "not a number").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::StoreUnavailable { backend: "memory" }.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            Error::Timeout { timeout_ms: 5 }.status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            Error::invalid_data("bad row").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            Error::invalid_parameter("limit", "bad").error_code(),
            "INVALID_PARAMETER"
        );
        assert_eq!(Error::Migration("x".into()).error_code(), "DATABASE_ERROR");
    }
}
