//! Unified error handling for Voxroute
//!
//! `AppError` covers every failure a caller can observe and maps itself to an
//! HTTP response. `DispatchError` is internal to the premium route: the call
//! controller always recovers from it by falling back to the budget route.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Main application error type
///
/// All errors surfaced by the HTTP layer are converted to this type.
/// It implements `ResponseError` for automatic HTTP response generation.
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Database Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    // ==================== Authentication Errors ====================
    #[error("Missing bearer token")]
    MissingBearer,

    #[error("Invalid bearer token")]
    InvalidBearer,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Forbidden: insufficient permissions")]
    Forbidden,

    // ==================== Call Lifecycle Errors ====================
    #[error("Call not found: {0}")]
    CallNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Cannot {operation} call {call_id}: call is {status}")]
    StateConflict {
        call_id: String,
        status: String,
        operation: String,
    },

    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    // ==================== Resource Errors ====================
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation(_) => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            AppError::MissingBearer | AppError::InvalidToken(_) | AppError::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }

            // 403 Forbidden
            AppError::InvalidBearer | AppError::Forbidden => StatusCode::FORBIDDEN,

            // 404 Not Found
            AppError::CallNotFound(_) | AppError::UserNotFound(_) => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::StateConflict { .. } | AppError::AlreadyExists(_) => StatusCode::CONFLICT,

            // 500 Internal Server Error
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::MissingBearer => "missing_bearer",
            AppError::InvalidBearer => "invalid_bearer",
            AppError::TokenExpired => "token_expired",
            AppError::InvalidToken(_) => "invalid_token",
            AppError::Forbidden => "forbidden",
            AppError::CallNotFound(_) => "call_not_found",
            AppError::UserNotFound(_) => "user_not_found",
            AppError::StateConflict { .. } => "state_conflict",
            AppError::Validation(_) => "validation_error",
            AppError::AlreadyExists(_) => "already_exists",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
        }
    }

    /// Whether this is a rejected state transition
    pub fn is_state_conflict(&self) -> bool {
        matches!(self, AppError::StateConflict { .. })
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = json!({
            "error": self.error_code(),
            "message": self.to_string(),
            "status": status.as_u16(),
        });

        HttpResponse::build(status).json(body)
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Premium dispatch failure
///
/// Never surfaced to the end caller; rendered into the `dispatch_failed`
/// audit event before the call falls back to the budget route.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timeout: no response within {0}s")]
    Timeout(u64),

    #[error("HTTP error: status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Premium route is not configured")]
    NotConfigured,
}

impl DispatchError {
    /// Short machine-readable kind for audit payloads
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Connection(_) => "connection",
            DispatchError::Timeout(_) => "timeout",
            DispatchError::HttpStatus { .. } => "http_status",
            DispatchError::MalformedResponse(_) => "malformed_response",
            DispatchError::NotConfigured => "not_configured",
        }
    }
}
