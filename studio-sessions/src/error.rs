//! Error types for studio-sessions
//!
//! Shallow HTTP status mapping: handlers return `ApiError` and the response
//! body is always `{ success: false, error, message }`. Production
//! deployments blank the message of 500 responses in the router (see
//! [`crate::build_router`]).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use studio_common::api::ErrorResponse;
use thiserror::Error;
use tracing::error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid input or invalid state transition (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not permitted (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Conflict (409), e.g. decision already recorded
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// studio-common error
    #[error("Common error: {0}")]
    Common(#[from] studio_common::Error),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Common(studio_common::Error::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", msg)
            }
            ApiError::Common(studio_common::Error::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
            }
            ApiError::Internal(msg) => internal(msg),
            ApiError::Database(err) => internal(format!("Database error: {}", err)),
            ApiError::Common(err) => internal(err.to_string()),
        };

        (status, Json(ErrorResponse::new(error_code, message))).into_response()
    }
}

fn internal(message: String) -> (StatusCode, &'static str, String) {
    error!("Internal error: {}", message);
    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
}
