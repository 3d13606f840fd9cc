//! Shared API request/response types

use serde::Serialize;
use serde_json::Value;

/// Header naming the calling user id
pub const USER_HEADER: &str = "x-studio-user";

/// Header carrying the request timestamp (Unix epoch ms)
pub const TIMESTAMP_HEADER: &str = "x-studio-timestamp";

/// Header carrying the SHA-256 request hash (64 hex chars)
pub const HASH_HEADER: &str = "x-studio-hash";

/// Error body returned by every failing endpoint
///
/// ```
/// use studio_common::api::types::ErrorResponse;
///
/// let error = ErrorResponse::new("FORBIDDEN", "Admin access required");
/// assert!(!error.success);
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Always false; lets clients branch on one field for every response
    pub success: bool,
    /// Error type identifier
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, message: impl Into<String>, details: Value) -> Self {
        Self {
            details: Some(details),
            ..Self::new(error, message)
        }
    }
}
