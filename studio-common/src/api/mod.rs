//! API module for shared HTTP API functionality
//!
//! This module contains ONLY:
//! - Pure functions (no HTTP framework dependencies)
//! - Database operations (via sqlx)
//! - Shared types
//!
//! Each service wraps these with framework-specific middleware (Axum, etc.).

pub mod auth;
pub mod types;

pub use auth::{
    calculate_hash, initialize_shared_secret, load_shared_secret, sign_request,
    validate_request_hash, validate_timestamp, ApiAuthError,
};
pub use types::{ErrorResponse, HASH_HEADER, TIMESTAMP_HEADER, USER_HEADER};
