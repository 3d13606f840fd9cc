//! Errors shared by the studio crates
//!
//! Handlers in studio-sessions wrap these in their own `ApiError`, which
//! turns `NotFound` into 404 and `InvalidInput` into 400; the rest are 500s.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Root folder or config file access
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad TOML, unknown environment, or a setting row that does not parse
    #[error("Configuration error: {0}")]
    Config(String),

    /// Schema step missing or failed for `version`
    #[error("Migration v{version}: {message}")]
    Migration { version: i32, message: String },

    /// Missing user, session or package
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller-supplied value out of range, or a stored enum value that does not parse
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
