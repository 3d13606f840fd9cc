//! # Studio Common Library
//!
//! Shared code for the studio services including:
//! - Database initialization, versioned migrations and row models
//! - API authentication primitives (timestamp + hash)
//! - Configuration loading and root folder resolution
//! - Common error type

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
