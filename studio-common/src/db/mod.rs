//! Database models and queries

pub mod init;
pub mod migrations;
pub mod models;
pub mod settings;

pub use init::init_database;
pub use migrations::{get_schema_version, rollback_migrations, run_migrations, CURRENT_SCHEMA_VERSION};
pub use models::*;
