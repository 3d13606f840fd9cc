//! Database access layer for studio-sessions
//!
//! Functions take any `SqliteExecutor`, so the same query runs against the
//! pool or inside a handler's transaction. Status-changing updates are
//! conditional (`WHERE status IN (...)`) and report whether a row changed;
//! callers treat `false` as a lost race or an invalid transition.

pub mod packages;
pub mod sessions;
pub mod users;

use studio_common::db::SESSION_COLUMNS;

/// `SESSION_COLUMNS` qualified with a table alias, for joins
pub(crate) fn qualified_session_columns(alias: &str) -> String {
    SESSION_COLUMNS
        .split(',')
        .map(|c| format!("{}.{}", alias, c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}
