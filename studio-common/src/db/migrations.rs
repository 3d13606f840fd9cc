//! Database schema migrations
//!
//! Versioned, reversible schema changes applied on top of the base tables
//! created in [`crate::db::init`]. Each version has an `up` and a `down`
//! step; both run inside one transaction together with the bookkeeping row
//! in `schema_version`.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - databases in the field already ran them
//! 2. **Always add new migrations** - one new version per schema change
//! 3. **Keep `down` symmetric** - it must undo exactly what `up` added
//! 4. **No foreign keys on added columns** - SQLite cannot `DROP COLUMN` a column
//!    that takes part in a foreign key constraint, which would break rollback
//!
//! # Versions
//!
//! - v1: cancellation review fields (`cancellation_decision`,
//!   `cancellation_reviewed_by`, `cancellation_reviewed_at`,
//!   `cancellation_review_reason`)
//! - v2: cancellation charge fields (`cancellation_charge_type`,
//!   `cancellation_charge_cents`, `cancellation_charged_at`)

use crate::{Error, Result};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await?;

    Ok(version.unwrap_or(0))
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        warn!("This may indicate a downgrade. Proceeding with caution.");
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    for version in (current_version + 1)..=CURRENT_SCHEMA_VERSION {
        let mut tx = pool.begin().await?;
        migrate_up(&mut *tx, version).await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!("✓ Migration v{} completed", version);
    }

    info!("All migrations completed successfully");
    Ok(())
}

/// Revert migrations down to `target_version` (exclusive)
///
/// `rollback_migrations(pool, 0)` removes every migrated column and leaves
/// only the base tables.
pub async fn rollback_migrations(pool: &SqlitePool, target_version: i32) -> Result<()> {
    if target_version < 0 {
        return Err(Error::InvalidInput(format!(
            "Rollback target must be >= 0, got {}",
            target_version
        )));
    }

    let current_version = get_schema_version(pool).await?;
    if target_version >= current_version {
        info!(
            "Nothing to roll back (current v{}, target v{})",
            current_version, target_version
        );
        return Ok(());
    }

    for version in ((target_version + 1)..=current_version).rev() {
        let mut tx = pool.begin().await?;
        migrate_down(&mut *tx, version).await?;
        sqlx::query("DELETE FROM schema_version WHERE version = ?")
            .bind(version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!("✓ Rolled back migration v{}", version);
    }

    Ok(())
}

async fn migrate_up(conn: &mut SqliteConnection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1_up(conn).await,
        2 => migrate_v2_up(conn).await,
        other => Err(Error::Migration {
            version: other,
            message: "no upgrade step defined".to_string(),
        }),
    }
}

async fn migrate_down(conn: &mut SqliteConnection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1_down(conn).await,
        2 => migrate_v2_down(conn).await,
        other => Err(Error::Migration {
            version: other,
            message: "no rollback step defined".to_string(),
        }),
    }
}

/// Migration v1: cancellation review decision and audit fields
async fn migrate_v1_up(conn: &mut SqliteConnection) -> Result<()> {
    info!("Running migration v1: Add cancellation review fields to sessions");

    add_column(
        conn,
        "cancellation_decision",
        "TEXT CHECK (cancellation_decision IN ('pending', 'charged', 'waived'))",
    )
    .await?;
    add_column(conn, "cancellation_reviewed_by", "INTEGER").await?;
    add_column(conn, "cancellation_reviewed_at", "TIMESTAMP").await?;
    add_column(conn, "cancellation_review_reason", "TEXT").await?;

    // Decisions are only meaningful for sessions that are already cancelled
    sqlx::query(
        "UPDATE sessions SET cancellation_decision = 'pending'
         WHERE status = 'cancelled' AND cancellation_decision IS NULL",
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sessions_cancellation_decision
         ON sessions(cancellation_decision)",
    )
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn migrate_v1_down(conn: &mut SqliteConnection) -> Result<()> {
    info!("Rolling back migration v1: Drop cancellation review fields");

    // Indexed columns cannot be dropped
    sqlx::query("DROP INDEX IF EXISTS idx_sessions_cancellation_decision")
        .execute(&mut *conn)
        .await?;

    drop_column(conn, "cancellation_review_reason").await?;
    drop_column(conn, "cancellation_reviewed_at").await?;
    drop_column(conn, "cancellation_reviewed_by").await?;
    drop_column(conn, "cancellation_decision").await?;

    Ok(())
}

/// Migration v2: cancellation charge fields
async fn migrate_v2_up(conn: &mut SqliteConnection) -> Result<()> {
    info!("Running migration v2: Add cancellation charge fields to sessions");

    add_column(
        conn,
        "cancellation_charge_type",
        "TEXT CHECK (cancellation_charge_type IN ('none', 'full', 'partial', 'late_fee'))",
    )
    .await?;
    add_column(conn, "cancellation_charge_cents", "INTEGER").await?;
    add_column(conn, "cancellation_charged_at", "TIMESTAMP").await?;

    Ok(())
}

async fn migrate_v2_down(conn: &mut SqliteConnection) -> Result<()> {
    info!("Rolling back migration v2: Drop cancellation charge fields");

    drop_column(conn, "cancellation_charged_at").await?;
    drop_column(conn, "cancellation_charge_cents").await?;
    drop_column(conn, "cancellation_charge_type").await?;

    Ok(())
}

async fn session_column_exists(conn: &mut SqliteConnection, column: &str) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info('sessions') WHERE name = ?")
            .bind(column)
            .fetch_one(&mut *conn)
            .await?;

    Ok(count > 0)
}

/// Add a column to `sessions` unless it already exists
async fn add_column(conn: &mut SqliteConnection, column: &str, definition: &str) -> Result<()> {
    if session_column_exists(conn, column).await? {
        info!("  {} column already exists - skipping", column);
        return Ok(());
    }

    sqlx::query(&format!("ALTER TABLE sessions ADD COLUMN {} {}", column, definition))
        .execute(&mut *conn)
        .await?;

    info!("  ✓ Added {} column to sessions table", column);
    Ok(())
}

async fn drop_column(conn: &mut SqliteConnection, column: &str) -> Result<()> {
    if !session_column_exists(conn, column).await? {
        return Ok(());
    }

    sqlx::query(&format!("ALTER TABLE sessions DROP COLUMN {}", column))
        .execute(&mut *conn)
        .await?;

    info!("  ✓ Dropped {} column from sessions table", column);
    Ok(())
}
