//! Key/value settings table
//!
//! Business tunables (fallback pricing, late-fee percentage, late-cancellation
//! window) live here so operators can change them without a rebuild.

use crate::{Error, Result};
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Rate for sessions at or above the standard duration, when no package applies
pub const PRICING_STANDARD_RATE_CENTS: &str = "pricing_standard_rate_cents";
/// Rate for shorter sessions, when no package applies
pub const PRICING_SHORT_RATE_CENTS: &str = "pricing_short_rate_cents";
/// Minimum duration (minutes) charged at the standard rate
pub const PRICING_STANDARD_MIN_DURATION: &str = "pricing_standard_min_duration";
/// Late fee and partial charge as a percentage of the session rate
pub const LATE_FEE_PERCENT: &str = "late_fee_percent";
/// Cancellations closer than this many hours to the session are late
pub const LATE_CANCEL_WINDOW_HOURS: &str = "late_cancel_window_hours";
/// Shared secret for API authentication (0 disables hash checking)
pub const API_SHARED_SECRET: &str = "api_shared_secret";

/// Initialize or repair default settings
///
/// Missing keys are created; keys holding NULL are reset to their default.
/// Existing values are never overwritten.
pub async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    // Fallback pricing when the client has no active package
    ensure_setting(pool, PRICING_STANDARD_RATE_CENTS, "17500").await?;
    ensure_setting(pool, PRICING_SHORT_RATE_CENTS, "10000").await?;
    ensure_setting(pool, PRICING_STANDARD_MIN_DURATION, "60").await?;

    // Cancellation policy
    ensure_setting(pool, LATE_FEE_PERCENT, "50").await?;
    ensure_setting(pool, LATE_CANCEL_WINDOW_HOURS, "24").await?;

    info!("Default settings initialized");
    Ok(())
}

/// Ensure a setting exists with the specified default value
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let existing: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    match existing {
        None => {
            // INSERT OR IGNORE: two services may start at once
            sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(default_value)
                .execute(pool)
                .await?;
            info!("Initialized setting '{}' with default value: {}", key, default_value);
        }
        Some(None) => {
            sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
                .bind(default_value)
                .bind(key)
                .execute(pool)
                .await?;
            warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
        }
        Some(Some(_)) => {}
    }

    Ok(())
}

/// Read a raw setting value
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    Ok(value.flatten())
}

/// Read an integer setting, falling back to `default` when absent
///
/// A present but non-numeric value is a configuration error rather than a
/// silent fallback.
pub async fn get_setting_i64(pool: &SqlitePool, key: &str, default: i64) -> Result<i64> {
    match get_setting(pool, key).await? {
        Some(raw) => raw.trim().parse::<i64>().map_err(|e| {
            Error::Config(format!("Setting '{}' is not an integer ({}): {}", key, raw, e))
        }),
        None => Ok(default),
    }
}

/// Write a setting, replacing any existing value
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(value)
        .execute(pool)
        .await?;

    Ok(())
}
