//! Packages and client package grants

use chrono::{DateTime, Utc};
use sqlx::{SqliteExecutor, SqlitePool};
use studio_common::db::{ActivePackage, Package};
use studio_common::Result;

/// Fields for a new package row
#[derive(Debug, Clone)]
pub struct NewPackage {
    pub name: String,
    pub session_count: i64,
    pub price_per_session_cents: i64,
    pub is_special: bool,
}

pub async fn list_packages(pool: &SqlitePool) -> Result<Vec<Package>> {
    let packages = sqlx::query_as::<_, Package>(
        "SELECT id, name, session_count, price_per_session_cents, is_special
         FROM packages ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(packages)
}

pub async fn fetch_package<'e, E>(executor: E, id: i64) -> Result<Option<Package>>
where
    E: SqliteExecutor<'e>,
{
    let package = sqlx::query_as::<_, Package>(
        "SELECT id, name, session_count, price_per_session_cents, is_special
         FROM packages WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(package)
}

pub async fn insert_package(pool: &SqlitePool, package: &NewPackage) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO packages (name, session_count, price_per_session_cents, is_special)
         VALUES (?, ?, ?, ?)",
    )
    .bind(&package.name)
    .bind(package.session_count)
    .bind(package.price_per_session_cents)
    .bind(package.is_special)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Record a package grant; the newest active grant is the client's active package
pub async fn grant_package<'e, E>(
    executor: E,
    client_id: i64,
    package_id: i64,
    purchased_at: DateTime<Utc>,
) -> Result<i64>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        "INSERT INTO client_packages (client_id, package_id, purchased_at, active)
         VALUES (?, ?, ?, 1)",
    )
    .bind(client_id)
    .bind(package_id)
    .bind(purchased_at)
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

/// The client's most recently granted active package
pub async fn active_package<'e, E>(executor: E, client_id: i64) -> Result<Option<ActivePackage>>
where
    E: SqliteExecutor<'e>,
{
    let package = sqlx::query_as::<_, ActivePackage>(
        "SELECT cp.id AS client_package_id, p.id AS package_id, p.name, p.session_count,
                p.price_per_session_cents, p.is_special, cp.purchased_at
         FROM client_packages cp
         JOIN packages p ON p.id = cp.package_id
         WHERE cp.client_id = ? AND cp.active = 1
         ORDER BY cp.purchased_at DESC, cp.id DESC
         LIMIT 1",
    )
    .bind(client_id)
    .fetch_optional(executor)
    .await?;

    Ok(package)
}
