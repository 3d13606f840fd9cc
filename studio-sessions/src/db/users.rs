//! Clients, trainers and admins

use sqlx::{SqliteExecutor, SqlitePool};
use studio_common::db::User;
use studio_common::{Error, Result};

use crate::session::Role;

const USER_COLUMNS: &str =
    "id, role, first_name, last_name, email, phone, available_sessions, specialties";

/// Fields for a new user row
#[derive(Debug, Clone)]
pub struct NewUser {
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub specialties: Option<String>,
}

pub async fn fetch_user<'e, E>(executor: E, id: i64) -> Result<Option<User>>
where
    E: SqliteExecutor<'e>,
{
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE id = ?",
        USER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(user)
}

/// Fetch a user that must exist
pub async fn get_user<'e, E>(executor: E, id: i64) -> Result<User>
where
    E: SqliteExecutor<'e>,
{
    fetch_user(executor, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("User {} not found", id)))
}

pub async fn insert_user(pool: &SqlitePool, user: &NewUser) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO users (role, first_name, last_name, email, phone, specialties)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(user.role.as_str())
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.email)
    .bind(&user.phone)
    .bind(&user.specialties)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Take one session credit from a client; false when the balance is empty
pub async fn consume_credit<'e, E>(executor: E, client_id: i64) -> Result<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        "UPDATE users SET available_sessions = available_sessions - 1
         WHERE id = ? AND role = 'client' AND available_sessions > 0",
    )
    .bind(client_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Add `count` session credits to a client
pub async fn add_credits<'e, E>(executor: E, client_id: i64, count: i64) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        "UPDATE users SET available_sessions = available_sessions + ?
         WHERE id = ? AND role = 'client'",
    )
    .bind(count)
    .bind(client_id)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Client {} not found", client_id)));
    }

    Ok(())
}
