//! Session rows: lookup, listing and conditional status updates

use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteExecutor, SqlitePool};
use studio_common::db::{SessionRecord, SESSION_COLUMNS};
use studio_common::{Error, Result};

use super::qualified_session_columns;
use crate::session::{CancellationDecision, ChargeType, Session, SessionStatus};

/// Which sessions a caller may see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    All,
    /// Own sessions plus open slots
    Client(i64),
    /// Sessions assigned to the trainer
    Trainer(i64),
}

/// Fields for a new `available` slot
#[derive(Debug, Clone)]
pub struct NewSession {
    pub session_date: DateTime<Utc>,
    pub duration: i64,
    pub trainer_id: Option<i64>,
    pub location: Option<String>,
    pub notes: Option<String>,
}

/// Cancellation audit written with the status change
#[derive(Debug, Clone)]
pub struct CancellationUpdate {
    pub reason: String,
    pub cancelled_by: i64,
    pub cancelled_at: DateTime<Utc>,
    pub silent: bool,
    pub credit_restored: bool,
}

/// Admin review outcome
#[derive(Debug, Clone)]
pub struct ReviewUpdate {
    pub decision: CancellationDecision,
    pub reviewed_by: i64,
    pub reviewed_at: DateTime<Utc>,
    pub reason: String,
    pub charge_type: ChargeType,
    pub charge_cents: i64,
    pub charged_at: Option<DateTime<Utc>>,
}

/// A cancelled session with the names shown in the admin listing
#[derive(Debug, Clone)]
pub struct CancelledSession {
    pub session: Session,
    pub client_name: Option<String>,
    pub trainer_name: Option<String>,
    pub reviewer_name: Option<String>,
}

#[derive(FromRow)]
struct CancelledRow {
    #[sqlx(flatten)]
    record: SessionRecord,
    client_name: Option<String>,
    trainer_name: Option<String>,
    reviewer_name: Option<String>,
}

pub async fn fetch_session<'e, E>(executor: E, id: i64) -> Result<Option<Session>>
where
    E: SqliteExecutor<'e>,
{
    let record = sqlx::query_as::<_, SessionRecord>(&format!(
        "SELECT {} FROM sessions WHERE id = ?",
        SESSION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;

    record.map(Session::try_from).transpose()
}

/// Fetch a session that must exist
pub async fn get_session<'e, E>(executor: E, id: i64) -> Result<Session>
where
    E: SqliteExecutor<'e>,
{
    fetch_session(executor, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Session {} not found", id)))
}

fn push_filters(
    qb: &mut QueryBuilder<'_, Sqlite>,
    status: Option<SessionStatus>,
    visibility: Visibility,
) {
    qb.push(" WHERE 1 = 1");
    if let Some(status) = status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    match visibility {
        Visibility::All => {}
        Visibility::Client(id) => {
            qb.push(" AND (client_id = ")
                .push_bind(id)
                .push(" OR status = 'available')");
        }
        Visibility::Trainer(id) => {
            qb.push(" AND trainer_id = ").push_bind(id);
        }
    }
}

/// Count matching sessions
pub async fn count_sessions(
    pool: &SqlitePool,
    status: Option<SessionStatus>,
    visibility: Visibility,
) -> Result<i64> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM sessions");
    push_filters(&mut qb, status, visibility);
    let total = qb.build_query_scalar::<i64>().fetch_one(pool).await?;
    Ok(total)
}

/// One page of matching sessions, soonest first
pub async fn list_sessions(
    pool: &SqlitePool,
    status: Option<SessionStatus>,
    visibility: Visibility,
    limit: i64,
    offset: i64,
) -> Result<Vec<Session>> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM sessions", SESSION_COLUMNS));
    push_filters(&mut qb, status, visibility);
    qb.push(" ORDER BY session_date ASC, id ASC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let records = qb.build_query_as::<SessionRecord>().fetch_all(pool).await?;
    records.into_iter().map(Session::try_from).collect()
}

pub async fn insert_session(pool: &SqlitePool, session: &NewSession) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO sessions (session_date, duration, trainer_id, location, notes, status)
         VALUES (?, ?, ?, ?, ?, 'available')",
    )
    .bind(session.session_date)
    .bind(session.duration)
    .bind(session.trainer_id)
    .bind(&session.location)
    .bind(&session.notes)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// `'a', 'b'` list of the statuses `next` may be entered from
fn predecessor_list(next: SessionStatus) -> String {
    SessionStatus::predecessors(next)
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// available → requested for `client_id`
pub async fn mark_requested<'e, E>(executor: E, id: i64, client_id: i64) -> Result<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(&format!(
        "UPDATE sessions SET status = 'requested', client_id = ?
         WHERE id = ? AND status IN ({})",
        predecessor_list(SessionStatus::Requested)
    ))
    .bind(client_id)
    .bind(id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// available | requested → scheduled, recording the deducted credit
pub async fn mark_scheduled<'e, E>(executor: E, id: i64, client_id: i64) -> Result<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(&format!(
        "UPDATE sessions SET status = 'scheduled', client_id = ?, credit_deducted = 1
         WHERE id = ? AND status IN ({})",
        predecessor_list(SessionStatus::Scheduled)
    ))
    .bind(client_id)
    .bind(id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Plain status move for transitions without side fields (confirm, complete)
pub async fn advance_status<'e, E>(executor: E, id: i64, next: SessionStatus) -> Result<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(&format!(
        "UPDATE sessions SET status = ? WHERE id = ? AND status IN ({})",
        predecessor_list(next)
    ))
    .bind(next.as_str())
    .bind(id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Cancel and open the review with decision `pending`
pub async fn mark_cancelled<'e, E>(
    executor: E,
    id: i64,
    update: &CancellationUpdate,
) -> Result<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(&format!(
        "UPDATE sessions SET
             status = 'cancelled',
             cancellation_reason = ?,
             cancelled_by = ?,
             cancellation_date = ?,
             silent_cancellation = ?,
             credit_restored = ?,
             cancellation_decision = 'pending'
         WHERE id = ? AND status IN ({})",
        predecessor_list(SessionStatus::Cancelled)
    ))
    .bind(&update.reason)
    .bind(update.cancelled_by)
    .bind(update.cancelled_at)
    .bind(update.silent)
    .bind(update.credit_restored)
    .bind(id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Record the admin decision; false unless the decision was still pending
pub async fn record_decision<'e, E>(executor: E, id: i64, review: &ReviewUpdate) -> Result<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        "UPDATE sessions SET
             cancellation_decision = ?,
             cancellation_reviewed_by = ?,
             cancellation_reviewed_at = ?,
             cancellation_review_reason = ?,
             cancellation_charge_type = ?,
             cancellation_charge_cents = ?,
             cancellation_charged_at = ?
         WHERE id = ? AND status = 'cancelled' AND cancellation_decision = 'pending'",
    )
    .bind(review.decision.as_str())
    .bind(review.reviewed_by)
    .bind(review.reviewed_at)
    .bind(&review.reason)
    .bind(review.charge_type.as_str())
    .bind(review.charge_cents)
    .bind(review.charged_at)
    .bind(id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Admin listing filter; date bounds are inclusive on `cancellation_date`
#[derive(Debug, Clone, Copy, Default)]
pub struct CancelledFilter {
    pub decision: Option<CancellationDecision>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

fn push_cancelled_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &CancelledFilter) {
    qb.push(" WHERE s.status = 'cancelled'");
    if let Some(decision) = filter.decision {
        qb.push(" AND s.cancellation_decision = ")
            .push_bind(decision.as_str());
    }
    if let Some(start) = filter.start {
        qb.push(" AND julianday(s.cancellation_date) >= julianday(")
            .push_bind(start)
            .push(")");
    }
    if let Some(end) = filter.end {
        qb.push(" AND julianday(s.cancellation_date) <= julianday(")
            .push_bind(end)
            .push(")");
    }
}

pub async fn count_cancelled(pool: &SqlitePool, filter: &CancelledFilter) -> Result<i64> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM sessions s");
    push_cancelled_filter(&mut qb, filter);
    let total = qb.build_query_scalar::<i64>().fetch_one(pool).await?;
    Ok(total)
}

/// Cancelled sessions, most recent cancellation first
pub async fn list_cancelled(
    pool: &SqlitePool,
    filter: &CancelledFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<CancelledSession>> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {},
                TRIM(c.first_name || ' ' || c.last_name) AS client_name,
                TRIM(t.first_name || ' ' || t.last_name) AS trainer_name,
                TRIM(r.first_name || ' ' || r.last_name) AS reviewer_name
         FROM sessions s
         LEFT JOIN users c ON c.id = s.client_id
         LEFT JOIN users t ON t.id = s.trainer_id
         LEFT JOIN users r ON r.id = s.cancellation_reviewed_by",
        qualified_session_columns("s")
    ));
    push_cancelled_filter(&mut qb, filter);
    qb.push(" ORDER BY s.cancellation_date DESC, s.id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let rows = qb.build_query_as::<CancelledRow>().fetch_all(pool).await?;

    rows.into_iter()
        .map(|row| {
            Ok(CancelledSession {
                session: Session::try_from(row.record)?,
                client_name: row.client_name,
                trainer_name: row.trainer_name,
                reviewer_name: row.reviewer_name,
            })
        })
        .collect()
}
