//! Cancellation workflow endpoints
//!
//! cancel (with the silent gate) → admin listing → review (charge or waive).
//! The decision moves `pending → charged | waived` exactly once; the review
//! update only matches rows still pending, so a second review is a 409.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use studio_common::db::settings::{get_setting_i64, LATE_CANCEL_WINDOW_HOURS};
use studio_common::time;
use tracing::{info, warn};

use crate::api::auth::Principal;
use crate::api::extract::{JsonBody, OptionalJsonBody};
use crate::api::sessions::{default_page, invalid_transition};
use crate::db::sessions::{self as session_db, CancelledFilter, CancellationUpdate, ReviewUpdate};
use crate::db::users;
use crate::error::{ApiError, ApiResult};
use crate::notify::{self, CancellationNotice, DispatchReport};
use crate::pagination::{calculate_pagination, Pagination, PAGE_SIZE};
use crate::pricing::{resolve_pricing, PricingQuote, MAX_PRICE_CENTS};
use crate::session::{
    is_late_cancellation, CancellationDecision, ChargeType, Role, Session, SessionStatus,
};
use crate::AppState;

const DEFAULT_LATE_WINDOW_HOURS: i64 = 24;

async fn late_window_hours(pool: &SqlitePool) -> ApiResult<i64> {
    Ok(get_setting_i64(pool, LATE_CANCEL_WINDOW_HOURS, DEFAULT_LATE_WINDOW_HOURS).await?)
}

/// Owning client, assigned trainer, or admin
fn require_cancel_permission(principal: &Principal, session: &Session) -> ApiResult<()> {
    let allowed = match principal.role {
        Role::Admin => true,
        Role::Trainer => session.trainer_id == Some(principal.user_id),
        Role::Client => session.client_id == Some(principal.user_id),
    };
    if allowed {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "Not authorized to cancel this session".to_string(),
        ))
    }
}

// ============================================================================
// Cancel warning
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelWarningResponse {
    pub success: bool,
    pub session_id: i64,
    pub session_date: DateTime<Utc>,
    pub hours_until_session: f64,
    pub late_cancel_window_hours: i64,
    pub is_late_cancellation: bool,
    pub credit_would_be_restored: bool,
    /// Fee an admin would charge by default if the late cancellation is charged
    pub estimated_fee_cents: i64,
    pub pricing: PricingQuote,
}

/// GET /api/sessions/:id/cancel-warning
pub async fn cancel_warning(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> ApiResult<Json<CancelWarningResponse>> {
    let session = session_db::get_session(&state.db, id).await?;
    require_cancel_permission(&principal, &session)?;
    if !session.status.is_cancellable() {
        return Err(invalid_transition(&session, SessionStatus::Cancelled));
    }

    let window = late_window_hours(&state.db).await?;
    let now = time::now();
    let is_late = is_late_cancellation(session.session_date, now, window);
    let pricing = resolve_pricing(&state.db, session.client_id, session.duration).await?;

    Ok(Json(CancelWarningResponse {
        success: true,
        session_id: session.id,
        session_date: session.session_date,
        hours_until_session: time::hours_between(now, session.session_date),
        late_cancel_window_hours: window,
        is_late_cancellation: is_late,
        credit_would_be_restored: session.credit_deducted && !is_late,
        estimated_fee_cents: if is_late {
            pricing.charge_for(ChargeType::LateFee)
        } else {
            0
        },
        pricing,
    }))
}

// ============================================================================
// Cancel
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub silent: Option<bool>,
    pub reason: Option<String>,
    /// Staff override of the automatic credit restoration
    pub restore_credit: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub success: bool,
    pub message: String,
    pub session_id: i64,
    pub status: SessionStatus,
    pub cancellation_reason: Option<String>,
    pub cancellation_decision: Option<CancellationDecision>,
    pub is_late_cancellation: bool,
    pub credit_restored: bool,
    pub silent_mode: bool,
    pub notifications_sent: DispatchReport,
}

/// PATCH /api/sessions/:id/cancel
///
/// `silent` is honoured for staff only; a client's flag is ignored.
pub async fn cancel_session(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
    OptionalJsonBody(req): OptionalJsonBody<CancelRequest>,
) -> ApiResult<Json<CancelResponse>> {
    let window = late_window_hours(&state.db).await?;

    let mut tx = state.db.begin().await?;
    let session = session_db::get_session(&mut *tx, id).await?;
    require_cancel_permission(&principal, &session)?;

    if !session.status.is_cancellable() {
        return Err(invalid_transition(&session, SessionStatus::Cancelled));
    }

    let requested_silent = req.silent.unwrap_or(false);
    let silent = requested_silent && principal.is_staff();
    if requested_silent && !silent {
        warn!(
            session_id = id,
            user_id = principal.user_id,
            "Silent cancellation requested by non-staff user; notifications will be sent"
        );
    }

    let now = time::now();
    let is_late = is_late_cancellation(session.session_date, now, window);
    let restore = match req.restore_credit {
        Some(value) if principal.is_staff() => value,
        _ => !is_late,
    };
    let credit_restored = session.credit_deducted && session.client_id.is_some() && restore;

    let reason = req
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(if is_late {
            "Late cancellation"
        } else {
            "No reason provided"
        })
        .to_string();

    let update = CancellationUpdate {
        reason,
        cancelled_by: principal.user_id,
        cancelled_at: now,
        silent,
        credit_restored,
    };
    if !session_db::mark_cancelled(&mut *tx, id, &update).await? {
        return Err(invalid_transition(&session, SessionStatus::Cancelled));
    }
    if let (true, Some(client_id)) = (credit_restored, session.client_id) {
        users::add_credits(&mut *tx, client_id, 1).await?;
    }

    tx.commit().await?;

    info!(
        session_id = id,
        cancelled_by = principal.user_id,
        is_late,
        credit_restored,
        silent,
        "Session cancelled"
    );

    let session = session_db::get_session(&state.db, id).await?;
    let client = match session.client_id {
        Some(cid) => users::fetch_user(&state.db, cid).await?,
        None => None,
    };
    let trainer = match session.trainer_id {
        Some(tid) => users::fetch_user(&state.db, tid).await?,
        None => None,
    };

    let notifications_sent = notify::dispatch_cancellation(
        state.notifier.as_ref(),
        silent,
        CancellationNotice {
            session: &session,
            client: client.as_ref(),
            trainer: trainer.as_ref(),
            actor_id: principal.user_id,
            is_late,
            credit_restored,
        },
    )
    .await;

    let message = if silent {
        "Session cancelled silently (no notifications sent)"
    } else {
        "Session cancelled successfully"
    };

    Ok(Json(CancelResponse {
        success: true,
        message: message.to_string(),
        session_id: session.id,
        status: session.status,
        cancellation_reason: session.cancellation_reason.clone(),
        cancellation_decision: session.cancellation_decision,
        is_late_cancellation: is_late,
        credit_restored,
        silent_mode: silent,
        notifications_sent,
    }))
}

// ============================================================================
// Admin listing
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelledQuery {
    pub decision_status: Option<String>,
    /// RFC 3339 lower bound on the cancellation date
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
}

#[derive(Debug, Serialize)]
pub struct ReviewerInfo {
    pub id: i64,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelledSessionEntry {
    #[serde(flatten)]
    pub session: Session,
    pub client_name: Option<String>,
    pub trainer_name: Option<String>,
    pub is_late_cancellation: bool,
    pub reviewer: Option<ReviewerInfo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelledListResponse {
    pub success: bool,
    pub decision_status: Option<CancellationDecision>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub sessions: Vec<CancelledSessionEntry>,
    pub pagination: Pagination,
}

/// GET /api/sessions/admin/cancelled?decisionStatus=pending|charged|waived
///
/// `startDate`/`endDate` narrow the listing by cancellation date.
pub async fn admin_cancelled(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<CancelledQuery>,
) -> ApiResult<Json<CancelledListResponse>> {
    principal.require_admin()?;

    let decision = match query.decision_status.as_deref() {
        None | Some("") => None,
        Some(s) => Some(s.parse::<CancellationDecision>()?),
    };
    let filter = CancelledFilter {
        decision,
        start: parse_date_bound("startDate", query.start_date.as_deref())?,
        end: parse_date_bound("endDate", query.end_date.as_deref())?,
    };
    if let (Some(start), Some(end)) = (filter.start, filter.end) {
        if start > end {
            return Err(ApiError::BadRequest(
                "startDate must not be after endDate".to_string(),
            ));
        }
    }
    let window = late_window_hours(&state.db).await?;

    let total = session_db::count_cancelled(&state.db, &filter).await?;
    let pagination = calculate_pagination(total, query.page);
    let rows = session_db::list_cancelled(&state.db, &filter, PAGE_SIZE, pagination.offset).await?;

    let sessions = rows
        .into_iter()
        .map(|row| {
            let is_late = row
                .session
                .cancellation_date
                .map(|at| is_late_cancellation(row.session.session_date, at, window))
                .unwrap_or(false);
            let reviewer = row.session.cancellation_reviewed_by.map(|id| ReviewerInfo {
                id,
                name: row.reviewer_name.clone(),
            });
            CancelledSessionEntry {
                session: row.session,
                client_name: row.client_name,
                trainer_name: row.trainer_name,
                is_late_cancellation: is_late,
                reviewer,
            }
        })
        .collect();

    Ok(Json(CancelledListResponse {
        success: true,
        decision_status: decision,
        start_date: filter.start,
        end_date: filter.end,
        sessions,
        pagination,
    }))
}

fn parse_date_bound(name: &str, value: Option<&str>) -> ApiResult<Option<DateTime<Utc>>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|d| Some(d.with_timezone(&Utc)))
            .map_err(|e| ApiError::BadRequest(format!("{} must be RFC 3339: {}", name, e))),
    }
}

// ============================================================================
// Pricing lookup for review
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPriceResponse {
    pub success: bool,
    pub session_id: i64,
    pub pricing: PricingQuote,
}

/// GET /api/sessions/:id/client-package-price (admin)
pub async fn client_package_price(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> ApiResult<Json<SessionPriceResponse>> {
    principal.require_admin()?;

    let session = session_db::get_session(&state.db, id).await?;
    let pricing = resolve_pricing(&state.db, session.client_id, session.duration).await?;

    Ok(Json(SessionPriceResponse {
        success: true,
        session_id: session.id,
        pricing,
    }))
}

// ============================================================================
// Review
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    pub decision: String,
    #[serde(default)]
    pub reason: Option<String>,
    pub charge_type: Option<String>,
    pub charge_amount_cents: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    pub success: bool,
    pub message: String,
    pub session_id: i64,
    pub decision: CancellationDecision,
    pub charge_type: ChargeType,
    pub charge_amount_cents: i64,
    pub reviewer: ReviewerInfo,
    pub reviewed_at: DateTime<Utc>,
    pub notification_sent: bool,
    pub pricing: Option<PricingQuote>,
    pub session: Session,
}

/// Validated review input
struct ReviewInput {
    decision: CancellationDecision,
    reason: String,
    charge_type: ChargeType,
    amount_override: Option<i64>,
}

fn parse_review(req: ReviewRequest) -> ApiResult<ReviewInput> {
    let decision: CancellationDecision = req.decision.trim().parse()?;
    if decision == CancellationDecision::Pending {
        return Err(ApiError::BadRequest(
            "decision must be 'charged' or 'waived'".to_string(),
        ));
    }

    let reason = req.reason.as_deref().map(str::trim).unwrap_or("").to_string();
    if decision == CancellationDecision::Waived && reason.is_empty() {
        return Err(ApiError::BadRequest(
            "A reason is required to waive a cancellation charge".to_string(),
        ));
    }

    let charge_type = match decision {
        CancellationDecision::Waived => ChargeType::None,
        _ => match req.charge_type.as_deref() {
            None | Some("") => ChargeType::LateFee,
            Some(s) => {
                let parsed: ChargeType = s.parse()?;
                if parsed == ChargeType::None {
                    return Err(ApiError::BadRequest(
                        "chargeType 'none' is not valid for a charge; waive instead".to_string(),
                    ));
                }
                parsed
            }
        },
    };

    if let Some(amount) = req.charge_amount_cents {
        if !(0..=MAX_PRICE_CENTS).contains(&amount) {
            return Err(ApiError::BadRequest(format!(
                "chargeAmountCents must be within 0..={}",
                MAX_PRICE_CENTS
            )));
        }
    }

    Ok(ReviewInput {
        decision,
        reason,
        charge_type,
        amount_override: match decision {
            CancellationDecision::Waived => None,
            _ => req.charge_amount_cents,
        },
    })
}

/// POST /api/sessions/:id/charge-cancellation (admin)
pub async fn charge_cancellation(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
    JsonBody(req): JsonBody<ReviewRequest>,
) -> ApiResult<Json<ReviewResponse>> {
    principal.require_admin()?;
    let input = parse_review(req)?;

    let session = session_db::get_session(&state.db, id).await?;
    if session.status != SessionStatus::Cancelled {
        return Err(ApiError::BadRequest(format!(
            "Session {} is not cancelled (status '{}')",
            id, session.status
        )));
    }
    if session.cancellation_decision != Some(CancellationDecision::Pending) {
        return Err(already_reviewed(&session));
    }

    let now = time::now();
    let (pricing, charge_cents, charged_at) = match input.decision {
        CancellationDecision::Charged => {
            let quote = resolve_pricing(&state.db, session.client_id, session.duration).await?;
            let amount = input
                .amount_override
                .unwrap_or_else(|| quote.charge_for(input.charge_type));
            (Some(quote), amount, Some(now))
        }
        _ => (None, 0, None),
    };

    let review = ReviewUpdate {
        decision: input.decision,
        reviewed_by: principal.user_id,
        reviewed_at: now,
        reason: input.reason,
        charge_type: input.charge_type,
        charge_cents,
        charged_at,
    };

    let mut tx = state.db.begin().await?;
    if !session_db::record_decision(&mut *tx, id, &review).await? {
        return Err(already_reviewed(&session));
    }
    tx.commit().await?;

    info!(
        session_id = id,
        decision = %input.decision,
        charge_type = %input.charge_type,
        charge_cents,
        reviewed_by = principal.user_id,
        "Cancellation reviewed"
    );

    let session = session_db::get_session(&state.db, id).await?;

    let notification_sent = if input.decision == CancellationDecision::Charged {
        let client = match session.client_id {
            Some(cid) => users::fetch_user(&state.db, cid).await?,
            None => None,
        };
        notify::dispatch_charge_notice(
            state.notifier.as_ref(),
            &session,
            client.as_ref(),
            input.charge_type,
            charge_cents,
        )
        .await
    } else {
        false
    };

    let message = match input.decision {
        CancellationDecision::Charged => format!(
            "Cancellation charge of {} applied",
            notify::format_cents(charge_cents)
        ),
        _ => "Cancellation charge waived".to_string(),
    };

    Ok(Json(ReviewResponse {
        success: true,
        message,
        session_id: id,
        decision: input.decision,
        charge_type: input.charge_type,
        charge_amount_cents: charge_cents,
        reviewer: ReviewerInfo {
            id: principal.user_id,
            name: Some(principal.name.clone()),
        },
        reviewed_at: now,
        notification_sent,
        pricing,
        session,
    }))
}

fn already_reviewed(session: &Session) -> ApiError {
    let current = session
        .cancellation_decision
        .map(|d| d.as_str())
        .unwrap_or("none");
    ApiError::Conflict(format!(
        "Cancellation decision for session {} already recorded ('{}')",
        session.id, current
    ))
}
