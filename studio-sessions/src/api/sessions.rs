//! Session lifecycle endpoints
//!
//! Listing, slot creation, request, booking, confirm and complete. Every
//! status change is a conditional update, so a request that loses a race
//! sees the same 400 as one that asked for an invalid transition.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::auth::Principal;
use crate::api::extract::{JsonBody, OptionalJsonBody};
use crate::db::sessions::{self as session_db, NewSession, Visibility};
use crate::db::users;
use crate::error::{ApiError, ApiResult};
use crate::pagination::{calculate_pagination, Pagination, PAGE_SIZE};
use crate::session::{Role, Session, SessionStatus};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
}

pub(crate) fn default_page() -> i64 {
    1
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionListResponse {
    pub success: bool,
    pub sessions: Vec<Session>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub success: bool,
    pub message: String,
    pub session: Session,
}

impl SessionResponse {
    fn new(message: impl Into<String>, session: Session) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            session,
        })
    }
}

/// GET /api/sessions?status=&page=
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<SessionListResponse>> {
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(s) => Some(s.parse::<SessionStatus>()?),
    };
    let visibility = match principal.role {
        Role::Admin => Visibility::All,
        Role::Trainer => Visibility::Trainer(principal.user_id),
        Role::Client => Visibility::Client(principal.user_id),
    };

    let total = session_db::count_sessions(&state.db, status, visibility).await?;
    let pagination = calculate_pagination(total, query.page);
    let sessions = session_db::list_sessions(
        &state.db,
        status,
        visibility,
        PAGE_SIZE,
        pagination.offset,
    )
    .await?;

    Ok(Json(SessionListResponse {
        success: true,
        sessions,
        pagination,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub session_date: DateTime<Utc>,
    pub duration: Option<i64>,
    pub trainer_id: Option<i64>,
    pub location: Option<String>,
    pub notes: Option<String>,
}

/// POST /api/sessions (admin): open an available slot
pub async fn create_session(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    JsonBody(req): JsonBody<CreateSessionRequest>,
) -> ApiResult<(StatusCode, Json<SessionResponse>)> {
    principal.require_admin()?;

    let duration = req.duration.unwrap_or(60);
    if duration <= 0 {
        return Err(ApiError::BadRequest("duration must be positive".to_string()));
    }

    if let Some(trainer_id) = req.trainer_id {
        let trainer = users::get_user(&state.db, trainer_id).await?;
        if trainer.role != Role::Trainer.as_str() {
            return Err(ApiError::BadRequest(format!("User {} is not a trainer", trainer_id)));
        }
    }

    let id = session_db::insert_session(
        &state.db,
        &NewSession {
            session_date: req.session_date,
            duration,
            trainer_id: req.trainer_id,
            location: req.location,
            notes: req.notes,
        },
    )
    .await?;

    info!(session_id = id, created_by = principal.user_id, "Session slot created");

    let session = session_db::get_session(&state.db, id).await?;
    Ok((StatusCode::CREATED, SessionResponse::new("Session created", session)))
}

/// GET /api/sessions/:id
pub async fn get_session(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> ApiResult<Json<SessionResponse>> {
    let session = session_db::get_session(&state.db, id).await?;
    if !principal.can_view(&session) {
        return Err(ApiError::Forbidden("Not authorized to view this session".to_string()));
    }
    Ok(SessionResponse::new("Session found", session))
}

/// POST /api/sessions/:id/request (client)
pub async fn request_session(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> ApiResult<Json<SessionResponse>> {
    if principal.role != Role::Client {
        return Err(ApiError::Forbidden("Only clients can request sessions".to_string()));
    }

    let session = session_db::get_session(&state.db, id).await?;
    if !session_db::mark_requested(&state.db, id, principal.user_id).await? {
        return Err(invalid_transition(&session, SessionStatus::Requested));
    }

    info!(session_id = id, client_id = principal.user_id, "Session requested");

    let session = session_db::get_session(&state.db, id).await?;
    Ok(SessionResponse::new("Session requested", session))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRequest {
    pub client_id: Option<i64>,
}

/// POST /api/sessions/:id/book
///
/// Clients book for themselves; admins book any client or approve a
/// pending request. Consumes one session credit.
pub async fn book_session(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
    OptionalJsonBody(req): OptionalJsonBody<BookRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let mut tx = state.db.begin().await?;
    let session = session_db::get_session(&mut *tx, id).await?;

    let client_id = match principal.role {
        Role::Client => {
            if req.client_id.is_some_and(|c| c != principal.user_id) {
                return Err(ApiError::Forbidden("Clients can only book for themselves".to_string()));
            }
            principal.user_id
        }
        Role::Admin => req
            .client_id
            .or(session.client_id)
            .ok_or_else(|| ApiError::BadRequest("clientId is required".to_string()))?,
        Role::Trainer => {
            return Err(ApiError::Forbidden("Trainers cannot book sessions".to_string()));
        }
    };

    if !session.status.can_transition_to(SessionStatus::Scheduled) {
        return Err(invalid_transition(&session, SessionStatus::Scheduled));
    }
    if session.status == SessionStatus::Requested && session.client_id != Some(client_id) {
        return Err(ApiError::BadRequest(
            "Session was requested by another client".to_string(),
        ));
    }

    let client = users::get_user(&mut *tx, client_id).await?;
    if client.role != Role::Client.as_str() {
        return Err(ApiError::BadRequest(format!("User {} is not a client", client_id)));
    }
    if !users::consume_credit(&mut *tx, client_id).await? {
        warn!(session_id = id, client_id, "Booking rejected: no available sessions");
        return Err(ApiError::BadRequest(
            "Client has no available sessions. Purchase a package first.".to_string(),
        ));
    }
    if !session_db::mark_scheduled(&mut *tx, id, client_id).await? {
        return Err(invalid_transition(&session, SessionStatus::Scheduled));
    }

    tx.commit().await?;

    info!(
        session_id = id,
        client_id,
        booked_by = principal.user_id,
        remaining_credits = client.available_sessions - 1,
        "Session booked"
    );

    let session = session_db::get_session(&state.db, id).await?;
    Ok(SessionResponse::new("Session booked", session))
}

/// PUT /api/sessions/:id/confirm (assigned trainer or admin)
pub async fn confirm_session(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> ApiResult<Json<SessionResponse>> {
    let session = advance(&state, &principal, id, SessionStatus::Confirmed).await?;
    Ok(SessionResponse::new("Session confirmed", session))
}

/// PUT /api/sessions/:id/complete (assigned trainer or admin)
pub async fn complete_session(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> ApiResult<Json<SessionResponse>> {
    let session = advance(&state, &principal, id, SessionStatus::Completed).await?;
    Ok(SessionResponse::new("Session completed", session))
}

async fn advance(
    state: &AppState,
    principal: &Principal,
    id: i64,
    next: SessionStatus,
) -> ApiResult<Session> {
    let session = session_db::get_session(&state.db, id).await?;
    principal.require_session_staff(&session)?;

    if !session_db::advance_status(&state.db, id, next).await? {
        return Err(invalid_transition(&session, next));
    }

    info!(session_id = id, from = %session.status, to = %next, by = principal.user_id, "Session status changed");

    Ok(session_db::get_session(&state.db, id).await?)
}

pub(crate) fn invalid_transition(session: &Session, next: SessionStatus) -> ApiError {
    ApiError::BadRequest(format!(
        "Session {} cannot move from '{}' to '{}'",
        session.id, session.status, next
    ))
}
