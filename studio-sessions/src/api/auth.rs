//! Authentication middleware for studio-sessions
//!
//! Every `/api` request names its caller in `x-studio-user` and proves it with
//! `x-studio-timestamp` + `x-studio-hash` (SHA-256 over the canonical identity
//! payload and the shared secret). The resolved caller is attached to the
//! request as a [`Principal`] extension for handlers to authorize against.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use studio_common::api::{
    validate_request_hash, validate_timestamp, ApiAuthError, HASH_HEADER, TIMESTAMP_HEADER,
    USER_HEADER,
};
use tracing::warn;

use crate::db::users;
use crate::error::{ApiError, ApiResult};
use crate::session::{Role, Session, SessionStatus};
use crate::AppState;

/// Authenticated caller
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: i64,
    pub role: Role,
    pub name: String,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Admins and trainers
    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Trainer)
    }

    pub fn require_admin(&self) -> ApiResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            warn!(user_id = self.user_id, role = %self.role, "Admin access denied");
            Err(ApiError::Forbidden("Admin access required".to_string()))
        }
    }

    /// Admin, or the trainer assigned to `session`
    pub fn require_session_staff(&self, session: &Session) -> ApiResult<()> {
        let assigned_trainer =
            self.role == Role::Trainer && session.trainer_id == Some(self.user_id);
        if self.is_admin() || assigned_trainer {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "Only the session's trainer or an admin may do this".to_string(),
            ))
        }
    }

    /// Whether the caller may view `session`
    pub fn can_view(&self, session: &Session) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Trainer => session.trainer_id == Some(self.user_id),
            Role::Client => {
                session.client_id == Some(self.user_id)
                    || session.status == SessionStatus::Available
            }
        }
    }
}

/// Authentication middleware
///
/// Applied to protected routes only; `/health` stays public. A shared secret
/// of 0 disables timestamp and hash checks, but the user header is still
/// required since every handler authorizes against the principal.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user_id = header_i64(&request, USER_HEADER)?;

    if state.shared_secret != 0 {
        let timestamp = header_i64(&request, TIMESTAMP_HEADER)?;
        let hash = header_str(&request, HASH_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("Missing {} header", HASH_HEADER)))?;

        validate_timestamp(timestamp).map_err(|e| match e {
            ApiAuthError::InvalidTimestamp { reason, .. } => ApiError::Unauthorized(reason),
            other => ApiError::Internal(other.to_string()),
        })?;

        validate_request_hash(hash, user_id, timestamp, state.shared_secret).map_err(
            |e| match e {
                ApiAuthError::InvalidHash {
                    provided,
                    calculated,
                } => {
                    warn!(
                        "Hash validation failed: provided={}, calculated={}",
                        provided, calculated
                    );
                    ApiError::Unauthorized("Invalid hash".to_string())
                }
                other => ApiError::Internal(other.to_string()),
            },
        )?;
    }

    let user = users::fetch_user(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized(format!("Unknown user {}", user_id)))?;
    let role: Role = user
        .role
        .parse()
        .map_err(|_| ApiError::Internal(format!("User {} has invalid role '{}'", user.id, user.role)))?;

    request.extensions_mut().insert(Principal {
        user_id: user.id,
        role,
        name: user.full_name(),
    });

    Ok(next.run(request).await)
}

fn header_str<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request.headers().get(name).and_then(|v| v.to_str().ok())
}

fn header_i64(request: &Request, name: &str) -> ApiResult<i64> {
    let raw = header_str(request, name)
        .ok_or_else(|| ApiError::Unauthorized(format!("Missing {} header", name)))?;
    raw.trim()
        .parse()
        .map_err(|_| ApiError::Unauthorized(format!("Invalid {} header", name)))
}
