//! studio-sessions library - session booking and cancellation service
//!
//! Session status state machine, the cancellation review workflow, the
//! package-based pricing resolver and the silent-cancellation notification
//! gate, served over HTTP with axum.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json, Router,
};
use sqlx::SqlitePool;
use studio_common::api::ErrorResponse;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod db;
pub mod error;
pub mod notify;
pub mod pagination;
pub mod pricing;
pub mod session;

use notify::Notifier;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Shared secret for API authentication (0 disables hash checks)
    pub shared_secret: i64,
    /// Notification transport
    pub notifier: Arc<dyn Notifier>,
    /// Replace 500 messages with a generic one (production)
    pub mask_internal_errors: bool,
}

impl AppState {
    /// Create new application state
    pub fn new(db: SqlitePool, shared_secret: i64, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            db,
            shared_secret,
            notifier,
            mask_internal_errors: false,
        }
    }

    pub fn with_masked_errors(mut self, mask: bool) -> Self {
        self.mask_internal_errors = mask;
        self
    }
}

/// Build application router
///
/// `/health` is public; everything under `/api` goes through
/// [`api::auth_middleware`].
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, patch, post, put};

    // Protected routes (require authentication)
    let protected = Router::new()
        .route("/api/sessions", get(api::list_sessions).post(api::create_session))
        .route("/api/sessions/admin/cancelled", get(api::admin_cancelled))
        .route("/api/sessions/:id", get(api::get_session))
        .route("/api/sessions/:id/request", post(api::request_session))
        .route("/api/sessions/:id/book", post(api::book_session))
        .route("/api/sessions/:id/confirm", put(api::confirm_session))
        .route("/api/sessions/:id/complete", put(api::complete_session))
        .route("/api/sessions/:id/cancel-warning", get(api::cancel_warning))
        .route("/api/sessions/:id/cancel", patch(api::cancel_session))
        .route(
            "/api/sessions/:id/client-package-price",
            get(api::client_package_price),
        )
        .route(
            "/api/sessions/:id/charge-cancellation",
            post(api::charge_cancellation),
        )
        .route("/api/clients/:id/pricing", get(api::client_pricing))
        .route("/api/clients/:id/packages", post(api::grant_package))
        .route("/api/users", post(api::create_user))
        .route("/api/users/:id", get(api::get_user))
        .route("/api/packages", get(api::list_packages).post(api::create_package))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    // Public routes (no authentication)
    let public = Router::new().merge(api::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            mask_internal_errors,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Blank the message of 500 responses when masking is on
async fn mask_internal_errors(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;

    if state.mask_internal_errors && response.status() == StatusCode::INTERNAL_SERVER_ERROR {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("INTERNAL_ERROR", "Internal server error")),
        )
            .into_response();
    }

    response
}
