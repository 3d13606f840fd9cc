//! Integration tests for studio-sessions API endpoints
//!
//! Tests cover:
//! - Health endpoint (no auth required) and header authentication
//! - Cancellation with and without the silent flag
//! - Credit deduction on booking and restoration on early cancellation
//! - Admin listing of cancelled sessions filtered by decision
//! - Cancellation review: package-based pricing, 409 on re-review, role checks
//! - Malformed bodies, oversized prices and production error masking

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use studio_common::api::{sign_request, HASH_HEADER, TIMESTAMP_HEADER, USER_HEADER};
use studio_common::time::now_millis;
use studio_sessions::notify::{Audience, Notification, Notifier};
use studio_sessions::{build_router, AppState};
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot` method

const ADMIN: i64 = 1;
const TRAINER: i64 = 2;
const CLIENT: i64 = 3;
const BROKE_CLIENT: i64 = 4;
const OTHER_TRAINER: i64 = 5;

/// Records every notification instead of delivering it
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

struct TestApp {
    _dir: TempDir,
    db: SqlitePool,
    notifier: Arc<RecordingNotifier>,
    router: Router,
}

/// Test helper: fresh database with an admin, two trainers and two clients
async fn setup_app(shared_secret: i64, mask_internal_errors: bool) -> TestApp {
    let dir = TempDir::new().unwrap();
    let db = studio_common::db::init_database(&dir.path().join("studio.db"))
        .await
        .unwrap();

    for (id, role, first, email, credits) in [
        (ADMIN, "admin", "Alex", Some("admin@studio.test"), 0),
        (TRAINER, "trainer", "Taylor", Some("taylor@studio.test"), 0),
        (CLIENT, "client", "Casey", Some("casey@studio.test"), 5),
        (BROKE_CLIENT, "client", "Blake", Some("blake@studio.test"), 0),
        (OTHER_TRAINER, "trainer", "Morgan", None, 0),
    ] {
        sqlx::query(
            "INSERT INTO users (id, role, first_name, last_name, email, available_sessions)
             VALUES (?, ?, ?, 'Test', ?, ?)",
        )
        .bind(id)
        .bind(role)
        .bind(first)
        .bind(email)
        .bind(credits)
        .execute(&db)
        .await
        .unwrap();
    }

    let notifier = Arc::new(RecordingNotifier::default());
    let state = AppState::new(db.clone(), shared_secret, notifier.clone())
        .with_masked_errors(mask_internal_errors);

    TestApp {
        _dir: dir,
        db,
        notifier,
        router: build_router(state),
    }
}

async fn setup_with_secret(shared_secret: i64) -> TestApp {
    setup_app(shared_secret, false).await
}

/// Test helper: auth disabled (shared_secret = 0), user header still required
async fn setup() -> TestApp {
    setup_with_secret(0).await
}

/// Insert a session `hours_ahead` from now with the given status
async fn seed_session(db: &SqlitePool, status: &str, hours_ahead: i64, credit_deducted: bool) -> i64 {
    sqlx::query(
        "INSERT INTO sessions (session_date, duration, client_id, trainer_id, status, credit_deducted)
         VALUES (?, 60, ?, ?, ?, ?)",
    )
    .bind(Utc::now() + Duration::hours(hours_ahead))
    .bind(if status == "available" { None } else { Some(CLIENT) })
    .bind(TRAINER)
    .bind(status)
    .bind(credit_deducted)
    .execute(db)
    .await
    .unwrap()
    .last_insert_rowid()
}

async fn credits(db: &SqlitePool, user_id: i64) -> i64 {
    sqlx::query_scalar("SELECT available_sessions FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_one(db)
        .await
        .unwrap()
}

fn request(method: &str, uri: &str, user: Option<i64>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(USER_HEADER, user.to_string());
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &TestApp, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("Should parse JSON")
    };
    (status, body)
}

/// Request with a raw body and an optional content type
fn raw_request(method: &str, uri: &str, user: i64, content_type: Option<&str>, body: &'static str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(USER_HEADER, user.to_string());
    if let Some(ct) = content_type {
        builder = builder.header("content-type", ct);
    }
    builder.body(Body::from(body)).unwrap()
}

async fn session_status(db: &SqlitePool, id: i64) -> String {
    sqlx::query_scalar("SELECT status FROM sessions WHERE id = ?")
        .bind(id)
        .fetch_one(db)
        .await
        .unwrap()
}

async fn cancel(app: &TestApp, session_id: i64, user: i64, body: Value) -> (StatusCode, Value) {
    send(
        app,
        request(
            "PATCH",
            &format!("/api/sessions/{}/cancel", session_id),
            Some(user),
            Some(body),
        ),
    )
    .await
}

async fn review(app: &TestApp, session_id: i64, user: i64, body: Value) -> (StatusCode, Value) {
    send(
        app,
        request(
            "POST",
            &format!("/api/sessions/{}/charge-cancellation", session_id),
            Some(user),
            Some(body),
        ),
    )
    .await
}

/// Create a 10-pack at `price_cents` per session and grant it to CLIENT
async fn grant_ten_pack(app: &TestApp, price_cents: i64) {
    let (status, body) = send(
        app,
        request(
            "POST",
            "/api/packages",
            Some(ADMIN),
            Some(json!({"name": "10-Pack", "sessionCount": 10, "pricePerSessionCents": price_cents})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let package_id = body["package"]["id"].as_i64().unwrap();

    let (status, body) = send(
        app,
        request(
            "POST",
            &format!("/api/clients/{}/packages", CLIENT),
            Some(ADMIN),
            Some(json!({"packageId": package_id})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["availableSessions"], 15);
}

// =============================================================================
// Health & authentication
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_no_auth_required() {
    let app = setup().await;

    let (status, body) = send(&app, request("GET", "/health", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "studio-sessions");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_missing_user_header_is_unauthorized() {
    let app = setup().await;

    let (status, body) = send(&app, request("GET", "/api/sessions", None, None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_unknown_user_is_unauthorized() {
    let app = setup().await;
    let (status, _) = send(&app, request("GET", "/api/sessions", Some(999), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signed_request_accepted_and_bad_hash_rejected() {
    let secret = 987_654_321;
    let app = setup_with_secret(secret).await;

    let timestamp = now_millis();
    let signed = Request::builder()
        .method("GET")
        .uri("/api/packages")
        .header(USER_HEADER, ADMIN.to_string())
        .header(TIMESTAMP_HEADER, timestamp.to_string())
        .header(HASH_HEADER, sign_request(ADMIN, timestamp, secret))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, signed).await;
    assert_eq!(status, StatusCode::OK);

    let timestamp = now_millis();
    let forged = Request::builder()
        .method("GET")
        .uri("/api/packages")
        .header(USER_HEADER, ADMIN.to_string())
        .header(TIMESTAMP_HEADER, timestamp.to_string())
        .header(HASH_HEADER, sign_request(ADMIN, timestamp, secret + 1))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, forged).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // No hash at all
    let (status, _) = send(&app, request("GET", "/api/packages", Some(ADMIN), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Silent cancellation gate
// =============================================================================

#[tokio::test]
async fn test_silent_cancel_session_one_sends_nothing() {
    let app = setup().await;
    let id = seed_session(&app.db, "scheduled", 72, true).await;
    assert_eq!(id, 1);

    let (status, body) = cancel(&app, 1, ADMIN, json!({"silent": true, "reason": "Studio closed"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["sessionId"], 1);
    assert_eq!(body["status"], "cancelled");
    assert_eq!(body["silentMode"], true);
    assert_eq!(body["cancellationDecision"], "pending");
    assert_eq!(body["cancellationReason"], "Studio closed");
    assert_eq!(body["notificationsSent"]["client"], false);
    assert_eq!(body["notificationsSent"]["trainer"], false);
    assert!(app.notifier.sent().is_empty());

    let silent: bool = sqlx::query_scalar("SELECT silent_cancellation FROM sessions WHERE id = 1")
        .fetch_one(&app.db)
        .await
        .unwrap();
    assert!(silent);
}

#[tokio::test]
async fn test_normal_cancel_notifies_client_and_trainer() {
    let app = setup().await;
    let id = seed_session(&app.db, "confirmed", 72, true).await;

    let (status, body) = cancel(&app, id, ADMIN, json!({"reason": "Trainer sick"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["silentMode"], false);
    assert_eq!(body["notificationsSent"]["client"], true);
    assert_eq!(body["notificationsSent"]["trainer"], true);

    let sent = app.notifier.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().any(|n| n.audience == Audience::Client && n.user_id == CLIENT));
    assert!(sent.iter().any(|n| n.audience == Audience::Trainer && n.user_id == TRAINER));
}

#[tokio::test]
async fn test_client_cannot_cancel_silently_and_is_not_notified_of_own_action() {
    let app = setup().await;
    let id = seed_session(&app.db, "scheduled", 72, true).await;

    let (status, body) = cancel(&app, id, CLIENT, json!({"silent": true})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["silentMode"], false);
    assert_eq!(body["notificationsSent"]["client"], false);
    assert_eq!(body["notificationsSent"]["trainer"], true);

    let sent = app.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].user_id, TRAINER);
}

#[tokio::test]
async fn test_cancel_permissions_and_status_rules() {
    let app = setup().await;
    let id = seed_session(&app.db, "scheduled", 72, false).await;

    // Unrelated trainer and another client may not cancel
    let (status, _) = cancel(&app, id, OTHER_TRAINER, json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = cancel(&app, id, BROKE_CLIENT, json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = cancel(&app, id, TRAINER, json!({})).await;
    assert_eq!(status, StatusCode::OK);

    // Already cancelled
    let (status, _) = cancel(&app, id, ADMIN, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = cancel(&app, 404, ADMIN, json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Credits
// =============================================================================

#[tokio::test]
async fn test_booking_consumes_credit_and_early_cancel_restores_it() {
    let app = setup().await;
    let id = seed_session(&app.db, "available", 72, false).await;

    let (status, body) = send(
        &app,
        request("POST", &format!("/api/sessions/{}/book", id), Some(CLIENT), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["status"], "scheduled");
    assert_eq!(body["session"]["creditDeducted"], true);
    assert_eq!(credits(&app.db, CLIENT).await, 4);

    let (status, body) = cancel(&app, id, CLIENT, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isLateCancellation"], false);
    assert_eq!(body["creditRestored"], true);
    assert_eq!(body["cancellationReason"], "No reason provided");
    assert_eq!(credits(&app.db, CLIENT).await, 5);
}

#[tokio::test]
async fn test_booking_with_zero_credits_is_rejected() {
    let app = setup().await;
    let id = seed_session(&app.db, "available", 72, false).await;

    let (status, body) = send(
        &app,
        request("POST", &format!("/api/sessions/{}/book", id), Some(BROKE_CLIENT), None),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BAD_REQUEST");
    assert_eq!(credits(&app.db, BROKE_CLIENT).await, 0);

    assert_eq!(session_status(&app.db, id).await, "available");
}

#[tokio::test]
async fn test_late_cancel_keeps_credit() {
    let app = setup().await;
    let id = seed_session(&app.db, "scheduled", 2, true).await;

    let (status, body) = cancel(&app, id, CLIENT, json!({})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isLateCancellation"], true);
    assert_eq!(body["creditRestored"], false);
    assert_eq!(body["cancellationReason"], "Late cancellation");
    assert_eq!(credits(&app.db, CLIENT).await, 5);
}

#[tokio::test]
async fn test_lifecycle_request_book_confirm_complete() {
    let app = setup().await;
    let id = seed_session(&app.db, "available", 72, false).await;

    let (status, body) = send(
        &app,
        request("POST", &format!("/api/sessions/{}/request", id), Some(CLIENT), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["status"], "requested");

    // Confirming before booking skips a state
    let (status, _) = send(
        &app,
        request("PUT", &format!("/api/sessions/{}/confirm", id), Some(TRAINER), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        request("POST", &format!("/api/sessions/{}/book", id), Some(ADMIN), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(credits(&app.db, CLIENT).await, 4);

    let (status, _) = send(
        &app,
        request("PUT", &format!("/api/sessions/{}/confirm", id), Some(OTHER_TRAINER), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        request("PUT", &format!("/api/sessions/{}/confirm", id), Some(TRAINER), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["status"], "confirmed");

    let (status, body) = send(
        &app,
        request("PUT", &format!("/api/sessions/{}/complete", id), Some(TRAINER), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["status"], "completed");

    // Completed sessions cannot be cancelled
    let (status, _) = cancel(&app, id, ADMIN, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Admin listing
// =============================================================================

#[tokio::test]
async fn test_admin_cancelled_filters_by_decision() {
    let app = setup().await;
    let charged = seed_session(&app.db, "scheduled", 2, false).await;
    let waived = seed_session(&app.db, "scheduled", 2, false).await;
    let pending = seed_session(&app.db, "scheduled", 2, false).await;
    seed_session(&app.db, "scheduled", 2, false).await;

    for id in [charged, waived, pending] {
        let (status, _) = cancel(&app, id, ADMIN, json!({"silent": true})).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = review(&app, charged, ADMIN, json!({"decision": "charged", "reason": "Late"})).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = review(&app, waived, ADMIN, json!({"decision": "waived", "reason": "Illness"})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        request("GET", "/api/sessions/admin/cancelled?decisionStatus=charged", Some(ADMIN), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let sessions = body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["id"], charged);
    assert_eq!(sessions[0]["cancellationDecision"], "charged");
    assert_eq!(sessions[0]["reviewer"]["id"], ADMIN);
    assert_eq!(sessions[0]["reviewer"]["name"], "Alex Test");
    assert_eq!(sessions[0]["clientName"], "Casey Test");
    assert_eq!(sessions[0]["isLateCancellation"], true);

    let (_, body) = send(
        &app,
        request("GET", "/api/sessions/admin/cancelled?decisionStatus=pending", Some(ADMIN), None),
    )
    .await;
    let sessions = body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["id"], pending);
    assert!(sessions[0]["reviewer"].is_null());

    // No filter: every cancelled session, nothing else
    let (_, body) = send(
        &app,
        request("GET", "/api/sessions/admin/cancelled", Some(ADMIN), None),
    )
    .await;
    assert_eq!(body["sessions"].as_array().unwrap().len(), 3);
    assert_eq!(body["pagination"]["totalResults"], 3);
}

#[tokio::test]
async fn test_admin_cancelled_rejects_bad_filter_and_non_admins() {
    let app = setup().await;

    let (status, _) = send(
        &app,
        request("GET", "/api/sessions/admin/cancelled?decisionStatus=refunded", Some(ADMIN), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        request("GET", "/api/sessions/admin/cancelled", Some(TRAINER), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// =============================================================================
// Review & pricing
// =============================================================================

#[tokio::test]
async fn test_charge_uses_active_package_price() {
    let app = setup().await;
    grant_ten_pack(&app, 12000).await;

    let full = seed_session(&app.db, "scheduled", 2, false).await;
    let late = seed_session(&app.db, "scheduled", 2, false).await;
    for id in [full, late] {
        cancel(&app, id, ADMIN, json!({})).await;
    }

    let (status, body) = send(
        &app,
        request("GET", &format!("/api/sessions/{}/client-package-price", full), Some(ADMIN), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pricing"]["source"], "package");
    assert_eq!(body["pricing"]["pricePerSessionCents"], 12000);
    assert_eq!(body["pricing"]["packageName"], "10-Pack");
    assert_eq!(body["pricing"]["requiresAdminReview"], false);

    let (status, body) = review(
        &app,
        full,
        ADMIN,
        json!({"decision": "charged", "reason": "No show", "chargeType": "full"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chargeType"], "full");
    assert_eq!(body["chargeAmountCents"], 12000);
    assert_eq!(body["session"]["cancellationChargeCents"], 12000);
    assert_eq!(body["session"]["cancellationReviewedBy"], ADMIN);

    let (status, body) = review(&app, late, ADMIN, json!({"decision": "charged", "reason": "Late"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chargeType"], "late_fee");
    assert_eq!(body["chargeAmountCents"], 6000);
}

#[tokio::test]
async fn test_fallback_pricing_without_package() {
    let app = setup().await;

    let (status, body) = send(
        &app,
        request("GET", &format!("/api/clients/{}/pricing", CLIENT), Some(ADMIN), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pricing"]["source"], "fallback");
    assert!(body["pricing"]["pricePerSessionCents"].is_null());
    assert_eq!(body["pricing"]["defaultChargeCents"], 17500);
    assert_eq!(body["pricing"]["requiresAdminReview"], true);

    // Fallback follows the settings table
    studio_common::db::settings::set_setting(&app.db, "pricing_short_rate_cents", "9000")
        .await
        .unwrap();
    let (_, body) = send(
        &app,
        request("GET", &format!("/api/clients/{}/pricing?duration=30", CLIENT), Some(ADMIN), None),
    )
    .await;
    assert_eq!(body["pricing"]["defaultChargeCents"], 9000);
    assert_eq!(body["pricing"]["lateFeeCents"], 4500);
}

#[tokio::test]
async fn test_second_review_conflicts() {
    let app = setup().await;
    let id = seed_session(&app.db, "scheduled", 2, false).await;
    cancel(&app, id, ADMIN, json!({})).await;

    let (status, _) = review(&app, id, ADMIN, json!({"decision": "waived", "reason": "First visit"})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = review(&app, id, ADMIN, json!({"decision": "charged", "reason": "Changed mind"})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "CONFLICT");

    let decision: String =
        sqlx::query_scalar("SELECT cancellation_decision FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_one(&app.db)
            .await
            .unwrap();
    assert_eq!(decision, "waived");
}

#[tokio::test]
async fn test_review_validation_and_roles() {
    let app = setup().await;
    let id = seed_session(&app.db, "scheduled", 2, false).await;

    // Not cancelled yet
    let (status, _) = review(&app, id, ADMIN, json!({"decision": "charged", "reason": "x"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    cancel(&app, id, ADMIN, json!({})).await;

    let (status, _) = review(&app, id, TRAINER, json!({"decision": "charged", "reason": "x"})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = review(&app, id, CLIENT, json!({"decision": "waived", "reason": "x"})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = review(&app, id, ADMIN, json!({"decision": "maybe", "reason": "x"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = review(&app, id, ADMIN, json!({"decision": "waived", "reason": ""})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = review(&app, 999, ADMIN, json!({"decision": "charged", "reason": "x"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Still pending after the rejected attempts
    let (status, body) = review(&app, id, ADMIN, json!({"decision": "waived", "reason": "Illness"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chargeType"], "none");
    assert_eq!(body["chargeAmountCents"], 0);
    assert_eq!(body["notificationSent"], false);
}

#[tokio::test]
async fn test_charge_notice_follows_silent_gate() {
    let app = setup().await;
    let silent = seed_session(&app.db, "scheduled", 2, false).await;
    let notified = seed_session(&app.db, "scheduled", 2, false).await;

    cancel(&app, silent, TRAINER, json!({"silent": true})).await;
    let (_, body) = review(&app, silent, ADMIN, json!({"decision": "charged", "reason": "Late"})).await;
    assert_eq!(body["notificationSent"], false);
    assert!(app.notifier.sent().is_empty());

    cancel(&app, notified, ADMIN, json!({})).await;
    let before = app.notifier.sent().len();
    let (status, body) = review(
        &app,
        notified,
        ADMIN,
        json!({"decision": "charged", "reason": "Late", "chargeAmountCents": 2500}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chargeAmountCents"], 2500);
    assert_eq!(body["notificationSent"], true);

    let sent = app.notifier.sent();
    assert_eq!(sent.len(), before + 1);
    assert_eq!(sent[before].user_id, CLIENT);
    assert!(sent[before].body.contains("$25.00"));
}

#[tokio::test]
async fn test_admin_cancelled_filters_by_cancellation_date_range() {
    let app = setup().await;
    let mut ids = Vec::new();
    for cancelled_on in ["2026-01-10T12:00:00Z", "2026-02-10T12:00:00Z", "2026-03-10T12:00:00Z"] {
        let id = seed_session(&app.db, "scheduled", 72, false).await;
        cancel(&app, id, ADMIN, json!({"silent": true})).await;
        let at: chrono::DateTime<Utc> = cancelled_on.parse().unwrap();
        sqlx::query("UPDATE sessions SET cancellation_date = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(&app.db)
            .await
            .unwrap();
        ids.push(id);
    }

    let (status, body) = send(
        &app,
        request(
            "GET",
            "/api/sessions/admin/cancelled?startDate=2026-02-01T00:00:00Z&endDate=2026-02-28T23:59:59Z",
            Some(ADMIN),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let sessions = body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["id"], ids[1]);
    assert_eq!(body["pagination"]["totalResults"], 1);

    // Open-ended lower bound, combined with the decision filter
    let (_, body) = send(
        &app,
        request(
            "GET",
            "/api/sessions/admin/cancelled?decisionStatus=pending&startDate=2026-02-01T00:00:00Z",
            Some(ADMIN),
            None,
        ),
    )
    .await;
    let listed: Vec<i64> = body["sessions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_i64().unwrap())
        .collect();
    assert_eq!(listed, vec![ids[2], ids[1]]);

    for query in [
        "startDate=last-week",
        "startDate=2026-03-01T00:00:00Z&endDate=2026-02-01T00:00:00Z",
    ] {
        let (status, body) = send(
            &app,
            request("GET", &format!("/api/sessions/admin/cancelled?{}", query), Some(ADMIN), None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", query);
        assert_eq!(body["error"], "BAD_REQUEST");
    }
}

// =============================================================================
// Request bodies
// =============================================================================

#[tokio::test]
async fn test_cancel_body_that_does_not_parse_cancels_nothing() {
    let app = setup().await;
    let id = seed_session(&app.db, "scheduled", 72, true).await;
    let uri = format!("/api/sessions/{}/cancel", id);

    // JSON without a content type
    let (status, body) = send(&app, raw_request("PATCH", &uri, TRAINER, None, r#"{"silent":true}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "BAD_REQUEST");

    // Wrongly typed silent flag
    let (status, body) = send(
        &app,
        raw_request("PATCH", &uri, ADMIN, Some("application/json"), r#"{"silent":"true"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BAD_REQUEST");

    let (status, _) = send(
        &app,
        raw_request("PATCH", &uri, ADMIN, Some("application/json"), "{not json"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(app.notifier.sent().is_empty());
    assert_eq!(session_status(&app.db, id).await, "scheduled");

    // An empty body is still a plain cancellation
    let (status, body) = send(&app, raw_request("PATCH", &uri, TRAINER, None, "")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["silentMode"], false);
}

#[tokio::test]
async fn test_book_body_that_does_not_parse_is_rejected() {
    let app = setup().await;
    let id = seed_session(&app.db, "available", 72, false).await;
    let uri = format!("/api/sessions/{}/book", id);

    let (status, body) = send(
        &app,
        raw_request("POST", &uri, ADMIN, Some("application/json"), r#"{"clientId":"three"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BAD_REQUEST");

    let (status, _) = send(&app, raw_request("POST", &uri, CLIENT, None, r#"{"clientId":3}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(session_status(&app.db, id).await, "available");
    assert_eq!(credits(&app.db, CLIENT).await, 5);
}

#[tokio::test]
async fn test_required_body_errors_use_error_envelope() {
    let app = setup().await;
    let id = seed_session(&app.db, "scheduled", 2, false).await;
    cancel(&app, id, ADMIN, json!({})).await;

    let (status, body) = review(&app, id, ADMIN, json!({"reason": "x"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "BAD_REQUEST");
    assert!(body["message"].as_str().unwrap().contains("decision"));

    let (status, body) = send(
        &app,
        raw_request("POST", "/api/packages", ADMIN, Some("application/json"), r#"{"name":"Solo"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BAD_REQUEST");

    // Missing content type on a required body
    let (status, body) = send(
        &app,
        raw_request(
            "POST",
            &format!("/api/sessions/{}/charge-cancellation", id),
            ADMIN,
            None,
            r#"{"decision":"waived","reason":"x"}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BAD_REQUEST");
}

// =============================================================================
// Price bounds
// =============================================================================

#[tokio::test]
async fn test_oversized_prices_are_rejected_without_overflow() {
    let app = setup().await;

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/api/packages",
            Some(ADMIN),
            Some(json!({"name": "Gold", "sessionCount": 10, "pricePerSessionCents": 10_000_001})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // A stored price too large to multiply
    let package_id = sqlx::query(
        "INSERT INTO packages (name, session_count, price_per_session_cents) VALUES ('Legacy', 10, ?)",
    )
    .bind(i64::MAX / 10)
    .execute(&app.db)
    .await
    .unwrap()
    .last_insert_rowid();
    sqlx::query("INSERT INTO client_packages (client_id, package_id, purchased_at) VALUES (?, ?, ?)")
        .bind(CLIENT)
        .bind(package_id)
        .bind(Utc::now())
        .execute(&app.db)
        .await
        .unwrap();

    let id = seed_session(&app.db, "scheduled", 2, false).await;
    let (status, body) = send(
        &app,
        request("GET", &format!("/api/sessions/{}/client-package-price", id), Some(ADMIN), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BAD_REQUEST");

    cancel(&app, id, ADMIN, json!({})).await;
    let (status, _) = review(&app, id, ADMIN, json!({"decision": "charged", "reason": "Late"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = review(
        &app,
        id,
        ADMIN,
        json!({"decision": "charged", "reason": "Late", "chargeAmountCents": 10_000_001}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let pending: String = sqlx::query_scalar("SELECT cancellation_decision FROM sessions WHERE id = ?")
        .bind(id)
        .fetch_one(&app.db)
        .await
        .unwrap();
    assert_eq!(pending, "pending");
}

// =============================================================================
// Cancel warning & credit override
// =============================================================================

#[tokio::test]
async fn test_cancel_warning_reports_late_fee_and_credit() {
    let app = setup().await;
    grant_ten_pack(&app, 12000).await;
    let late = seed_session(&app.db, "scheduled", 2, true).await;
    let early = seed_session(&app.db, "scheduled", 72, true).await;

    let (status, body) = send(
        &app,
        request("GET", &format!("/api/sessions/{}/cancel-warning", late), Some(CLIENT), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isLateCancellation"], true);
    assert_eq!(body["creditWouldBeRestored"], false);
    assert_eq!(body["lateCancelWindowHours"], 24);
    assert_eq!(body["estimatedFeeCents"], body["pricing"]["lateFeeCents"]);
    assert_eq!(body["estimatedFeeCents"], 6000);

    let (status, body) = send(
        &app,
        request("GET", &format!("/api/sessions/{}/cancel-warning", early), Some(TRAINER), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isLateCancellation"], false);
    assert_eq!(body["creditWouldBeRestored"], true);
    assert_eq!(body["estimatedFeeCents"], 0);

    let (status, _) = send(
        &app,
        request("GET", &format!("/api/sessions/{}/cancel-warning", early), Some(OTHER_TRAINER), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Warning has no side effects
    assert_eq!(session_status(&app.db, late).await, "scheduled");
    assert!(app.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_restore_credit_override_is_staff_only() {
    let app = setup().await;
    let kept = seed_session(&app.db, "scheduled", 72, true).await;
    let restored = seed_session(&app.db, "scheduled", 72, true).await;
    let late = seed_session(&app.db, "scheduled", 2, true).await;

    let (status, body) = cancel(&app, kept, TRAINER, json!({"restoreCredit": false})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["creditRestored"], false);
    assert_eq!(credits(&app.db, CLIENT).await, 5);

    let (status, body) = cancel(&app, restored, CLIENT, json!({"restoreCredit": false})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["creditRestored"], true);
    assert_eq!(credits(&app.db, CLIENT).await, 6);

    let (status, body) = cancel(&app, late, ADMIN, json!({"restoreCredit": true})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isLateCancellation"], true);
    assert_eq!(body["creditRestored"], true);
    assert_eq!(credits(&app.db, CLIENT).await, 7);
}

// =============================================================================
// Internal error masking
// =============================================================================

#[tokio::test]
async fn test_internal_error_message_masked_only_when_enabled() {
    for mask in [false, true] {
        let app = setup_app(0, mask).await;
        studio_common::db::settings::set_setting(&app.db, "late_fee_percent", "half")
            .await
            .unwrap();

        let (status, body) = send(
            &app,
            request("GET", &format!("/api/clients/{}/pricing", CLIENT), Some(ADMIN), None),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "INTERNAL_ERROR");
        let message = body["message"].as_str().unwrap();
        if mask {
            assert_eq!(message, "Internal server error");
        } else {
            assert!(message.contains("late_fee_percent"), "{}", message);
        }
    }
}
