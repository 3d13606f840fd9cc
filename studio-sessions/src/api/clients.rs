//! Users, packages and client pricing endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use studio_common::db::{Package, User};
use studio_common::time;
use tracing::info;

use crate::api::auth::Principal;
use crate::api::extract::JsonBody;
use crate::db::packages::{self, NewPackage};
use crate::db::users::{self, NewUser};
use crate::error::{ApiError, ApiResult};
use crate::pricing::{resolve_pricing, PricingQuote, MAX_PRICE_CENTS};
use crate::session::Role;
use crate::AppState;

fn is_unique_violation(err: &studio_common::Error) -> bool {
    match err {
        studio_common::Error::Database(e) => e
            .as_database_error()
            .map(|d| d.is_unique_violation())
            .unwrap_or(false),
        _ => false,
    }
}

async fn require_client(state: &AppState, client_id: i64) -> ApiResult<User> {
    let user = users::get_user(&state.db, client_id).await?;
    if user.role != Role::Client.as_str() {
        return Err(ApiError::BadRequest(format!("User {} is not a client", client_id)));
    }
    Ok(user)
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub role: String,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub specialties: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub success: bool,
    pub user: User,
}

/// POST /api/users (admin)
pub async fn create_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    JsonBody(req): JsonBody<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    principal.require_admin()?;

    let role: Role = req.role.trim().parse()?;
    let first_name = req.first_name.trim().to_string();
    if first_name.is_empty() {
        return Err(ApiError::BadRequest("firstName is required".to_string()));
    }

    let new_user = NewUser {
        role,
        first_name,
        last_name: req.last_name.trim().to_string(),
        email: req.email.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty()),
        phone: req.phone,
        specialties: req.specialties,
    };

    let id = match users::insert_user(&state.db, &new_user).await {
        Ok(id) => id,
        Err(e) if is_unique_violation(&e) => {
            return Err(ApiError::Conflict("A user with this email already exists".to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    info!(user_id = id, role = %role, created_by = principal.user_id, "User created");

    let user = users::get_user(&state.db, id).await?;
    Ok((StatusCode::CREATED, Json(UserResponse { success: true, user })))
}

/// GET /api/users/:id (admin or self)
pub async fn get_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> ApiResult<Json<UserResponse>> {
    if !principal.is_admin() && principal.user_id != id {
        return Err(ApiError::Forbidden("Not authorized to view this user".to_string()));
    }
    let user = users::get_user(&state.db, id).await?;
    Ok(Json(UserResponse { success: true, user }))
}

// ============================================================================
// Packages
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageListResponse {
    pub success: bool,
    pub packages: Vec<Package>,
}

/// GET /api/packages
pub async fn list_packages(
    State(state): State<AppState>,
) -> ApiResult<Json<PackageListResponse>> {
    let packages = packages::list_packages(&state.db).await?;
    Ok(Json(PackageListResponse {
        success: true,
        packages,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePackageRequest {
    pub name: String,
    pub session_count: i64,
    pub price_per_session_cents: i64,
    #[serde(default)]
    pub is_special: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageResponse {
    pub success: bool,
    pub package: Package,
}

/// POST /api/packages (admin)
pub async fn create_package(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    JsonBody(req): JsonBody<CreatePackageRequest>,
) -> ApiResult<(StatusCode, Json<PackageResponse>)> {
    principal.require_admin()?;

    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest("name is required".to_string()));
    }
    if req.session_count <= 0 {
        return Err(ApiError::BadRequest("sessionCount must be positive".to_string()));
    }
    if !(0..=MAX_PRICE_CENTS).contains(&req.price_per_session_cents) {
        return Err(ApiError::BadRequest(format!(
            "pricePerSessionCents must be within 0..={}",
            MAX_PRICE_CENTS
        )));
    }

    let id = packages::insert_package(
        &state.db,
        &NewPackage {
            name,
            session_count: req.session_count,
            price_per_session_cents: req.price_per_session_cents,
            is_special: req.is_special,
        },
    )
    .await?;

    info!(package_id = id, created_by = principal.user_id, "Package created");

    let package = packages::fetch_package(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("Package {} vanished after insert", id)))?;
    Ok((StatusCode::CREATED, Json(PackageResponse { success: true, package })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantPackageRequest {
    pub package_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantPackageResponse {
    pub success: bool,
    pub client_package_id: i64,
    pub package: Package,
    pub available_sessions: i64,
}

/// POST /api/clients/:clientId/packages (admin)
///
/// Adds the package's sessions to the client's credits; the newest grant
/// becomes the active package used for pricing.
pub async fn grant_package(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(client_id): Path<i64>,
    JsonBody(req): JsonBody<GrantPackageRequest>,
) -> ApiResult<(StatusCode, Json<GrantPackageResponse>)> {
    principal.require_admin()?;
    require_client(&state, client_id).await?;

    let package = packages::fetch_package(&state.db, req.package_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Package {} not found", req.package_id)))?;

    let mut tx = state.db.begin().await?;
    let client_package_id =
        packages::grant_package(&mut *tx, client_id, package.id, time::now()).await?;
    users::add_credits(&mut *tx, client_id, package.session_count).await?;
    tx.commit().await?;

    let client = users::get_user(&state.db, client_id).await?;

    info!(
        client_id,
        package_id = package.id,
        credits_added = package.session_count,
        available_sessions = client.available_sessions,
        "Package granted"
    );

    Ok((
        StatusCode::CREATED,
        Json(GrantPackageResponse {
            success: true,
            client_package_id,
            package,
            available_sessions: client.available_sessions,
        }),
    ))
}

// ============================================================================
// Pricing
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PricingQuery {
    /// Session length for the fallback rate (minutes)
    #[serde(default = "default_duration")]
    pub duration: i64,
}

fn default_duration() -> i64 {
    60
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientPricingResponse {
    pub success: bool,
    pub pricing: PricingQuote,
}

/// GET /api/clients/:clientId/pricing?duration= (admin)
pub async fn client_pricing(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(client_id): Path<i64>,
    Query(query): Query<PricingQuery>,
) -> ApiResult<Json<ClientPricingResponse>> {
    principal.require_admin()?;
    if query.duration <= 0 {
        return Err(ApiError::BadRequest("duration must be positive".to_string()));
    }
    require_client(&state, client_id).await?;

    let pricing = resolve_pricing(&state.db, Some(client_id), query.duration).await?;
    Ok(Json(ClientPricingResponse {
        success: true,
        pricing,
    }))
}
