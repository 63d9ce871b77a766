//! Admin-only endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, put},
};
use serde::Deserialize;

use super::error::{ApiError, validate_uuid};
use crate::auth::{AdminOnly, Auth, AuthService, ClientIpHeader, CookieSettings};
use crate::db::UserRole;
use crate::impl_has_auth_backend;

#[derive(Clone)]
pub struct AdminState {
    pub auth: AuthService,
    pub cookies: CookieSettings,
    pub ip_header: Option<ClientIpHeader>,
}

impl_has_auth_backend!(AdminState);

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/{uuid}/role", put(set_role))
        .route("/users/{uuid}/active", put(set_active))
        .with_state(state)
}

#[derive(Deserialize)]
struct SetRoleRequest {
    role: String,
}

#[derive(Deserialize)]
struct SetActiveRequest {
    active: bool,
}

/// List all users.
async fn list_users(
    State(state): State<AdminState>,
    _auth: Auth<AdminOnly>,
) -> Result<impl IntoResponse, ApiError> {
    let users = state.auth.list_users().await?;
    Ok(Json(users))
}

async fn set_role(
    State(state): State<AdminState>,
    auth: Auth<AdminOnly>,
    Path(uuid): Path<String>,
    Json(payload): Json<SetRoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_uuid(&uuid)?;
    let role = match payload.role.as_str() {
        "admin" => UserRole::Admin,
        "user" => UserRole::User,
        _ => return Err(ApiError::bad_request("Role must be 'user' or 'admin'")),
    };

    let user = state.auth.set_user_role(auth.user(), &uuid, role).await?;
    Ok(Json(user))
}

/// Activate or deactivate an account. Deactivation signs the user out everywhere.
async fn set_active(
    State(state): State<AdminState>,
    auth: Auth<AdminOnly>,
    Path(uuid): Path<String>,
    Json(payload): Json<SetActiveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_uuid(&uuid)?;
    let user = state
        .auth
        .set_user_active(auth.user(), &uuid, payload.active)
        .await?;
    Ok(Json(user))
}
