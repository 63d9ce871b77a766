//! Session management for the signed-in user.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
};
use serde::Serialize;

use super::error::ApiError;
use crate::auth::{Auth, AuthService, ClientIpHeader, CookieSettings};
use crate::impl_has_auth_backend;

#[derive(Clone)]
pub struct SessionsState {
    pub auth: AuthService,
    pub cookies: CookieSettings,
    pub ip_header: Option<ClientIpHeader>,
}

impl_has_auth_backend!(SessionsState);

pub fn router(state: SessionsState) -> Router {
    Router::new()
        .route("/", get(list_sessions))
        .route("/{id}", delete(revoke_session))
        .with_state(state)
}

#[derive(Serialize)]
struct SessionInfo {
    id: i64,
    user_agent: Option<String>,
    ip_address: Option<String>,
    created_at: i64,
    last_used_at: i64,
    expires_at: i64,
    is_current: bool,
}

#[derive(Serialize)]
struct ListSessionsResponse {
    sessions: Vec<SessionInfo>,
}

/// List the caller's active sessions, marking the one making this request.
async fn list_sessions(
    State(state): State<SessionsState>,
    auth: Auth,
) -> Result<impl IntoResponse, ApiError> {
    let current = auth.user().session_id;
    let sessions = state
        .auth
        .list_sessions(auth.user())
        .await?
        .into_iter()
        .map(|s| SessionInfo {
            id: s.id,
            user_agent: s.user_agent,
            ip_address: s.ip_address,
            created_at: s.created_at,
            last_used_at: s.updated_at,
            expires_at: s.expires_at,
            is_current: s.id == current,
        })
        .collect();

    Ok(Json(ListSessionsResponse { sessions }))
}

/// Revoke a session by ID. Revoking the current session signs this client out.
async fn revoke_session(
    State(state): State<SessionsState>,
    auth: Auth,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.revoke_session(auth.user(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
