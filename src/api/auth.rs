//! Password authentication and token lifecycle endpoints.
//!
//! Register/login: POST `/register` or `/login` → session row + JWT → `auth_token` cookie
//! Refresh: POST `/refresh` swaps an expired token of a live session for a new one
//! Logout: POST `/logout` revokes the presented session and clears the cookie

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::ApiError;
use crate::auth::{
    ApiAuthError, Auth, AuthError, AuthService, AuthenticatedUser, ClientIpHeader, ClientMeta,
    CookieSettings, SessionBundle, extract_token,
};
use crate::db::UserSummary;
use crate::impl_has_auth_backend;
use crate::rate_limit::{RateLimitConfig, rate_limit_login, rate_limit_register};

#[derive(Clone)]
pub struct AuthState {
    pub auth: AuthService,
    pub cookies: CookieSettings,
    pub ip_header: Option<ClientIpHeader>,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

impl_has_auth_backend!(AuthState);

pub fn router(state: AuthState) -> Router {
    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_login,
        ));

    let register_router = Router::new()
        .route("/register", post(register))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_register,
        ));

    Router::new()
        .route("/logout", post(logout))
        .route("/refresh", post(refresh))
        .route("/me", get(me))
        .route("/password", post(change_password))
        .with_state(state)
        .merge(login_router)
        .merge(register_router)
}

#[derive(Deserialize)]
struct RegisterRequest {
    email: String,
    password: String,
    name: Option<String>,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct SessionResponse {
    user: AuthenticatedUser,
    token: String,
    expires_at: i64,
}

#[derive(Serialize)]
struct PendingVerificationResponse {
    user: UserSummary,
    verification_required: bool,
}

#[derive(Serialize)]
struct RefreshResponse {
    token: String,
    expires_at: i64,
    refreshed: bool,
}

#[derive(Deserialize)]
struct ChangePasswordRequest {
    current_password: String,
    new_password: String,
}

#[derive(Serialize)]
struct ChangePasswordResponse {
    revoked_sessions: u64,
}

fn session_response(status: StatusCode, cookies: &CookieSettings, bundle: SessionBundle) -> Response {
    let cookie = cookies.session_cookie(&bundle.token);
    (
        status,
        [(SET_COOKIE, cookie)],
        Json(SessionResponse {
            user: bundle.user,
            token: bundle.token,
            expires_at: bundle.expires_at,
        }),
    )
        .into_response()
}

/// Create a credentials account. Signs the new user in unless email
/// verification is required.
async fn register(
    State(state): State<AuthState>,
    ClientMeta(meta): ClientMeta,
    Json(payload): Json<RegisterRequest>,
) -> Result<Response, ApiError> {
    let registration = state
        .auth
        .register(
            &payload.email,
            &payload.password,
            payload.name.as_deref(),
            &meta,
        )
        .await?;

    Ok(match registration.session {
        Some(bundle) => session_response(StatusCode::CREATED, &state.cookies, bundle),
        None => (
            StatusCode::CREATED,
            Json(PendingVerificationResponse {
                user: UserSummary::from(registration.user),
                verification_required: true,
            }),
        )
            .into_response(),
    })
}

async fn login(
    State(state): State<AuthState>,
    ClientMeta(meta): ClientMeta,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let bundle = state
        .auth
        .login(&payload.email, &payload.password, &meta)
        .await?;

    Ok(session_response(StatusCode::OK, &state.cookies, bundle))
}

/// Revoke the presented session and clear the cookie.
/// Succeeds with no, garbage or unknown tokens. A store outage is a 503, since
/// the session would still be live.
async fn logout(
    State(state): State<AuthState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(token) = extract_token(&headers) {
        state.auth.logout(token).await.map_err(|e| {
            warn!(error = %e, "Logout could not revoke session");
            ApiError::from(e)
        })?;
    }

    Ok((
        StatusCode::OK,
        [(SET_COOKIE, state.cookies.clear_cookie())],
        Json(serde_json::json!({ "success": true })),
    ))
}

/// Exchange the presented token for a current one.
async fn refresh(
    State(state): State<AuthState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiAuthError> {
    let token = extract_token(&headers)
        .ok_or_else(|| ApiAuthError::new(AuthError::Unauthenticated, &state.cookies))?;

    let refreshed = state
        .auth
        .refresh(token)
        .await
        .map_err(|e| ApiAuthError::new(e, &state.cookies))?;

    Ok((
        StatusCode::OK,
        [(SET_COOKIE, state.cookies.session_cookie(&refreshed.token))],
        Json(RefreshResponse {
            token: refreshed.token,
            expires_at: refreshed.expires_at,
            refreshed: refreshed.refreshed,
        }),
    ))
}

async fn me(auth: Auth) -> Json<AuthenticatedUser> {
    Json(auth.0)
}

async fn change_password(
    State(state): State<AuthState>,
    auth: Auth,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let revoked_sessions = state
        .auth
        .change_password(auth.user(), &payload.current_password, &payload.new_password)
        .await?;

    Ok(Json(ChangePasswordResponse { revoked_sessions }))
}
