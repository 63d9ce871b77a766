//! Third-party sign-in endpoints.
//!
//! Start: GET `/{provider}` → CSRF state + PKCE verifier stored → 302 to the provider
//! Callback: GET `/{provider}/callback?code&state` → link or create account → cookie → 302 to landing

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{
        StatusCode,
        header::{LOCATION, SET_COOKIE},
    },
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::ApiError;
use crate::auth::{AuthError, AuthService, ClientIpHeader, ClientMeta, CookieSettings};
use crate::db::AuthProvider;
use crate::impl_has_auth_backend;
use crate::oauth::IdentityLinker;

#[derive(Clone)]
pub struct OAuthState {
    pub auth: AuthService,
    pub cookies: CookieSettings,
    pub ip_header: Option<ClientIpHeader>,
    pub linker: IdentityLinker,
    /// Where the browser lands after a successful sign-in
    pub landing_path: String,
    pub login_path: String,
}

impl_has_auth_backend!(OAuthState);

pub fn router(state: OAuthState) -> Router {
    Router::new()
        .route("/", get(list_providers))
        .route("/{provider}", get(start))
        .route("/{provider}/callback", get(callback))
        .with_state(state)
}

#[derive(Serialize)]
struct ProvidersResponse {
    providers: Vec<AuthProvider>,
}

#[derive(Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    /// Set by the provider when the user declines
    error: Option<String>,
}

fn redirect(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

/// Only third-party providers have a sign-in flow here.
fn parse_provider(name: &str) -> Result<AuthProvider, ApiError> {
    match AuthProvider::parse(name) {
        Some(AuthProvider::Credentials) | None => Err(ApiError::not_found("Unknown provider")),
        Some(kind) => Ok(kind),
    }
}

async fn list_providers(State(state): State<OAuthState>) -> Json<ProvidersResponse> {
    Json(ProvidersResponse {
        providers: state.linker.providers().enabled(),
    })
}

async fn start(
    State(state): State<OAuthState>,
    Path(provider): Path<String>,
) -> Result<Response, ApiError> {
    let kind = parse_provider(&provider)?;
    let url = state.linker.start(kind).await?;
    Ok(redirect(&url))
}

/// Finish a provider sign-in. Failures redirect back to the login page with a
/// generic error; the details are only logged.
async fn callback(
    State(state): State<OAuthState>,
    Path(provider): Path<String>,
    ClientMeta(meta): ClientMeta,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, ApiError> {
    let kind = parse_provider(&provider)?;
    let failed = format!("{}?error=oauth_failed", state.login_path);

    if let Some(error) = query.error {
        warn!(provider = kind.as_str(), error = %error, "Provider reported an error");
        return Ok(redirect(&failed));
    }

    let result = state
        .linker
        .complete_oauth(
            kind,
            query.code.as_deref().unwrap_or_default(),
            query.state.as_deref().unwrap_or_default(),
            &meta,
        )
        .await;

    match result {
        Ok(bundle) => Ok((
            StatusCode::FOUND,
            [
                (LOCATION, state.landing_path.clone()),
                (SET_COOKIE, state.cookies.session_cookie(&bundle.token)),
            ],
        )
            .into_response()),
        Err(AuthError::Unavailable) => Err(AuthError::Unavailable.into()),
        Err(e) => {
            warn!(provider = kind.as_str(), error = %e, "OAuth sign-in failed");
            Ok(redirect(&failed))
        }
    }
}
