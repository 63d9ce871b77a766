mod admin;
mod auth;
mod error;
mod oauth;
mod sessions;

use axum::Router;
use std::sync::Arc;

use crate::auth::{AuthService, ClientIpHeader, CookieSettings, RouteTable};
use crate::oauth::IdentityLinker;
use crate::rate_limit::RateLimitConfig;

/// Create the API router.
pub fn create_api_router(
    auth: AuthService,
    linker: IdentityLinker,
    cookies: CookieSettings,
    ip_header: Option<ClientIpHeader>,
    rate_limit_config: Arc<RateLimitConfig>,
    routes: &RouteTable,
) -> Router {
    let auth_state = auth::AuthState {
        auth: auth.clone(),
        cookies: cookies.clone(),
        ip_header,
        rate_limit_config,
    };

    let sessions_state = sessions::SessionsState {
        auth: auth.clone(),
        cookies: cookies.clone(),
        ip_header,
    };

    let oauth_state = oauth::OAuthState {
        auth: auth.clone(),
        cookies: cookies.clone(),
        ip_header,
        linker,
        landing_path: routes.landing_path.clone(),
        login_path: routes.login_path.clone(),
    };

    let admin_state = admin::AdminState {
        auth,
        cookies,
        ip_header,
    };

    let auth_router = auth::router(auth_state)
        .nest("/sessions", sessions::router(sessions_state))
        .nest("/oauth", oauth::router(oauth_state));

    Router::new()
        .nest("/auth", auth_router)
        .nest("/admin", admin::router(admin_state))
}
