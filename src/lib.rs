pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod oauth;
pub mod pages;
pub mod password;
pub mod rate_limit;

use api::create_api_router;
use auth::{AuthService, AuthSettings, ClientIpHeader, CookieSettings, GuardState, RouteTable, route_guard};
use axum::{Router, middleware};
use db::Database;
use jwt::{JwtConfig, JwtError};
use oauth::{IdentityLinker, OAuthProviders, ProviderError};
use pages::PagesState;
use rate_limit::RateLimitConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// JWT secret for signing tokens
    pub jwt_secret: Vec<u8>,
    /// Auth cookie attributes (Secure flag, domain)
    pub cookies: CookieSettings,
    pub auth: AuthSettings,
    /// IP extraction strategy (requires running behind a proxy)
    pub ip_header: Option<ClientIpHeader>,
    /// Page route classification for the guard
    pub routes: RouteTable,
    /// Enabled third-party sign-in providers
    pub providers: OAuthProviders,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid JWT configuration: {0}")]
    Jwt(#[from] JwtError),

    #[error("invalid OAuth configuration: {0}")]
    Provider(#[from] ProviderError),
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Result<Router, ConfigError> {
    let jwt = Arc::new(JwtConfig::new(&config.jwt_secret)?);
    let auth = AuthService::from_database(jwt, &config.db, config.auth.clone());

    let linker = IdentityLinker::new(
        auth.clone(),
        config.providers.clone(),
        config.db.oauth_states(),
    );

    let api_router = create_api_router(
        auth.clone(),
        linker,
        config.cookies.clone(),
        config.ip_header,
        Arc::new(RateLimitConfig::new(config.ip_header)),
        &config.routes,
    );

    let pages_router = pages::router(PagesState {
        auth: auth.clone(),
        cookies: config.cookies.clone(),
        ip_header: config.ip_header,
    });

    let guard_state = GuardState {
        auth,
        cookies: config.cookies.clone(),
        routes: Arc::new(config.routes.clone()),
    };

    // The guard wraps everything, including the 404 fallback, so unknown
    // paths under a protected prefix still require a session.
    Ok(Router::new()
        .nest("/api", api_router)
        .merge(pages_router)
        .fallback(pages::not_found)
        .layer(middleware::from_fn_with_state(guard_state, route_guard)))
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database) {
    cleanup::run_cleanup(db).await;
    cleanup::spawn_cleanup_scheduler(db.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(app: Router, listener: TcpListener) -> Result<(), std::io::Error> {
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}
