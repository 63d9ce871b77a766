//! Minimal server-rendered pages behind the route guard.
//!
//! They only demonstrate guarding: the guard has already redirected anyone
//! who may not see a page, and resolved the caller into a request extension.

use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
};

use crate::auth::{AuthService, ClientIpHeader, CookieSettings, OptionalAuth};
use crate::impl_has_auth_backend;

#[derive(Clone)]
pub struct PagesState {
    pub auth: AuthService,
    pub cookies: CookieSettings,
    pub ip_header: Option<ClientIpHeader>,
}

impl_has_auth_backend!(PagesState);

pub fn router(state: PagesState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/login", get(login))
        .route("/register", get(register))
        .route("/unauthorized", get(unauthorized))
        .route("/dashboard", get(dashboard))
        .route("/profile", get(profile))
        .route("/admin", get(admin))
        .with_state(state)
}

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{title}</title></head><body><h1>{title}</h1>{body}</body></html>"
    ))
}

/// Minimal HTML escaping for user-controlled text.
fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

async fn home(OptionalAuth(user): OptionalAuth) -> impl IntoResponse {
    match user {
        Some(user) => page(
            "Welcome",
            &format!("<p>Signed in as {}</p>", escape(&user.email)),
        ),
        None => page("Welcome", "<p><a href=\"/login\">Sign in</a></p>"),
    }
}

async fn login() -> impl IntoResponse {
    page("Sign in", "<form method=\"post\" action=\"/api/auth/login\"></form>")
}

async fn register() -> impl IntoResponse {
    page(
        "Create account",
        "<form method=\"post\" action=\"/api/auth/register\"></form>",
    )
}

async fn unauthorized() -> impl IntoResponse {
    page("Unauthorized", "<p>You do not have access to this page.</p>")
}

async fn dashboard(OptionalAuth(user): OptionalAuth) -> impl IntoResponse {
    let name = user.map(|u| escape(&u.name)).unwrap_or_default();
    page("Dashboard", &format!("<p>Hello {}</p>", name))
}

async fn profile(OptionalAuth(user): OptionalAuth) -> impl IntoResponse {
    let email = user.map(|u| escape(&u.email)).unwrap_or_default();
    page("Profile", &format!("<p>{}</p>", email))
}

async fn admin() -> impl IntoResponse {
    page("Admin", "<p>Administration</p>")
}

pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, page("Not found", "<p>Nothing here.</p>"))
}
