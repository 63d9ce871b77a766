//! Route guard for browser-facing pages.
//!
//! Classifies each request path, resolves the caller through [`AuthService`]
//! and turns the pair into a redirect or a pass-through. API routes are public
//! here; they enforce auth through extractors and answer with JSON instead.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use url::form_urlencoded;

use crate::db::UserRole;

use super::cookie::{CookieSettings, extract_token};
use super::errors::AuthError;
use super::role::allows;
use super::service::AuthService;
use super::types::AuthenticatedUser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteCategory {
    Public,
    /// Login and registration pages, meant for anonymous visitors.
    AuthOnly,
    Protected,
    /// Protected and restricted to administrators.
    AdminOnly,
}

impl RouteCategory {
    fn is_gated(&self) -> bool {
        matches!(self, RouteCategory::Protected | RouteCategory::AdminOnly)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Proceed,
    RedirectToLogin { next: String },
    RedirectToUnauthorized,
    RedirectToLanding,
}

/// Path-prefix classification of page routes.
#[derive(Debug, Clone)]
pub struct RouteTable {
    pub auth_only: Vec<String>,
    pub protected: Vec<String>,
    pub admin_only: Vec<String>,
    pub login_path: String,
    pub unauthorized_path: String,
    pub landing_path: String,
}

impl Default for RouteTable {
    fn default() -> Self {
        let paths = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            auth_only: paths(&["/login", "/register"]),
            protected: paths(&[
                "/dashboard",
                "/notes",
                "/diary",
                "/tasks",
                "/quotes",
                "/profile",
                "/admin",
            ]),
            admin_only: paths(&["/admin"]),
            login_path: "/login".to_string(),
            unauthorized_path: "/unauthorized".to_string(),
            landing_path: "/dashboard".to_string(),
        }
    }
}

/// `/notes` covers `/notes` and `/notes/42`, not `/notesy`.
fn matches_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

impl RouteTable {
    pub fn classify(&self, path: &str) -> RouteCategory {
        let any = |prefixes: &[String]| prefixes.iter().any(|p| matches_prefix(path, p));

        if any(&self.admin_only) {
            RouteCategory::AdminOnly
        } else if any(&self.protected) {
            RouteCategory::Protected
        } else if any(&self.auth_only) {
            RouteCategory::AuthOnly
        } else {
            RouteCategory::Public
        }
    }

    fn location(&self, decision: &GuardDecision) -> Option<String> {
        match decision {
            GuardDecision::Proceed => None,
            GuardDecision::RedirectToLogin { next } => {
                let next: String = form_urlencoded::byte_serialize(next.as_bytes()).collect();
                Some(format!("{}?next={}", self.login_path, next))
            }
            GuardDecision::RedirectToUnauthorized => Some(self.unauthorized_path.clone()),
            GuardDecision::RedirectToLanding => Some(self.landing_path.clone()),
        }
    }
}

/// Pure routing decision. `requested` is the original path and query.
pub fn decide(
    category: RouteCategory,
    user: Option<&AuthenticatedUser>,
    requested: &str,
) -> GuardDecision {
    match (category, user) {
        (RouteCategory::Protected | RouteCategory::AdminOnly, None) => {
            GuardDecision::RedirectToLogin {
                next: requested.to_string(),
            }
        }
        (RouteCategory::AdminOnly, Some(user)) if !allows(user.role, UserRole::Admin) => {
            GuardDecision::RedirectToUnauthorized
        }
        (RouteCategory::AuthOnly, Some(_)) => GuardDecision::RedirectToLanding,
        _ => GuardDecision::Proceed,
    }
}

#[derive(Clone)]
pub struct GuardState {
    pub auth: AuthService,
    pub cookies: CookieSettings,
    pub routes: Arc<RouteTable>,
}

fn unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        "Service temporarily unavailable",
    )
        .into_response()
}

fn append_cookie(response: &mut Response, cookie: Option<String>) {
    if let Some(value) = cookie.and_then(|c| HeaderValue::from_str(&c).ok()) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
}

/// Middleware applying the route table to every page request.
///
/// An invalid token on a non-public route gets one refresh attempt; a
/// successful refresh sets the new cookie on whatever response follows.
pub async fn route_guard(
    State(guard): State<GuardState>,
    mut request: Request,
    next: Next,
) -> Response {
    let category = guard.routes.classify(request.uri().path());
    let requested = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let token = extract_token(request.headers()).map(str::to_string);
    let mut set_cookie = None;

    let user = match token.as_deref() {
        None => None,
        Some(token) => match guard.auth.validate(token).await {
            Ok(user) => Some(user),
            Err(AuthError::Unavailable) if category.is_gated() => return unavailable(),
            Err(_) if category == RouteCategory::Public => None,
            Err(_) => match guard.auth.refresh(token).await {
                Ok(refreshed) => {
                    if refreshed.refreshed {
                        set_cookie = Some(guard.cookies.session_cookie(&refreshed.token));
                    }
                    Some(refreshed.user)
                }
                Err(AuthError::Unavailable) if category.is_gated() => return unavailable(),
                Err(_) => None,
            },
        },
    };

    let decision = decide(category, user.as_ref(), &requested);

    if let Some(location) = guard.routes.location(&decision) {
        if matches!(decision, GuardDecision::RedirectToLogin { .. }) && token.is_some() {
            set_cookie = Some(guard.cookies.clear_cookie());
        }
        let mut response = (StatusCode::FOUND, [(header::LOCATION, location)]).into_response();
        append_cookie(&mut response, set_cookie);
        return response;
    }

    if let Some(user) = user {
        request.extensions_mut().insert(user);
    }

    let mut response = next.run(request).await;
    append_cookie(&mut response, set_cookie);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::AuthProvider;

    fn user(role: UserRole) -> AuthenticatedUser {
        AuthenticatedUser {
            id: "uuid".to_string(),
            email: "a@example.com".to_string(),
            name: "A".to_string(),
            role,
            provider: AuthProvider::Credentials,
            created_at: 0,
            last_login_at: None,
            user_id: 1,
            session_id: 1,
        }
    }

    #[test]
    fn test_classify_defaults() {
        let table = RouteTable::default();
        assert_eq!(table.classify("/"), RouteCategory::Public);
        assert_eq!(table.classify("/login"), RouteCategory::AuthOnly);
        assert_eq!(table.classify("/register"), RouteCategory::AuthOnly);
        assert_eq!(table.classify("/notes"), RouteCategory::Protected);
        assert_eq!(table.classify("/notes/42/edit"), RouteCategory::Protected);
        assert_eq!(table.classify("/notesy"), RouteCategory::Public);
        assert_eq!(table.classify("/admin"), RouteCategory::AdminOnly);
        assert_eq!(table.classify("/admin/users"), RouteCategory::AdminOnly);
        assert_eq!(table.classify("/api/auth/login"), RouteCategory::Public);
        assert_eq!(table.classify("/unauthorized"), RouteCategory::Public);
    }

    #[test]
    fn test_decide_protected() {
        assert_eq!(
            decide(RouteCategory::Protected, None, "/notes?page=2"),
            GuardDecision::RedirectToLogin {
                next: "/notes?page=2".to_string()
            }
        );
        assert_eq!(
            decide(RouteCategory::Protected, Some(&user(UserRole::User)), "/notes"),
            GuardDecision::Proceed
        );
    }

    #[test]
    fn test_decide_admin_only() {
        assert!(matches!(
            decide(RouteCategory::AdminOnly, None, "/admin"),
            GuardDecision::RedirectToLogin { .. }
        ));
        assert_eq!(
            decide(RouteCategory::AdminOnly, Some(&user(UserRole::User)), "/admin"),
            GuardDecision::RedirectToUnauthorized
        );
        assert_eq!(
            decide(RouteCategory::AdminOnly, Some(&user(UserRole::Admin)), "/admin"),
            GuardDecision::Proceed
        );
    }

    #[test]
    fn test_decide_auth_only_and_public() {
        assert_eq!(
            decide(RouteCategory::AuthOnly, Some(&user(UserRole::User)), "/login"),
            GuardDecision::RedirectToLanding
        );
        assert_eq!(
            decide(RouteCategory::AuthOnly, None, "/login"),
            GuardDecision::Proceed
        );
        assert_eq!(
            decide(RouteCategory::Public, None, "/"),
            GuardDecision::Proceed
        );
        assert_eq!(
            decide(RouteCategory::Public, Some(&user(UserRole::Admin)), "/"),
            GuardDecision::Proceed
        );
    }

    #[test]
    fn test_login_location_encodes_next() {
        let table = RouteTable::default();
        let location = table
            .location(&GuardDecision::RedirectToLogin {
                next: "/notes?page=2".to_string(),
            })
            .unwrap();
        assert_eq!(location, "/login?next=%2Fnotes%3Fpage%3D2");
    }
}
