#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode},
};
use gatehouse::{
    ServerConfig,
    auth::{AuthSettings, CookieSettings, RouteTable},
    create_app,
    db::{Database, User, UserRepository, UserRole},
    oauth::OAuthProviders,
};
use serde_json::Value;
use tower::ServiceExt;

pub const TEST_SECRET: &[u8] = b"test-jwt-secret-that-is-long-enough";
pub const TEST_PASSWORD: &str = "correct horse battery";

pub fn test_config(db: Database) -> ServerConfig {
    ServerConfig {
        db,
        jwt_secret: TEST_SECRET.to_vec(),
        cookies: CookieSettings::default(),
        auth: AuthSettings::default(),
        ip_header: None,
        routes: RouteTable::default(),
        providers: OAuthProviders::new(),
    }
}

/// Create a test app and return (app, db).
pub async fn create_test_app() -> (Router, Database) {
    create_test_app_with(|_| {}).await
}

/// Create a test app after adjusting the default test configuration.
pub async fn create_test_app_with(configure: impl FnOnce(&mut ServerConfig)) -> (Router, Database) {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let mut config = test_config(db.clone());
    configure(&mut config);
    let app = create_app(&config).expect("Failed to build app");
    (app, db)
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn authed_json_request(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn bearer_request(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

pub fn cookie_request(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("cookie", format!("auth_token={}", token))
        .body(Body::empty())
        .unwrap()
}

pub fn anonymous_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Extract Set-Cookie headers from response
pub fn extract_set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// The token carried by a non-clearing auth cookie, if any.
pub fn issued_token(cookies: &[String]) -> Option<String> {
    cookies.iter().find_map(|c| {
        let rest = c.strip_prefix("auth_token=")?;
        let token = rest.split(';').next()?;
        (!token.is_empty() && !c.contains("Max-Age=0")).then(|| token.to_string())
    })
}

/// Check if cookies contain the auth token being cleared (Max-Age=0)
pub fn has_cleared_cookie(cookies: &[String]) -> bool {
    cookies
        .iter()
        .any(|c| c.starts_with("auth_token=;") && c.contains("Max-Age=0"))
}

pub fn location(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Register through the API and return the session token.
pub async fn register(app: &Router, email: &str) -> String {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            serde_json::json!({ "email": email, "password": TEST_PASSWORD }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    issued_token(&extract_set_cookies(&response)).expect("registration should set a cookie")
}

/// Password login through the API and return the session token.
pub async fn login(app: &Router, email: &str) -> String {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            serde_json::json!({ "email": email, "password": TEST_PASSWORD }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    issued_token(&extract_set_cookies(&response)).expect("login should set a cookie")
}

pub async fn user_by_email(db: &Database, email: &str) -> User {
    db.users().get_by_email(email).await.unwrap().unwrap()
}

/// Register an account and grant it the admin role. Returns its token.
pub async fn register_admin(app: &Router, db: &Database, email: &str) -> String {
    let token = register(app, email).await;
    let user = user_by_email(db, email).await;
    db.users().set_role(user.id, UserRole::Admin).await.unwrap();
    token
}
