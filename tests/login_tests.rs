//! Tests for registration, password login, logout and password changes.

mod common;

use axum::http::StatusCode;
use common::*;
use axum::body::Body;
use axum::http::Request;
use gatehouse::auth::{ClientIpHeader, PasswordChangePolicy};
use gatehouse::db::{UserRepository, unix_now};
use gatehouse::jwt::TOKEN_DURATION_SECS;
use serde_json::json;
use tower::ServiceExt;

// =============================================================================
// Registration
// =============================================================================

#[tokio::test]
async fn test_register_opens_session() {
    let (app, _db) = create_test_app().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            json!({ "email": "Alice@Example.com", "password": TEST_PASSWORD, "name": "Alice" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let cookies = extract_set_cookies(&response);
    assert!(issued_token(&cookies).is_some());

    let body = body_json(response).await;
    assert_eq!(body["user"]["email"], "alice@example.com");
    assert_eq!(body["user"]["name"], "Alice");
    assert_eq!(body["user"]["role"], "user");
    assert_eq!(body["user"]["provider"], "credentials");
    assert!(body["token"].is_string());
}

#[tokio::test]
async fn test_register_duplicate_email_conflicts() {
    let (app, _db) = create_test_app().await;
    register(&app, "alice@example.com").await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            json!({ "email": "ALICE@example.com", "password": TEST_PASSWORD }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_register_rejects_bad_input() {
    let (app, _db) = create_test_app().await;

    let bad_email = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            json!({ "email": "not-an-email", "password": TEST_PASSWORD }),
        ))
        .await
        .unwrap();
    assert_eq!(bad_email.status(), StatusCode::BAD_REQUEST);

    let short_password = app
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            json!({ "email": "bob@example.com", "password": "short" }),
        ))
        .await
        .unwrap();
    assert_eq!(short_password.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_register_with_verification_required_has_no_session() {
    let (app, _db) = create_test_app_with(|c| c.auth.require_verified_email = true).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            json!({ "email": "alice@example.com", "password": TEST_PASSWORD }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(issued_token(&extract_set_cookies(&response)).is_none());
    let body = body_json(response).await;
    assert_eq!(body["verification_required"], true);

    // Unverified accounts cannot sign in with a password
    let login = app
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            json!({ "email": "alice@example.com", "password": TEST_PASSWORD }),
        ))
        .await
        .unwrap();
    assert_eq!(login.status(), StatusCode::FORBIDDEN);
}

// =============================================================================
// Login
// =============================================================================

#[tokio::test]
async fn test_login_sets_cookie_and_week_long_session() {
    let (app, _db) = create_test_app().await;
    register(&app, "alice@example.com").await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            json!({ "email": "alice@example.com", "password": TEST_PASSWORD }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let cookies = extract_set_cookies(&response);
    let cookie = cookies
        .iter()
        .find(|c| c.starts_with("auth_token="))
        .expect("auth cookie");
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(cookie.contains("Path=/"));
    assert!(cookie.contains(&format!("Max-Age={}", TOKEN_DURATION_SECS)));
    assert!(!cookie.contains("Secure"));

    let body = body_json(response).await;
    let expires_at = body["expires_at"].as_i64().unwrap();
    let expected = unix_now() + TOKEN_DURATION_SECS;
    assert!((expires_at - expected).abs() <= 5);
    assert_eq!(body["user"]["email"], "alice@example.com");
    assert!(body["user"]["last_login_at"].is_i64());
}

#[tokio::test]
async fn test_login_secure_cookie_in_production() {
    let (app, _db) = create_test_app_with(|c| {
        c.cookies.secure = true;
        c.cookies.domain = Some("example.com".to_string());
    })
    .await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            json!({ "email": "alice@example.com", "password": TEST_PASSWORD }),
        ))
        .await
        .unwrap();

    let cookies = extract_set_cookies(&response);
    assert!(cookies.iter().any(|c| c.contains("; Secure")));
    assert!(cookies.iter().any(|c| c.contains("Domain=example.com")));
}

#[tokio::test]
async fn test_login_wrong_password_or_unknown_email() {
    let (app, _db) = create_test_app().await;
    register(&app, "alice@example.com").await;

    for (email, password) in [
        ("alice@example.com", "wrong password"),
        ("nobody@example.com", TEST_PASSWORD),
    ] {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/login",
                json!({ "email": email, "password": password }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(issued_token(&extract_set_cookies(&response)).is_none());
    }
}

#[tokio::test]
async fn test_login_deactivated_account_forbidden() {
    let (app, db) = create_test_app().await;
    register(&app, "alice@example.com").await;
    let user = user_by_email(&db, "alice@example.com").await;
    db.users().set_active(user.id, false).await.unwrap();

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            json!({ "email": "alice@example.com", "password": TEST_PASSWORD }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_me_with_bearer_and_cookie() {
    let (app, _db) = create_test_app().await;
    let token = register(&app, "alice@example.com").await;

    let via_header = app
        .clone()
        .oneshot(bearer_request("GET", "/api/auth/me", &token))
        .await
        .unwrap();
    assert_eq!(via_header.status(), StatusCode::OK);
    assert_eq!(body_json(via_header).await["email"], "alice@example.com");

    let via_cookie = app
        .oneshot(cookie_request("GET", "/api/auth/me", &token))
        .await
        .unwrap();
    assert_eq!(via_cookie.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_me_without_token_unauthorized() {
    let (app, _db) = create_test_app().await;

    let response = app
        .oneshot(anonymous_request("GET", "/api/auth/me"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Logout
// =============================================================================

#[tokio::test]
async fn test_logout_then_reuse_rejected() {
    let (app, _db) = create_test_app().await;
    let token = register(&app, "alice@example.com").await;

    let response = app
        .clone()
        .oneshot(cookie_request("POST", "/api/auth/logout", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(has_cleared_cookie(&extract_set_cookies(&response)));

    // Signature is still valid, but the session is gone
    let reuse = app
        .oneshot(bearer_request("GET", "/api/auth/me", &token))
        .await
        .unwrap();
    assert_eq!(reuse.status(), StatusCode::UNAUTHORIZED);
    assert!(has_cleared_cookie(&extract_set_cookies(&reuse)));
}

#[tokio::test]
async fn test_logout_without_session_still_succeeds() {
    let (app, _db) = create_test_app().await;

    let anonymous = app
        .clone()
        .oneshot(anonymous_request("POST", "/api/auth/logout"))
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::OK);

    let garbage = app
        .oneshot(cookie_request("POST", "/api/auth/logout", "not-a-jwt"))
        .await
        .unwrap();
    assert_eq!(garbage.status(), StatusCode::OK);
    assert!(has_cleared_cookie(&extract_set_cookies(&garbage)));
}

#[tokio::test]
async fn test_logout_during_store_outage_is_unavailable() {
    let (app, db) = create_test_app().await;
    let token = register(&app, "alice@example.com").await;
    db.pool().close().await;

    let response = app
        .clone()
        .oneshot(bearer_request("POST", "/api/auth/logout", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // Tokens that never map to a session still log out cleanly
    let garbage = app
        .oneshot(cookie_request("POST", "/api/auth/logout", "not-a-jwt"))
        .await
        .unwrap();
    assert_eq!(garbage.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_logout_only_ends_one_session() {
    let (app, _db) = create_test_app().await;
    let first = register(&app, "alice@example.com").await;
    let second = login(&app, "alice@example.com").await;

    app.clone()
        .oneshot(bearer_request("POST", "/api/auth/logout", &first))
        .await
        .unwrap();

    let response = app
        .oneshot(bearer_request("GET", "/api/auth/me", &second))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// Password change
// =============================================================================

#[tokio::test]
async fn test_change_password_revokes_other_sessions() {
    let (app, _db) = create_test_app().await;
    let current = register(&app, "alice@example.com").await;
    let other = login(&app, "alice@example.com").await;

    let response = app
        .clone()
        .oneshot(authed_json_request(
            "POST",
            "/api/auth/password",
            &current,
            json!({ "current_password": TEST_PASSWORD, "new_password": "a brand new password" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["revoked_sessions"], 1);

    let other_me = app
        .clone()
        .oneshot(bearer_request("GET", "/api/auth/me", &other))
        .await
        .unwrap();
    assert_eq!(other_me.status(), StatusCode::UNAUTHORIZED);

    let current_me = app
        .clone()
        .oneshot(bearer_request("GET", "/api/auth/me", &current))
        .await
        .unwrap();
    assert_eq!(current_me.status(), StatusCode::OK);

    // The old password no longer works, the new one does
    let old = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            json!({ "email": "alice@example.com", "password": TEST_PASSWORD }),
        ))
        .await
        .unwrap();
    assert_eq!(old.status(), StatusCode::UNAUTHORIZED);

    let new = app
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            json!({ "email": "alice@example.com", "password": "a brand new password" }),
        ))
        .await
        .unwrap();
    assert_eq!(new.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_change_password_can_leave_sessions_valid() {
    let (app, _db) = create_test_app_with(|c| {
        c.auth.password_change_policy = PasswordChangePolicy::LeaveOthersValid
    })
    .await;
    let current = register(&app, "alice@example.com").await;
    let other = login(&app, "alice@example.com").await;

    let response = app
        .clone()
        .oneshot(authed_json_request(
            "POST",
            "/api/auth/password",
            &current,
            json!({ "current_password": TEST_PASSWORD, "new_password": "a brand new password" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let other_me = app
        .oneshot(bearer_request("GET", "/api/auth/me", &other))
        .await
        .unwrap();
    assert_eq!(other_me.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_change_password_wrong_current_password() {
    let (app, _db) = create_test_app().await;
    let token = register(&app, "alice@example.com").await;

    let response = app
        .oneshot(authed_json_request(
            "POST",
            "/api/auth/password",
            &token,
            json!({ "current_password": "not it at all", "new_password": "a brand new password" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// =============================================================================
// Rate limiting
// =============================================================================

fn login_from(ip: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header("content-type", "application/json");
    if let Some(ip) = ip {
        builder = builder.header("x-real-ip", ip);
    }
    builder
        .body(Body::from(
            json!({ "email": "nobody@example.com", "password": "wrong password" }).to_string(),
        ))
        .unwrap()
}

#[tokio::test]
async fn test_login_rate_limited_per_client_ip() {
    // Unknown account, so each attempt fails fast without password hashing
    let (app, _db) = create_test_app_with(|c| c.ip_header = Some(ClientIpHeader::XRealIp)).await;

    for _ in 0..5 {
        let response = app
            .clone()
            .oneshot(login_from(Some("203.0.113.9")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let limited = app
        .clone()
        .oneshot(login_from(Some("203.0.113.9")))
        .await
        .unwrap();
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);

    // Another client has its own bucket
    let other = app
        .oneshot(login_from(Some("203.0.113.10")))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_without_configured_ip_header_rejected() {
    let (app, _db) = create_test_app_with(|c| c.ip_header = Some(ClientIpHeader::XRealIp)).await;

    let response = app.oneshot(login_from(None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
