mod common;

use axum::http::StatusCode;
use common::*;
use gatehouse::db::{UserRepository, UserRole};
use serde_json::json;
use tower::ServiceExt;

// --- Admin users endpoint tests ---

#[tokio::test]
async fn test_admin_users_requires_auth() {
    let (app, _db) = create_test_app().await;

    let response = app
        .oneshot(anonymous_request("GET", "/api/admin/users"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_users_requires_admin_role() {
    let (app, _db) = create_test_app().await;
    let token = register(&app, "alice@example.com").await;

    let response = app
        .oneshot(bearer_request("GET", "/api/admin/users", &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    // A 403 keeps the session
    assert!(!has_cleared_cookie(&extract_set_cookies(&response)));
}

#[tokio::test]
async fn test_admin_users_lists_everyone() {
    let (app, db) = create_test_app().await;
    let admin = register_admin(&app, &db, "admin@example.com").await;
    register(&app, "alice@example.com").await;

    let response = app
        .oneshot(bearer_request("GET", "/api/admin/users", &admin))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let users = body_json(response).await;
    let users = users.as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert!(users.iter().all(|u| u.get("id").is_none()));
    assert!(users.iter().all(|u| u.get("password_hash").is_none()));
    assert!(
        users
            .iter()
            .any(|u| u["email"] == "admin@example.com" && u["role"] == "admin")
    );
}

#[tokio::test]
async fn test_promoted_role_takes_effect_immediately() {
    let (app, db) = create_test_app().await;
    let token = register(&app, "alice@example.com").await;

    let before = app
        .clone()
        .oneshot(bearer_request("GET", "/api/admin/users", &token))
        .await
        .unwrap();
    assert_eq!(before.status(), StatusCode::FORBIDDEN);

    let user = user_by_email(&db, "alice@example.com").await;
    db.users().set_role(user.id, UserRole::Admin).await.unwrap();

    // Role comes from the user row, not the token claims
    let after = app
        .oneshot(bearer_request("GET", "/api/admin/users", &token))
        .await
        .unwrap();
    assert_eq!(after.status(), StatusCode::OK);
}

// --- Role and activation tests ---

#[tokio::test]
async fn test_set_role() {
    let (app, db) = create_test_app().await;
    let admin = register_admin(&app, &db, "admin@example.com").await;
    register(&app, "alice@example.com").await;
    let alice = user_by_email(&db, "alice@example.com").await;

    let response = app
        .oneshot(authed_json_request(
            "PUT",
            &format!("/api/admin/users/{}/role", alice.uuid),
            &admin,
            json!({ "role": "admin" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["role"], "admin");

    assert_eq!(
        user_by_email(&db, "alice@example.com").await.role,
        UserRole::Admin
    );
}

#[tokio::test]
async fn test_set_role_rejects_unknown_role_and_self_demotion() {
    let (app, db) = create_test_app().await;
    let admin = register_admin(&app, &db, "admin@example.com").await;
    let me = user_by_email(&db, "admin@example.com").await;

    let unknown = app
        .clone()
        .oneshot(authed_json_request(
            "PUT",
            &format!("/api/admin/users/{}/role", me.uuid),
            &admin,
            json!({ "role": "superuser" }),
        ))
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);

    let demote = app
        .oneshot(authed_json_request(
            "PUT",
            &format!("/api/admin/users/{}/role", me.uuid),
            &admin,
            json!({ "role": "user" }),
        ))
        .await
        .unwrap();
    assert_eq!(demote.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_deactivation_revokes_sessions() {
    let (app, db) = create_test_app().await;
    let admin = register_admin(&app, &db, "admin@example.com").await;
    let alice_token = register(&app, "alice@example.com").await;
    let alice = user_by_email(&db, "alice@example.com").await;

    let response = app
        .clone()
        .oneshot(authed_json_request(
            "PUT",
            &format!("/api/admin/users/{}/active", alice.uuid),
            &admin,
            json!({ "active": false }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["is_active"], false);

    let me = app
        .clone()
        .oneshot(bearer_request("GET", "/api/auth/me", &alice_token))
        .await
        .unwrap();
    assert_eq!(me.status(), StatusCode::UNAUTHORIZED);

    // Reactivation does not bring old sessions back
    let reactivate = app
        .clone()
        .oneshot(authed_json_request(
            "PUT",
            &format!("/api/admin/users/{}/active", alice.uuid),
            &admin,
            json!({ "active": true }),
        ))
        .await
        .unwrap();
    assert_eq!(reactivate.status(), StatusCode::OK);

    let me = app
        .oneshot(bearer_request("GET", "/api/auth/me", &alice_token))
        .await
        .unwrap();
    assert_eq!(me.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cannot_deactivate_self() {
    let (app, db) = create_test_app().await;
    let admin = register_admin(&app, &db, "admin@example.com").await;
    let me = user_by_email(&db, "admin@example.com").await;

    let response = app
        .oneshot(authed_json_request(
            "PUT",
            &format!("/api/admin/users/{}/active", me.uuid),
            &admin,
            json!({ "active": false }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_or_unknown_uuid() {
    let (app, db) = create_test_app().await;
    let admin = register_admin(&app, &db, "admin@example.com").await;

    let invalid = app
        .clone()
        .oneshot(authed_json_request(
            "PUT",
            "/api/admin/users/not-a-uuid/active",
            &admin,
            json!({ "active": false }),
        ))
        .await
        .unwrap();
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

    let unknown = app
        .oneshot(authed_json_request(
            "PUT",
            &format!("/api/admin/users/{}/active", uuid::Uuid::new_v4()),
            &admin,
            json!({ "active": false }),
        ))
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}
