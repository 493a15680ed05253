//! Account and session flows.
//!
//! Requires a running API; see the crate docs.

#![allow(clippy::unwrap_used)]

use electomart_integration_tests::{TEST_PASSWORD, TestContext, base_url, expect_error};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

#[tokio::test]
#[ignore = "Requires running API server"]
async fn test_health() {
    let resp = Client::new().get(format!("{}/health", base_url())).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
#[ignore = "Requires running API server"]
async fn test_protected_route_without_token() {
    let resp = Client::new()
        .get(format!("{}/api/cart", base_url()))
        .send()
        .await
        .unwrap();
    let body = expect_error(resp, StatusCode::UNAUTHORIZED, "UNAUTHORIZED").await;
    assert_eq!(body["path"], "/api/cart");
    assert_eq!(body["method"], "GET");
}

#[tokio::test]
#[ignore = "Requires running API server"]
async fn test_garbage_token_is_invalid() {
    let resp = Client::new()
        .get(format!("{}/api/users/me", base_url()))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    expect_error(resp, StatusCode::UNAUTHORIZED, "INVALID_TOKEN").await;
}

#[tokio::test]
#[ignore = "Requires running API server"]
async fn test_register_then_me() {
    let ctx = TestContext::register().await;
    assert_eq!(ctx.user["role"], "user");
    assert!(ctx.user.get("passwordHash").is_none());

    let me: Value = ctx.get("/api/users/me").send().await.unwrap().json().await.unwrap();
    assert_eq!(me["id"], ctx.user["id"]);
}

#[tokio::test]
#[ignore = "Requires running API server"]
async fn test_duplicate_registration_conflicts() {
    let ctx = TestContext::register().await;
    let resp = Client::new()
        .post(format!("{}/api/users/register", base_url()))
        .json(&json!({ "name": "Again", "email": ctx.user["email"], "password": TEST_PASSWORD }))
        .send()
        .await
        .unwrap();
    expect_error(resp, StatusCode::CONFLICT, "CONFLICT").await;
}

#[tokio::test]
#[ignore = "Requires running API server"]
async fn test_wrong_password_is_rejected() {
    let ctx = TestContext::register().await;
    let resp = Client::new()
        .post(format!("{}/api/users/login", base_url()))
        .json(&json!({ "email": ctx.user["email"], "password": "definitely-wrong-1" }))
        .send()
        .await
        .unwrap();
    expect_error(resp, StatusCode::UNAUTHORIZED, "UNAUTHORIZED").await;
}

#[tokio::test]
#[ignore = "Requires running API server"]
async fn test_refresh_via_cookie_rotates_token() {
    let ctx = TestContext::register().await;

    // The cookie store carries the refresh cookie set at registration
    let resp = ctx.client.post(ctx.url("/api/users/refresh")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let session: Value = resp.json().await.unwrap();
    assert!(session["accessToken"].is_string());

    let resp = ctx.client.post(ctx.url("/api/users/logout")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = ctx.client.post(ctx.url("/api/users/refresh")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore = "Requires running API server"]
async fn test_forgot_password_hides_unknown_accounts() {
    let resp = Client::new()
        .post(format!("{}/api/users/forgot-password", base_url()))
        .json(&json!({ "email": "nobody-here@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
#[ignore = "Requires running API server"]
async fn test_user_cannot_reach_admin_routes() {
    let ctx = TestContext::register().await;
    let resp = ctx.get("/api/orders").send().await.unwrap();
    expect_error(resp, StatusCode::FORBIDDEN, "FORBIDDEN").await;
}
