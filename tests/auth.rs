//! Authentication Tests
//!
//! Covers bearer token verification, the error envelope and the
//! unauthenticated routes.

mod common;

use axum::http::{Method, StatusCode};
use common::{app, dev_app, PNG};
use serde_json::json;

const UNAUTHORIZED_MESSAGE: &str = "Access token invalid or not provided.";

// ===========================================================================
// Token verification
// ===========================================================================

#[tokio::test]
async fn missing_token_is_rejected() {
    let app = app().await;

    let resp = app.get("/images", None).await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.json()["status"], 401);
    assert_eq!(resp.message(), UNAUTHORIZED_MESSAGE);
    assert!(resp.json().get("cause").is_none());
}

#[tokio::test]
async fn non_bearer_scheme_is_rejected() {
    let app = app().await;
    let token = app.token_for("user-1");
    let header = format!("Basic {}", token);

    let resp = app
        .request(Method::GET, "/images", None, &[("Authorization", header.as_str())])
        .await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn garbage_token_is_rejected() {
    let app = app().await;

    let resp = app.get("/images", Some("not-a-token")).await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.message(), UNAUTHORIZED_MESSAGE);
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let app = app().await;
    let token = app.expired_token("user-1");

    let resp = app.get("/images", Some(&token)).await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_from_untrusted_key_is_rejected() {
    let app = app().await;
    let token = app.foreign_token("user-1");

    let resp = app.get("/images", Some(&token)).await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn valid_token_lists_nothing_for_new_user() {
    let app = app().await;
    let token = app.token_for("user-1");

    let resp = app.get("/images", Some(&token)).await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json(), json!([]));
}

#[tokio::test]
async fn unauthenticated_writes_touch_no_store() {
    let app = app().await;
    let owner = app.token_for("owner");
    let id = app.create_image(&owner, PNG, "image/png", Some("mine")).await;
    let path = format!("/images/{}", id);

    let create = app
        .post_json("/images", json!({ "data": PNG, "contentType": "image/png" }), None)
        .await;
    let replace = app
        .put_json(&path, json!({ "data": PNG, "contentType": "image/png" }), None)
        .await;
    let patch = app.patch_json(&path, json!({ "description": "x" }), None).await;
    let delete = app.delete(&path, None).await;

    for resp in [create, replace, patch, delete] {
        assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    }
    assert_eq!(app.metadata.len().await, 1);
    assert_eq!(app.images.len().await, 1);
    assert_eq!(
        app.record(id).await.unwrap().description.as_deref(),
        Some("mine")
    );
}

// ===========================================================================
// Error envelope
// ===========================================================================

#[tokio::test]
async fn development_mode_exposes_cause() {
    let app = dev_app().await;

    let resp = app.get("/images", None).await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.message(), UNAUTHORIZED_MESSAGE);
    assert_eq!(resp.json()["cause"], "missing Authorization header");
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let app = app().await;

    let resp = app.get("/nope", None).await;

    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.json()["status"], 404);
    assert_eq!(resp.message(), "The requested resource was not found.");
}

// ===========================================================================
// Public routes
// ===========================================================================

#[tokio::test]
async fn health_reports_ok() {
    let app = app().await;

    let resp = app.get("/health", None).await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["status"], "ok");
}

#[tokio::test]
async fn welcome_points_to_images() {
    let app = app().await;

    let resp = app.get("/", None).await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["resources"], "/images");
}

#[tokio::test]
async fn responses_carry_security_headers_and_request_id() {
    let app = app().await;

    let resp = app.get("/health", None).await;

    assert_eq!(resp.header("x-content-type-options"), Some("nosniff"));
    assert_eq!(resp.header("x-frame-options"), Some("DENY"));
    assert_eq!(resp.header("referrer-policy"), Some("no-referrer"));
    assert!(resp.header("x-request-id").is_some());
}
