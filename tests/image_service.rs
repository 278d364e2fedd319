//! Image Service Client Tests
//!
//! Runs a stand-in image service on a local port and drives the HTTP image
//! store through the router: credentials sent upstream and the mapping of
//! upstream statuses onto responses.

mod common;

use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{post, put};
use axum::{Json, Router};
use common::{app_with_image_store, TestApp, PNG};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use uuid::Uuid;

use picture_it::config::ImageServiceSettings;
use picture_it::domain::resource::NewResource;
use picture_it::infra::images::HttpImageStore;
use picture_it::infra::metadata::MetadataStore;

const SERVICE_TOKEN: &str = "image-service-secret";
const TOKEN_HEADER: &str = "X-API-Private-Token";

/// Headers of every request the stand-in service received, in order.
#[derive(Clone, Default)]
struct Received {
    headers: Arc<Mutex<Vec<HeaderMap>>>,
}

impl Received {
    fn record(&self, headers: HeaderMap) {
        self.headers.lock().unwrap().push(headers);
    }

    fn last(&self) -> HeaderMap {
        self.headers
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("image service received no requests")
    }
}

async fn create_image(State(received): State<Received>, headers: HeaderMap) -> Response {
    received.record(headers);
    (
        StatusCode::CREATED,
        Json(json!({ "imageUrl": "http://cdn.test/images/ext-1.png", "id": "ext-1" })),
    )
        .into_response()
}

/// Answers by external id: `rejected` is a 400, `missing` a 404, `broken` a
/// 500, anything else succeeds.
async fn write_image(
    State(received): State<Received>,
    Path(external_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    received.record(headers);
    match external_id.as_str() {
        "rejected" => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "The image data is corrupt." })),
        )
            .into_response(),
        "missing" => StatusCode::NOT_FOUND.into_response(),
        "broken" => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        _ => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn spawn_image_service() -> (String, Received) {
    let received = Received::default();
    let router = Router::new()
        .route("/images", post(create_image))
        .route(
            "/images/:id",
            put(write_image).patch(write_image).delete(write_image),
        )
        .with_state(received.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind image service");
    let addr = listener.local_addr().expect("no local address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    (format!("http://{}", addr), received)
}

async fn setup() -> (TestApp, Received) {
    let (url, received) = spawn_image_service().await;
    let store = HttpImageStore::new(&ImageServiceSettings {
        url,
        token: SERVICE_TOKEN.to_string(),
        token_header: TOKEN_HEADER.to_string(),
    })
    .expect("failed to build image service client");

    (app_with_image_store(Arc::new(store)).await, received)
}

/// Stores a metadata record for `owner` that points at `external_id`.
async fn seed_record(app: &TestApp, owner: &str, external_id: &str) -> Uuid {
    app.metadata
        .create(NewResource {
            image_url: format!("http://cdn.test/images/{}.png", external_id),
            content_type: "image/png".to_string(),
            description: Some("seeded".to_string()),
            author: owner.to_string(),
            resource_id: external_id.to_string(),
        })
        .await
        .expect("failed to seed record")
        .id
}

fn upload() -> Value {
    json!({ "data": PNG, "contentType": "image/png", "description": "replaced" })
}

fn assert_service_credentials(headers: &HeaderMap) {
    assert_eq!(
        headers.get(TOKEN_HEADER).and_then(|value| value.to_str().ok()),
        Some(SERVICE_TOKEN)
    );
    assert!(headers.get("authorization").is_none());
}

// ===========================================================================
// Credentials
// ===========================================================================

#[tokio::test]
async fn create_sends_service_token_instead_of_bearer() {
    let (app, received) = setup().await;
    let token = app.token_for("alice");

    let resp = app.post_json("/images", upload(), Some(&token)).await;

    assert_eq!(resp.status, StatusCode::CREATED);
    assert_eq!(resp.json()["imageUrl"], "http://cdn.test/images/ext-1.png");
    assert_service_credentials(&received.last());

    let id = Uuid::parse_str(resp.json()["id"].as_str().unwrap()).unwrap();
    assert_eq!(app.record(id).await.unwrap().resource_id, "ext-1");
}

#[tokio::test]
async fn writes_send_service_token_instead_of_bearer() {
    let (app, received) = setup().await;
    let token = app.token_for("alice");
    let id = seed_record(&app, "alice", "ext-2").await;
    let path = format!("/images/{}", id);

    let resp = app.put_json(&path, upload(), Some(&token)).await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);
    assert_service_credentials(&received.last());

    let resp = app
        .patch_json(&path, json!({ "contentType": "image/png" }), Some(&token))
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);
    assert_service_credentials(&received.last());

    let resp = app.delete(&path, Some(&token)).await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);
    assert_service_credentials(&received.last());
}

// ===========================================================================
// Upstream status mapping
// ===========================================================================

#[tokio::test]
async fn upstream_statuses_map_onto_responses() {
    let (app, _) = setup().await;
    let token = app.token_for("alice");

    for (external_id, expected) in [
        ("rejected", StatusCode::BAD_REQUEST),
        ("missing", StatusCode::NOT_FOUND),
        ("broken", StatusCode::BAD_GATEWAY),
    ] {
        let id = seed_record(&app, "alice", external_id).await;
        let resp = app
            .put_json(&format!("/images/{}", id), upload(), Some(&token))
            .await;
        assert_eq!(resp.status, expected, "external id: {}", external_id);
    }
}

#[tokio::test]
async fn upstream_failure_on_delete_leaves_metadata_removed() {
    let (app, _) = setup().await;
    let token = app.token_for("alice");
    let id = seed_record(&app, "alice", "broken").await;

    let resp = app.delete(&format!("/images/{}", id), Some(&token)).await;

    assert_eq!(resp.status, StatusCode::BAD_GATEWAY);
    assert!(app.record(id).await.is_none());
}

#[tokio::test]
async fn upstream_failure_on_put_keeps_metadata_write() {
    let (app, _) = setup().await;
    let token = app.token_for("alice");
    let id = seed_record(&app, "alice", "broken").await;

    let resp = app
        .put_json(&format!("/images/{}", id), upload(), Some(&token))
        .await;

    assert_eq!(resp.status, StatusCode::BAD_GATEWAY);
    assert_eq!(
        app.record(id).await.unwrap().description.as_deref(),
        Some("replaced")
    );
}
