#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use pasetors::claims::Claims;
use pasetors::keys::{AsymmetricKeyPair, Generate};
use pasetors::{public, version4::V4};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use picture_it::app::auth::{TokenVerifier, PERMISSION_LEVEL_CLAIM};
use picture_it::domain::resource::Resource;
use picture_it::infra::error::StoreError;
use picture_it::infra::images::{ImageFields, ImagePayload, ImageStore, StoredImage};
use picture_it::infra::memory::{MemoryImageStore, MemoryMetadataStore, StoredObject};
use picture_it::infra::metadata::MetadataStore;
use picture_it::AppState;

// ---------------------------------------------------------------------------
// Fixtures: 1x1 images, base64-encoded
// ---------------------------------------------------------------------------

pub const PNG: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";
pub const GIF: &str = "R0lGODlhAQABAIAAAAAAAP///yH5BAEAAAAALAAAAAABAAEAAAIBRAA7";
pub const JPEG: &str = "/9j/4AAQSkZJRgABAQEASABIAAD/2wBDAP//////////////////////////////////////////////////////////////////////////////////////wgALCAABAAEBAREA/8QAFBABAAAAAAAAAAAAAAAAAAAAAP/aAAgBAQABPxA=";

pub const IMAGE_HOST: &str = "http://images.test";

// ---------------------------------------------------------------------------
// FlakyImageStore: the memory image store with switchable write failures
// ---------------------------------------------------------------------------

/// Creates always succeed. Replace, patch and delete fail with a backend
/// error while the store is marked as down.
#[derive(Clone)]
pub struct FlakyImageStore {
    inner: MemoryImageStore,
    down: Arc<AtomicBool>,
}

impl FlakyImageStore {
    fn check(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(anyhow::anyhow!("image store unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl ImageStore for FlakyImageStore {
    async fn create(&self, payload: &ImagePayload) -> Result<StoredImage, StoreError> {
        self.inner.create(payload).await
    }

    async fn replace(&self, external_id: &str, payload: &ImagePayload) -> Result<(), StoreError> {
        self.check()?;
        self.inner.replace(external_id, payload).await
    }

    async fn patch(&self, external_id: &str, fields: &ImageFields) -> Result<(), StoreError> {
        self.check()?;
        self.inner.patch(external_id, fields).await
    }

    async fn delete(&self, external_id: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.delete(external_id).await
    }
}

// ---------------------------------------------------------------------------
// TestApp: in-memory stores and a freshly generated signing key per test
// ---------------------------------------------------------------------------

pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub metadata: MemoryMetadataStore,
    pub images: MemoryImageStore,
    image_store_down: Arc<AtomicBool>,
    keys: AsymmetricKeyPair<V4>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    body_bytes: bytes::Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn message(&self) -> String {
        self.json()["message"].as_str().unwrap_or("").to_string()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

pub async fn app() -> TestApp {
    TestApp::setup(false, None)
}

/// Same as [`app`] but error bodies carry their `cause`.
pub async fn dev_app() -> TestApp {
    TestApp::setup(true, None)
}

/// Routes image writes to `images`; the `images` field of the returned app is
/// left unused.
pub async fn app_with_image_store(images: Arc<dyn ImageStore>) -> TestApp {
    TestApp::setup(false, Some(images))
}

impl TestApp {
    fn setup(expose_error_cause: bool, image_store: Option<Arc<dyn ImageStore>>) -> Self {
        let keys = AsymmetricKeyPair::<V4>::generate().expect("failed to generate key pair");
        let public_key: [u8; 32] = keys
            .public
            .as_bytes()
            .try_into()
            .expect("public key is not 32 bytes");

        let metadata = MemoryMetadataStore::new();
        let images = MemoryImageStore::new(IMAGE_HOST);
        let image_store_down = Arc::new(AtomicBool::new(false));
        let image_store: Arc<dyn ImageStore> = match image_store {
            Some(store) => store,
            None => Arc::new(FlakyImageStore {
                inner: images.clone(),
                down: image_store_down.clone(),
            }),
        };

        let state = AppState {
            metadata: Arc::new(metadata.clone()),
            images: image_store,
            tokens: TokenVerifier::new(public_key, None),
            rate_limiter: None,
            expose_error_cause,
            body_limit_bytes: 512_000,
        };
        let router = picture_it::http::router(state.clone());

        TestApp {
            router,
            state,
            metadata,
            images,
            image_store_down,
            keys,
        }
    }

    /// Makes every later image replace, patch and delete fail.
    pub fn take_image_store_down(&self) {
        self.image_store_down.store(true, Ordering::SeqCst);
    }

    // ------------------------------------------------------------------
    // Tokens
    // ------------------------------------------------------------------

    pub fn token_for(&self, user_id: &str) -> String {
        let mut claims =
            Claims::new_expires_in(&Duration::from_secs(900)).expect("failed to build claims");
        claims.subject(user_id).expect("failed to set subject");
        claims
            .add_additional(PERMISSION_LEVEL_CLAIM, 1)
            .expect("failed to set permission level");
        public::sign(&self.keys.secret, &claims, None, None).expect("failed to sign token")
    }

    pub fn expired_token(&self, user_id: &str) -> String {
        let mut claims =
            Claims::new_expires_in(&Duration::from_secs(900)).expect("failed to build claims");
        claims.subject(user_id).expect("failed to set subject");
        claims
            .issued_at("1999-12-31T00:00:00+00:00")
            .expect("failed to set iat");
        claims
            .not_before("1999-12-31T00:00:00+00:00")
            .expect("failed to set nbf");
        claims
            .expiration("2000-01-01T00:00:00+00:00")
            .expect("failed to set expiration");
        public::sign(&self.keys.secret, &claims, None, None).expect("failed to sign token")
    }

    /// A well-formed token signed by a key this app does not trust.
    pub fn foreign_token(&self, user_id: &str) -> String {
        let other = AsymmetricKeyPair::<V4>::generate().expect("failed to generate key pair");
        let mut claims =
            Claims::new_expires_in(&Duration::from_secs(900)).expect("failed to build claims");
        claims.subject(user_id).expect("failed to set subject");
        public::sign(&other.secret, &claims, None, None).expect("failed to sign token")
    }

    // ------------------------------------------------------------------
    // Low-level request helper
    // ------------------------------------------------------------------

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");

        for &(key, value) in headers {
            builder = builder.header(key, value);
        }

        let mut request = if let Some(body) = body {
            builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap()
        } else {
            builder.body(Body::empty()).unwrap()
        };

        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 0))));

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot failed");

        let status = response.status();
        let headers = response.headers().clone();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to collect body")
            .to_bytes();

        TestResponse {
            status,
            headers,
            body_bytes,
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> TestResponse {
        let auth = token.map(|t| format!("Bearer {}", t));
        let headers: Vec<(&str, &str)> = auth
            .as_deref()
            .map(|value| vec![("Authorization", value)])
            .unwrap_or_default();
        self.request(method, path, body, &headers).await
    }

    // ------------------------------------------------------------------
    // Convenience HTTP helpers
    // ------------------------------------------------------------------

    pub async fn get(&self, path: &str, token: Option<&str>) -> TestResponse {
        self.send(Method::GET, path, None, token).await
    }

    pub async fn post_json(&self, path: &str, body: Value, token: Option<&str>) -> TestResponse {
        self.send(Method::POST, path, Some(body), token).await
    }

    pub async fn put_json(&self, path: &str, body: Value, token: Option<&str>) -> TestResponse {
        self.send(Method::PUT, path, Some(body), token).await
    }

    pub async fn patch_json(&self, path: &str, body: Value, token: Option<&str>) -> TestResponse {
        self.send(Method::PATCH, path, Some(body), token).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> TestResponse {
        self.send(Method::DELETE, path, None, token).await
    }

    // ------------------------------------------------------------------
    // Test data helpers
    // ------------------------------------------------------------------

    /// Creates an image through the API and returns its id.
    pub async fn create_image(
        &self,
        token: &str,
        data: &str,
        content_type: &str,
        description: Option<&str>,
    ) -> Uuid {
        let mut body = serde_json::json!({ "data": data, "contentType": content_type });
        if let Some(description) = description {
            body["description"] = Value::from(description);
        }

        let resp = self.post_json("/images", body, Some(token)).await;
        assert_eq!(resp.status, StatusCode::CREATED, "create failed: {}", resp.json());
        resp.json()["id"]
            .as_str()
            .and_then(|id| Uuid::parse_str(id).ok())
            .expect("created image has no id")
    }

    pub async fn record(&self, id: Uuid) -> Option<Resource> {
        self.metadata.find_by_id(id).await.expect("metadata lookup failed")
    }

    /// The stored bytes behind a resource, looked up via its external id.
    pub async fn stored_object(&self, id: Uuid) -> Option<StoredObject> {
        let record = self.record(id).await?;
        self.images.get(&record.resource_id).await
    }
}
