use anyhow::{anyhow, Context};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ImageServiceSettings;
use crate::domain::resource::ContentType;
use crate::infra::error::StoreError;

/// Full image body: base64-encoded bytes plus their MIME type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePayload {
    pub data: String,
    pub content_type: String,
}

/// Partial image body; omitted fields stay as they are in the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl ImageFields {
    pub fn is_empty(&self) -> bool {
        self.data.is_none() && self.content_type.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredImage {
    pub image_url: String,
    pub external_id: String,
}

/// The store holding the image bytes, addressed by the id it hands out.
#[async_trait]
pub trait ImageStore: Send + Sync + 'static {
    async fn create(&self, payload: &ImagePayload) -> Result<StoredImage, StoreError>;

    async fn replace(&self, external_id: &str, payload: &ImagePayload) -> Result<(), StoreError>;

    async fn patch(&self, external_id: &str, fields: &ImageFields) -> Result<(), StoreError>;

    async fn delete(&self, external_id: &str) -> Result<(), StoreError>;
}

/// Client for the remote image service. Every call carries the service token,
/// never the end user's bearer token.
#[derive(Clone)]
pub struct HttpImageStore {
    client: Client,
    base_url: Url,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedImage {
    image_url: String,
    id: String,
}

impl HttpImageStore {
    pub fn new(settings: &ImageServiceSettings) -> anyhow::Result<Self> {
        let header_name = HeaderName::from_bytes(settings.token_header.as_bytes())
            .with_context(|| format!("invalid image service header: {}", settings.token_header))?;
        let mut header_value = HeaderValue::from_str(&settings.token)
            .context("image service token is not a valid header value")?;
        header_value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(header_name, header_value);

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .context("failed to build image service client")?;

        let mut base_url = Url::parse(&settings.url)
            .with_context(|| format!("invalid IMAGE_SERVICE_URL: {}", settings.url))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("IMAGE_SERVICE_URL cannot be a base url: {}", settings.url));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, external_id: Option<&str>) -> Result<Url, StoreError> {
        let mut url = self
            .base_url
            .join("images")
            .map_err(|err| anyhow!("failed to build image service url: {}", err))?;
        if let Some(external_id) = external_id {
            url.path_segments_mut()
                .map_err(|_| anyhow!("image service url cannot take path segments"))?
                .push(external_id);
        }
        Ok(url)
    }
}

#[async_trait]
impl ImageStore for HttpImageStore {
    async fn create(&self, payload: &ImagePayload) -> Result<StoredImage, StoreError> {
        let url = self.endpoint(None)?;
        tracing::debug!(%url, content_type = %payload.content_type, "image service: creating image");

        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .context("image service: create request failed")?;
        let response = check_status(response, "create").await?;

        let created: CreatedImage = response
            .json()
            .await
            .context("image service: malformed create response")?;

        Ok(StoredImage {
            image_url: created.image_url,
            external_id: created.id,
        })
    }

    async fn replace(&self, external_id: &str, payload: &ImagePayload) -> Result<(), StoreError> {
        let url = self.endpoint(Some(external_id))?;
        tracing::debug!(%url, "image service: replacing image");

        let response = self
            .client
            .put(url)
            .json(payload)
            .send()
            .await
            .context("image service: replace request failed")?;
        check_status(response, "replace").await?;
        Ok(())
    }

    async fn patch(&self, external_id: &str, fields: &ImageFields) -> Result<(), StoreError> {
        let url = self.endpoint(Some(external_id))?;
        tracing::debug!(%url, "image service: patching image");

        let response = self
            .client
            .patch(url)
            .json(fields)
            .send()
            .await
            .context("image service: patch request failed")?;
        check_status(response, "patch").await?;
        Ok(())
    }

    async fn delete(&self, external_id: &str) -> Result<(), StoreError> {
        let url = self.endpoint(Some(external_id))?;
        tracing::debug!(%url, "image service: deleting image");

        let response = self
            .client
            .delete(url)
            .send()
            .await
            .context("image service: delete request failed")?;
        check_status(response, "delete").await?;
        Ok(())
    }
}

async fn check_status(response: Response, action: &str) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|value| value.get("message").and_then(|m| m.as_str()).map(String::from))
                .unwrap_or_else(|| format!("image service rejected the {}", action));
            Err(StoreError::validation(message))
        }
        StatusCode::NOT_FOUND => Err(StoreError::NotFound),
        _ => Err(StoreError::Backend(anyhow!(
            "image service {} failed with status {}: {}",
            action,
            status,
            body
        ))),
    }
}

/// Decodes a base64 payload (optionally a `data:` URL) and checks that the
/// bytes are an image of the declared type.
pub fn decode_image(payload: &ImagePayload) -> Result<(ContentType, Vec<u8>), StoreError> {
    let content_type = ContentType::parse(&payload.content_type).ok_or_else(|| {
        StoreError::validation(format!(
            "`{}` is not a valid content type, expected one of image/gif, image/jpeg, image/png.",
            payload.content_type
        ))
    })?;

    let encoded = match payload.data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => payload.data.as_str(),
    };
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|_| StoreError::validation("The image data must be base64 encoded."))?;

    match image::guess_format(&bytes) {
        Ok(format) if format == content_type.image_format() => Ok((content_type, bytes)),
        Ok(_) => Err(StoreError::validation(format!(
            "The image data is not of type {}.",
            content_type.as_str()
        ))),
        Err(_) => Err(StoreError::validation("The image data is not a recognised image.")),
    }
}
