use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::MetadataDirective;
use aws_sdk_s3::Client;
use uuid::Uuid;

use crate::config::S3Settings;
use crate::infra::error::StoreError;
use crate::infra::images::{decode_image, ImageFields, ImagePayload, ImageStore, StoredImage};

/// Keeps image objects directly in an S3 bucket, for deployments without the
/// remote image service. The object key doubles as the external id.
#[derive(Clone)]
pub struct S3ImageStore {
    client: Client,
    bucket: String,
    public_url: String,
}

impl S3ImageStore {
    pub async fn new(settings: &S3Settings) -> Result<Self> {
        let region_provider = RegionProviderChain::first_try(Region::new(settings.region.clone()));
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let mut s3_builder = aws_sdk_s3::config::Builder::from(&shared_config)
            .region(shared_config.region().cloned())
            .force_path_style(true);
        if let Some(endpoint) = &settings.endpoint {
            s3_builder = s3_builder.endpoint_url(endpoint.clone());
        }
        if let Some(provider) = shared_config.credentials_provider() {
            s3_builder = s3_builder.credentials_provider(provider);
        }

        Ok(Self {
            client: Client::from_conf(s3_builder.build()),
            bucket: settings.bucket.clone(),
            public_url: settings.public_url.trim_end_matches('/').to_string(),
        })
    }

    async fn put(&self, key: &str, payload: &ImagePayload) -> Result<(), StoreError> {
        let (content_type, bytes) = decode_image(payload)?;
        tracing::debug!(s3_key = %key, bucket = %self.bucket, size = bytes.len(), "S3: uploading image");

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type.as_str())
            .body(ByteStream::from(bytes))
            .send()
            .await
            .with_context(|| format!("S3: failed to upload object '{}'", key))?;
        Ok(())
    }

    async fn ensure_exists(&self, key: &str) -> Result<(), StoreError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if err.as_service_error().map_or(false, |e| e.is_not_found()) => {
                Err(StoreError::NotFound)
            }
            Err(err) => Err(anyhow::Error::new(err)
                .context(format!("S3: failed to inspect object '{}'", key))
                .into()),
        }
    }
}

#[async_trait]
impl ImageStore for S3ImageStore {
    async fn create(&self, payload: &ImagePayload) -> Result<StoredImage, StoreError> {
        let (content_type, _) = decode_image(payload)?;
        let key = format!("images/{}.{}", Uuid::new_v4(), content_type.extension());
        self.put(&key, payload).await?;

        Ok(StoredImage {
            image_url: format!("{}/{}", self.public_url, key),
            external_id: key,
        })
    }

    async fn replace(&self, external_id: &str, payload: &ImagePayload) -> Result<(), StoreError> {
        self.ensure_exists(external_id).await?;
        self.put(external_id, payload).await
    }

    async fn patch(&self, external_id: &str, fields: &ImageFields) -> Result<(), StoreError> {
        self.ensure_exists(external_id).await?;

        match (&fields.data, &fields.content_type) {
            (Some(data), content_type) => {
                let content_type = match content_type {
                    Some(content_type) => content_type.clone(),
                    None => self.current_content_type(external_id).await?,
                };
                let payload = ImagePayload {
                    data: data.clone(),
                    content_type,
                };
                self.put(external_id, &payload).await
            }
            (None, Some(content_type)) => {
                tracing::debug!(s3_key = %external_id, %content_type, "S3: rewriting object content type");
                self.client
                    .copy_object()
                    .bucket(&self.bucket)
                    .key(external_id)
                    .copy_source(format!("{}/{}", self.bucket, external_id))
                    .metadata_directive(MetadataDirective::Replace)
                    .content_type(content_type)
                    .send()
                    .await
                    .with_context(|| format!("S3: failed to rewrite object '{}'", external_id))?;
                Ok(())
            }
            (None, None) => Ok(()),
        }
    }

    async fn delete(&self, external_id: &str) -> Result<(), StoreError> {
        tracing::debug!(s3_key = %external_id, bucket = %self.bucket, "S3: deleting image");
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(external_id)
            .send()
            .await
            .with_context(|| format!("S3: failed to delete object '{}'", external_id))?;
        Ok(())
    }
}

impl S3ImageStore {
    async fn current_content_type(&self, key: &str) -> Result<String, StoreError> {
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("S3: failed to inspect object '{}'", key))?;
        head.content_type()
            .map(String::from)
            .ok_or_else(|| StoreError::Corrupt(format!("object '{}' has no content type", key)))
    }
}
