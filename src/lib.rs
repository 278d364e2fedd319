pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;

use std::sync::Arc;

use anyhow::Result;

use crate::app::auth::TokenVerifier;
use crate::app::rate_limiter::RateLimiter;
use crate::app::resources::ResourceGateway;
use crate::config::{AppConfig, ImageBackend, MetadataBackend};
use crate::infra::cache::RedisCache;
use crate::infra::db::Db;
use crate::infra::images::{HttpImageStore, ImageStore};
use crate::infra::memory::{MemoryImageStore, MemoryMetadataStore};
use crate::infra::metadata::{MetadataStore, PgMetadataStore};
use crate::infra::storage::S3ImageStore;

#[derive(Clone)]
pub struct AppState {
    pub metadata: Arc<dyn MetadataStore>,
    pub images: Arc<dyn ImageStore>,
    pub tokens: TokenVerifier,
    pub rate_limiter: Option<RateLimiter>,
    pub expose_error_cause: bool,
    pub body_limit_bytes: usize,
}

impl AppState {
    /// Connects every backend named by `config`.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let metadata: Arc<dyn MetadataStore> = match &config.metadata {
            MetadataBackend::Postgres(settings) => {
                let db = Db::connect(settings).await?;
                db.migrate().await?;
                Arc::new(PgMetadataStore::new(db))
            }
            MetadataBackend::Memory => {
                tracing::warn!("using in-memory metadata store, records are lost on restart");
                Arc::new(MemoryMetadataStore::new())
            }
        };

        let images: Arc<dyn ImageStore> = match &config.images {
            ImageBackend::Http(settings) => Arc::new(HttpImageStore::new(settings)?),
            ImageBackend::S3(settings) => Arc::new(S3ImageStore::new(settings).await?),
            ImageBackend::Memory { public_url } => {
                tracing::warn!("using in-memory image store, images are lost on restart");
                Arc::new(MemoryImageStore::new(public_url.clone()))
            }
        };

        let rate_limiter = match &config.redis_url {
            Some(redis_url) => {
                let cache = RedisCache::connect(redis_url).await?;
                Some(RateLimiter::new(cache, config.rate_limit))
            }
            None => {
                tracing::info!("REDIS_URL not set, rate limiting disabled");
                None
            }
        };

        Ok(Self {
            metadata,
            images,
            tokens: TokenVerifier::new(config.token_public_key, config.token_issuer.clone()),
            rate_limiter,
            expose_error_cause: config.is_development(),
            body_limit_bytes: config.body_limit_bytes,
        })
    }

    pub fn gateway(&self) -> ResourceGateway {
        ResourceGateway::new(self.metadata.clone(), self.images.clone())
    }
}
