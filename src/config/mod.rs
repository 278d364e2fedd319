pub mod rate_limits;

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::config::rate_limits::RateLimitPolicy;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub http_addr: String,
    pub app_env: String,
    pub token_public_key: [u8; 32],
    pub token_issuer: Option<String>,
    pub metadata: MetadataBackend,
    pub images: ImageBackend,
    pub redis_url: Option<String>,
    pub rate_limit: RateLimitPolicy,
    pub body_limit_bytes: usize,
}

#[derive(Clone, Debug)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
    pub max_lifetime_seconds: u64,
}

#[derive(Clone, Debug)]
pub struct ImageServiceSettings {
    pub url: String,
    pub token: String,
    pub token_header: String,
}

#[derive(Clone, Debug)]
pub struct S3Settings {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub public_url: String,
}

#[derive(Clone, Debug)]
pub enum MetadataBackend {
    Postgres(DatabaseSettings),
    Memory,
}

#[derive(Clone, Debug)]
pub enum ImageBackend {
    Http(ImageServiceSettings),
    S3(S3Settings),
    Memory { public_url: String },
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        // A missing .env file is normal outside local development.
        let _ = dotenvy::dotenv();

        let http_addr = env_or("HTTP_ADDR", "0.0.0.0:8080");
        let _parsed_http_addr = SocketAddr::from_str(&http_addr)
            .map_err(|err| anyhow!("invalid HTTP_ADDR: {}", err))?;

        Ok(Self {
            http_addr,
            app_env: env_or("APP_ENV", "production"),
            token_public_key: env_key_32("TOKEN_PUBLIC_KEY")?,
            token_issuer: env_opt("TOKEN_ISSUER"),
            metadata: metadata_backend()?,
            images: image_backend()?,
            redis_url: env_opt("REDIS_URL"),
            rate_limit: RateLimitPolicy {
                max_requests: env_or_parse("RATE_LIMIT_MAX_REQUESTS", "100")?,
                window_seconds: env_or_parse("RATE_LIMIT_WINDOW_SECONDS", "600")?,
            },
            body_limit_bytes: env_or_parse("BODY_LIMIT_BYTES", "512000")?,
        })
    }

    pub fn is_development(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("development")
    }
}

fn metadata_backend() -> Result<MetadataBackend> {
    match env_or("METADATA_BACKEND", "postgres").as_str() {
        "postgres" => Ok(MetadataBackend::Postgres(DatabaseSettings {
            url: env_or_err("DATABASE_URL")?,
            max_connections: env_or_parse("DB_MAX_CONNECTIONS", "25")?,
            connect_timeout_seconds: env_or_parse("DB_CONNECT_TIMEOUT_SECONDS", "5")?,
            idle_timeout_seconds: env_or_parse("DB_IDLE_TIMEOUT_SECONDS", "300")?,
            max_lifetime_seconds: env_or_parse("DB_MAX_LIFETIME_SECONDS", "1800")?,
        })),
        "memory" => Ok(MetadataBackend::Memory),
        other => Err(anyhow!("unknown METADATA_BACKEND: {}", other)),
    }
}

fn image_backend() -> Result<ImageBackend> {
    match env_or("IMAGE_BACKEND", "http").as_str() {
        "http" => Ok(ImageBackend::Http(ImageServiceSettings {
            url: env_or_err("IMAGE_SERVICE_URL")?,
            token: env_or_err("IMAGE_SERVICE_TOKEN")?,
            token_header: env_or("IMAGE_SERVICE_TOKEN_HEADER", "X-API-Private-Token"),
        })),
        "s3" => Ok(ImageBackend::S3(S3Settings {
            endpoint: env_opt("S3_ENDPOINT"),
            region: env_or("S3_REGION", "us-east-1"),
            bucket: env_or_err("S3_BUCKET")?,
            public_url: env_or_err("S3_PUBLIC_URL")?,
        })),
        "memory" => Ok(ImageBackend::Memory {
            public_url: env_or("IMAGE_PUBLIC_URL", "http://localhost:8080/static"),
        }),
        other => Err(anyhow!("unknown IMAGE_BACKEND: {}", other)),
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_or_err(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("missing required env var: {}", key))
}

fn env_or_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}

fn env_key_32(key: &str) -> Result<[u8; 32]> {
    let value = env_or_err(key)?;
    let decoded = STANDARD
        .decode(value.trim().as_bytes())
        .map_err(|err| anyhow!("invalid {}: {}", key, err))?;
    <[u8; 32]>::try_from(decoded.as_slice())
        .map_err(|_| anyhow!("invalid {}: expected 32 bytes", key))
}
