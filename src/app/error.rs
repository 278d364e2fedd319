use thiserror::Error;

use crate::infra::error::StoreError;

/// Every way a resource operation can fail. Mapped to a transport status only
/// at the HTTP boundary.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("access token invalid or not provided: {0}")]
    Unauthorized(String),
    #[error("resource belongs to another user")]
    Forbidden,
    #[error("resource not found")]
    NotFound,
    #[error("validation failed: {}", .0.join(" "))]
    Validation(Vec<String>),
    #[error("upstream store failed")]
    Upstream(#[source] anyhow::Error),
    #[error("unexpected error")]
    Unexpected(#[source] anyhow::Error),
}

impl ResourceError {
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized(reason.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(vec![message.into()])
    }
}

impl From<StoreError> for ResourceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            StoreError::Validation(messages) => Self::Validation(messages),
            StoreError::Corrupt(detail) => {
                Self::Unexpected(anyhow::anyhow!("stored record is malformed: {}", detail))
            }
            StoreError::Backend(err) => Self::Upstream(err),
        }
    }
}
