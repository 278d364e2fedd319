use axum::extract::{FromRequestParts, Path};
use axum::http::header;
use axum::http::request::Parts;

use crate::app::authorization::{AuthorizationGate, AuthorizedResource};
use crate::domain::identity::Identity;
use crate::http::AppError;
use crate::AppState;

/// The verified caller. Extracting it a second time in the same request
/// reuses the identity stored in the request extensions.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub identity: Identity,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<Identity>() {
            return Ok(AuthUser {
                identity: identity.clone(),
            });
        }

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let identity = state.tokens.authenticate_header(auth_header)?;
        parts.extensions.insert(identity.clone());
        Ok(AuthUser { identity })
    }
}

/// A resource named by the `:id` path segment that the caller owns.
#[derive(Debug, Clone)]
pub struct OwnedResource(pub AuthorizedResource);

#[axum::async_trait]
impl FromRequestParts<AppState> for OwnedResource {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser { identity } = AuthUser::from_request_parts(parts, state).await?;
        let Path(raw_id) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::not_found())?;

        let authorized = AuthorizationGate::new(state.metadata.clone())
            .authorize(identity, &raw_id)
            .await?;
        Ok(OwnedResource(authorized))
    }
}
