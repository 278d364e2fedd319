use std::collections::BTreeMap;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::app::resources::{ImagePatch, ImageUpload};
use crate::domain::resource::ResourceView;
use crate::http::auth::OwnedResource;
use crate::http::json::JsonBody;
use crate::http::{AppError, AuthUser};
use crate::AppState;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
pub(crate) struct WelcomeResponse {
    message: &'static str,
    resources: &'static str,
}

/// Body of `POST /images` and `PUT /images/:id`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequest {
    pub data: String,
    pub content_type: String,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePatchRequest {
    pub data: Option<String>,
    pub content_type: Option<String>,
    pub description: Option<String>,
}

impl From<ImageRequest> for ImageUpload {
    fn from(request: ImageRequest) -> Self {
        Self {
            data: request.data,
            content_type: request.content_type,
            description: request.description,
        }
    }
}

impl From<ImagePatchRequest> for ImagePatch {
    fn from(request: ImagePatchRequest) -> Self {
        Self {
            data: request.data,
            content_type: request.content_type,
            description: request.description,
        }
    }
}

pub(crate) async fn welcome() -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        message: "Welcome to the picture-it API. Manage your images under /images.",
        resources: "/images",
    })
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = match state.metadata.ping().await {
        Ok(()) => "ok",
        Err(err) => {
            tracing::warn!(error = ?err, "metadata store health check failed");
            "degraded"
        }
    };

    Json(HealthResponse { status })
}

pub async fn list_images(
    State(state): State<AppState>,
    auth: AuthUser,
    query: Result<Query<BTreeMap<String, String>>, QueryRejection>,
) -> Result<Json<Vec<ResourceView>>, AppError> {
    let Query(params) = query.map_err(|err| AppError::bad_request().with_cause(err.body_text()))?;
    let views = state.gateway().list(&auth.identity, params).await?;
    Ok(Json(views))
}

pub async fn create_image(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(payload): JsonBody<ImageRequest>,
) -> Result<(StatusCode, Json<ResourceView>), AppError> {
    let view = state
        .gateway()
        .create(&auth.identity, payload.into())
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_image(
    State(state): State<AppState>,
    OwnedResource(resource): OwnedResource,
) -> Json<ResourceView> {
    Json(state.gateway().read(&resource))
}

pub async fn replace_image(
    State(state): State<AppState>,
    OwnedResource(resource): OwnedResource,
    JsonBody(payload): JsonBody<ImageRequest>,
) -> Result<StatusCode, AppError> {
    state.gateway().replace(&resource, payload.into()).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn patch_image(
    State(state): State<AppState>,
    OwnedResource(resource): OwnedResource,
    JsonBody(payload): JsonBody<ImagePatchRequest>,
) -> Result<StatusCode, AppError> {
    state.gateway().patch(&resource, payload.into()).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_image(
    State(state): State<AppState>,
    OwnedResource(resource): OwnedResource,
) -> Result<StatusCode, AppError> {
    state.gateway().delete(&resource).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn not_found() -> AppError {
    AppError::not_found()
}
