use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::app::error::ResourceError;
use crate::AppState;

const BAD_REQUEST: &str = "The request cannot or will not be processed due to something that is perceived to be a client error (for example, validation error).";
const UNAUTHORIZED: &str = "Access token invalid or not provided.";
const FORBIDDEN: &str = "The request contained valid data and was understood by the server, but the server is refusing action due to the authenticated user not having the necessary permissions for the resource.";
const NOT_FOUND: &str = "The requested resource was not found.";
const PAYLOAD_TOO_LARGE: &str = "The request body is larger than the server is willing to process.";
const TOO_MANY_REQUESTS: &str = "Exceeded request limit, please try again later.";
const INTERNAL: &str = "An unexpected condition was encountered.";
const BAD_GATEWAY: &str = "An upstream service failed to complete the request.";

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: &'static str,
    cause: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse<'a> {
    status: u16,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cause: Option<&'a str>,
}

/// Attached to every error response so [`expose_error_cause`] can rebuild the
/// body with the cause included.
#[derive(Debug, Clone)]
struct ErrorDetail {
    message: &'static str,
    cause: Option<String>,
}

impl AppError {
    fn new(status: StatusCode, message: &'static str) -> Self {
        Self {
            status,
            message,
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn bad_request() -> Self {
        Self::new(StatusCode::BAD_REQUEST, BAD_REQUEST)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, UNAUTHORIZED)
    }

    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, FORBIDDEN)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, NOT_FOUND)
    }

    pub fn payload_too_large() -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, PAYLOAD_TOO_LARGE)
    }

    pub fn rate_limited() -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, TOO_MANY_REQUESTS)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL)
    }

    pub fn bad_gateway() -> Self {
        Self::new(StatusCode::BAD_GATEWAY, BAD_GATEWAY)
    }
}

impl From<ResourceError> for AppError {
    fn from(err: ResourceError) -> Self {
        match err {
            ResourceError::Unauthorized(reason) => {
                tracing::debug!(reason = %reason, "rejected credentials");
                AppError::unauthorized().with_cause(reason)
            }
            ResourceError::Forbidden => AppError::forbidden(),
            ResourceError::NotFound => AppError::not_found(),
            ResourceError::Validation(messages) => {
                AppError::bad_request().with_cause(messages.join(" "))
            }
            ResourceError::Upstream(err) => {
                tracing::error!(error = ?err, "upstream store failed");
                AppError::bad_gateway().with_cause(format!("{:#}", err))
            }
            ResourceError::Unexpected(err) => {
                tracing::error!(error = ?err, "unexpected error");
                AppError::internal().with_cause(format!("{:#}", err))
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            status: self.status.as_u16(),
            message: self.message,
            cause: None,
        });
        let mut response = (self.status, body).into_response();
        response.extensions_mut().insert(ErrorDetail {
            message: self.message,
            cause: self.cause,
        });
        response
    }
}

/// Adds the underlying cause to error bodies outside production.
pub async fn expose_error_cause(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    if !state.expose_error_cause {
        return response;
    }

    let detail = response
        .extensions()
        .get::<ErrorDetail>()
        .and_then(|detail| Some((detail.message, detail.cause.clone()?)));
    let Some((message, cause)) = detail else {
        return response;
    };

    let status = response.status();
    let (mut parts, _) = response.into_parts();
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    let body = Json(ErrorResponse {
        status: status.as_u16(),
        message,
        cause: Some(&cause),
    });
    (parts, body).into_response()
}
