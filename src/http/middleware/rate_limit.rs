use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;

use crate::app::rate_limiter::RateLimitDecision;
use crate::http::{AppError, AuthUser};
use crate::AppState;

const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Fixed-window limit per client address. Runs after authentication so
/// anonymous requests are rejected without touching Redis.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    _auth: AuthUser,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(limiter) = state.rate_limiter.as_ref() else {
        return next.run(request).await;
    };

    let client = connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let decision = match limiter.hit(&client).await {
        Ok(decision) => decision,
        Err(err) => {
            tracing::warn!(error = ?err, client = %client, "rate limiter unavailable, allowing request");
            return next.run(request).await;
        }
    };

    let mut response = if decision.limited {
        tracing::warn!(client = %client, limit = decision.limit, "request limit exceeded");
        AppError::rate_limited().into_response()
    } else {
        next.run(request).await
    };
    apply_headers(&mut response, &decision);
    response
}

fn apply_headers(response: &mut Response, decision: &RateLimitDecision) {
    let headers = response.headers_mut();
    headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(decision.reset_at));
}
