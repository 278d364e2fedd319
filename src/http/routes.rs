use axum::{middleware, routing::get, Router};

use crate::http::handlers;
use crate::http::middleware::rate_limit::rate_limit_middleware;
use crate::AppState;

pub fn root() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::welcome))
        .route("/health", get(handlers::health))
}

/// Every route here requires a verified caller; `:id` routes also require
/// that the caller owns the resource.
pub fn images(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/images",
            get(handlers::list_images).post(handlers::create_image),
        )
        .route(
            "/images/:id",
            get(handlers::get_image)
                .put(handlers::replace_image)
                .patch(handlers::patch_image)
                .delete(handlers::delete_image),
        )
        .route_layer(middleware::from_fn_with_state(state, rate_limit_middleware))
}
