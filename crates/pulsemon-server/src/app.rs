use crate::state::AppState;
use crate::{api, logging};
use axum::middleware;
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;

/// Builds the HTTP router.
///
/// Layers run outermost first: request logging, gzip request
/// decompression, gzip response compression, then signature checking, so
/// the signature always covers the uncompressed body.
pub fn build_http_app(state: AppState) -> Router {
    api::routes()
        .layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::hash_middleware,
        ))
        .layer(CompressionLayer::new().gzip(true))
        .layer(RequestDecompressionLayer::new().gzip(true))
        .layer(middleware::from_fn(logging::request_logging))
        .with_state(state)
}
