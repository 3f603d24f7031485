use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

use crate::api::error_response;
use crate::logging::TraceId;
use crate::state::AppState;

/// Upper bound on a request body read for signature verification.
const MAX_SIGNED_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Middleware that checks and produces body signatures.
///
/// Applies only when a hash key is configured and the request carries the
/// signature header. The header is checked against the decompressed body
/// and a mismatch is rejected with 400. On success the response body is
/// signed under the same header name.
pub async fn hash_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(hasher) = state.hasher.as_ref() else {
        return next.run(req).await;
    };
    let header_name = state.config.hash_header.as_str();
    let Some(expected) = req
        .headers()
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    else {
        return next.run(req).await;
    };

    let trace_id = req
        .extensions()
        .get::<TraceId>()
        .map(|t| t.0.clone())
        .unwrap_or_default();

    let (parts, body) = req.into_parts();
    let bytes = match to_bytes(body, MAX_SIGNED_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(trace_id = %trace_id, error = %e, "Failed to read signed body");
            return error_response(StatusCode::BAD_REQUEST, &trace_id, "failed to read request body");
        }
    };

    if !hasher.check(&bytes, &expected) {
        tracing::warn!(trace_id = %trace_id, "Request rejected: signature mismatch");
        return error_response(StatusCode::BAD_REQUEST, &trace_id, "failed to check hash");
    }

    let response = next.run(Request::from_parts(parts, Body::from(bytes))).await;

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(trace_id = %trace_id, error = %e, "Failed to buffer response for signing");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &trace_id, "failed to sign response");
        }
    };
    match hasher.hash(&bytes).map(|sig| HeaderValue::from_str(&sig)) {
        Ok(Ok(value)) => {
            if let Ok(name) = axum::http::HeaderName::from_bytes(header_name.as_bytes()) {
                parts.headers.insert(name, value);
            }
        }
        _ => tracing::error!(trace_id = %trace_id, "Failed to sign response"),
    }
    Response::from_parts(parts, Body::from(bytes))
}
