use crate::logging::TraceId;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Extension, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use pulsemon_common::types::{MetricKind, MetricRecord, Metrics, RecordError, Value};
use pulsemon_storage::StorageError;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

/// Error body returned by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub trace_id: String,
}

pub fn error_response(status: StatusCode, trace_id: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiError {
            error: msg.to_string(),
            trace_id: trace_id.to_string(),
        }),
    )
        .into_response()
}

/// Maps a storage failure onto the status code the client should see.
fn storage_status(err: &StorageError) -> StatusCode {
    if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn storage_error(trace_id: &str, err: StorageError) -> Response {
    let status = storage_status(&err);
    if status.is_server_error() {
        tracing::error!(trace_id = %trace_id, error = %err, "Storage failure");
    }
    error_response(status, trace_id, &err.to_string())
}

fn record_error(trace_id: &str, err: RecordError, empty_id: StatusCode) -> Response {
    let status = match err {
        RecordError::EmptyId => empty_id,
        _ => StatusCode::BAD_REQUEST,
    };
    error_response(status, trace_id, &err.to_string())
}

fn parse_json<T: serde::de::DeserializeOwned>(trace_id: &str, body: &[u8]) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|e| {
        error_response(
            StatusCode::BAD_REQUEST,
            trace_id,
            &format!("invalid request body: {e}"),
        )
    })
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/ping", get(ping))
        .route("/update/", post(update_json))
        .route("/updates/", post(updates_json))
        .route("/update/{kind}/{id}/{value}", post(update_path))
        .route("/value/", post(value_json))
        .route("/value/{kind}/{id}", get(value_path))
}

async fn update_path(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path((kind, id, value)): Path<(String, String, String)>,
) -> Response {
    let kind = match kind.parse::<MetricKind>() {
        Ok(k) => k,
        Err(e) => return record_error(&trace_id, e, StatusCode::NOT_FOUND),
    };
    let values = [Value::new(id, value)];
    let result = match kind {
        MetricKind::Gauge => state.gauges.set_string(&values).await,
        MetricKind::Counter => state.counters.set_string(&values).await,
    };
    match result {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => storage_error(&trace_id, e),
    }
}

async fn value_path(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Response {
    let kind = match kind.parse::<MetricKind>() {
        Ok(k) => k,
        Err(e) => return record_error(&trace_id, e, StatusCode::NOT_FOUND),
    };
    let result = match kind {
        MetricKind::Gauge => state.gauges.get_string(&id).await,
        MetricKind::Counter => state.counters.get_string(&id).await,
    };
    match result {
        Ok(v) => v.into_response(),
        Err(e) => storage_error(&trace_id, e),
    }
}

/// Writes one metric and echoes the stored value (the running total for
/// counters).
async fn update_json(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    body: Bytes,
) -> Response {
    let metric: Metrics = match parse_json(&trace_id, &body) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    let record = match MetricRecord::try_from(metric) {
        Ok(r) => r,
        Err(e) => return record_error(&trace_id, e, StatusCode::NOT_FOUND),
    };

    let stored = match record {
        MetricRecord::Gauge { id, value } => {
            let values = [Value::new(id.clone(), value)];
            match state.gauges.set(&values).await {
                Ok(()) => state.gauges.get(&id).await.map(|v| Metrics::gauge(id, v)),
                Err(e) => Err(e),
            }
        }
        MetricRecord::Counter { id, delta } => {
            let values = [Value::new(id.clone(), delta)];
            match state.counters.set(&values).await {
                Ok(()) => state.counters.get(&id).await.map(|v| Metrics::counter(id, v)),
                Err(e) => Err(e),
            }
        }
    };

    match stored {
        Ok(m) => Json(m).into_response(),
        Err(e) => storage_error(&trace_id, e),
    }
}

/// Validates the whole batch first, then writes gauges and counters as one
/// batch each.
async fn updates_json(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    body: Bytes,
) -> Response {
    let metrics: Vec<Metrics> = match parse_json(&trace_id, &body) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let mut gauges = Vec::new();
    let mut counters = Vec::new();
    for metric in metrics {
        match MetricRecord::try_from(metric) {
            Ok(MetricRecord::Gauge { id, value }) => gauges.push(Value::new(id, value)),
            Ok(MetricRecord::Counter { id, delta }) => counters.push(Value::new(id, delta)),
            Err(e) => return record_error(&trace_id, e, StatusCode::BAD_REQUEST),
        }
    }

    if !gauges.is_empty() {
        if let Err(e) = state.gauges.set(&gauges).await {
            return storage_error(&trace_id, e);
        }
    }
    if !counters.is_empty() {
        if let Err(e) = state.counters.set(&counters).await {
            return storage_error(&trace_id, e);
        }
    }

    tracing::debug!(
        trace_id = %trace_id,
        gauges = gauges.len(),
        counters = counters.len(),
        "Batch stored"
    );
    StatusCode::OK.into_response()
}

async fn value_json(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    body: Bytes,
) -> Response {
    let metric: Metrics = match parse_json(&trace_id, &body) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    let kind = match metric.lookup_kind() {
        Ok(k) => k,
        Err(e) => return record_error(&trace_id, e, StatusCode::NOT_FOUND),
    };

    let found = match kind {
        MetricKind::Gauge => state
            .gauges
            .get(&metric.id)
            .await
            .map(|v| Metrics::gauge(metric.id.clone(), v)),
        MetricKind::Counter => state
            .counters
            .get(&metric.id)
            .await
            .map(|v| Metrics::counter(metric.id.clone(), v)),
    };

    match found {
        Ok(m) => Json(m).into_response(),
        Err(e) => storage_error(&trace_id, e),
    }
}

async fn ping(Extension(trace_id): Extension<TraceId>, State(state): State<AppState>) -> Response {
    let result = match state.gauges.ping().await {
        Ok(()) => state.counters.ping().await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => "pong".into_response(),
        Err(e) => {
            tracing::error!(trace_id = %trace_id, error = %e, "Storage ping failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "failed to connect to storage",
            )
        }
    }
}

async fn index(Extension(trace_id): Extension<TraceId>, State(state): State<AppState>) -> Response {
    let gauges = match state.gauges.get_all_string().await {
        Ok(v) => v,
        Err(e) => return storage_error(&trace_id, e),
    };
    let counters = match state.counters.get_all_string().await {
        Ok(v) => v,
        Err(e) => return storage_error(&trace_id, e),
    };

    let page = format!(
        "<html><head><title>pulsemon</title></head><body>{}{}</body></html>",
        html_table("Gauge", gauges),
        html_table("Counter", counters),
    );
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        page,
    )
        .into_response()
}

fn html_table(title: &str, values: HashMap<String, String>) -> String {
    let sorted: BTreeMap<_, _> = values.into_iter().collect();
    let mut out = format!(
        "<table border=\"1\" cellpadding=\"1\" cellspacing=\"1\" style=\"width: 600px; margin-top: 30px\">\
         <thead><tr><th>{title}</th><th>Value</th></tr></thead><tbody>"
    );
    for (k, v) in &sorted {
        let _ = write!(out, "<tr><td>{}</td><td>{}</td></tr>", escape_html(k), escape_html(v));
    }
    out.push_str("</tbody></table>");
    out
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
