#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Request, StatusCode};
use flate2::write::GzEncoder;
use flate2::Compression;
use pulsemon_server::app;
use pulsemon_server::config::ServerConfig;
use pulsemon_server::state::AppState;
use pulsemon_storage::memory::MemoryStore;
use std::io::Write;
use std::sync::Arc;
use tower::util::ServiceExt;

pub const TEST_KEY: &str = "test-secret";

pub struct TestContext {
    pub state: AppState,
    pub app: axum::Router,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("response should be JSON")
    }
}

fn test_config(hash_key: Option<&str>) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.hash_key = hash_key.map(str::to_string);
    config.sync.enabled = false;
    config
}

pub fn build_test_context() -> TestContext {
    build_context(None)
}

pub fn build_signed_context() -> TestContext {
    build_context(Some(TEST_KEY))
}

fn build_context(hash_key: Option<&str>) -> TestContext {
    let state = AppState::new(
        test_config(hash_key),
        Arc::new(MemoryStore::<f64>::new()),
        Arc::new(MemoryStore::<i64>::new()),
    )
    .expect("state should build");
    from_state(state)
}

pub fn from_state(state: AppState) -> TestContext {
    let app = app::build_http_app(state.clone());
    TestContext { state, app }
}

pub async fn send(app: &axum::Router, req: Request<Body>) -> TestResponse {
    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read")
        .to_vec();
    TestResponse {
        status,
        headers,
        body,
    }
}

pub async fn get(app: &axum::Router, uri: &str) -> TestResponse {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    send(app, req).await
}

pub async fn post(app: &axum::Router, uri: &str, body: impl Into<Body>) -> TestResponse {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(body.into())
        .expect("request should build");
    send(app, req).await
}

pub async fn post_json(app: &axum::Router, uri: &str, value: serde_json::Value) -> TestResponse {
    post(app, uri, value.to_string()).await
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("gzip write");
    encoder.finish().expect("gzip finish")
}
