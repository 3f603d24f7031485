mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{build_signed_context, build_test_context, from_state, get, gzip, post, post_json, send, TEST_KEY};
use pulsemon_common::hash::{Hasher, DEFAULT_HASH_HEADER};
use async_trait::async_trait;
use pulsemon_common::types::Value;
use pulsemon_server::config::ServerConfig;
use pulsemon_server::state::AppState;
use pulsemon_storage::database::Database;
use pulsemon_storage::memory::MemoryStore;
use pulsemon_storage::sync::FileSync;
use pulsemon_storage::{StorageError, StorageType, Storager};
use sea_orm::{DbErr, RuntimeErr};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn batch_update_then_read_back() {
    let ctx = build_test_context();
    let batch = json!([
        {"id": "Alloc", "type": "gauge", "value": 1.5},
        {"id": "PollCount", "type": "counter", "delta": 2},
        {"id": "PollCount", "type": "counter", "delta": 3},
        {"id": "Alloc", "type": "gauge", "value": 7.25}
    ]);
    let resp = post_json(&ctx.app, "/updates/", batch).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.body.is_empty());

    let resp = get(&ctx.app, "/value/counter/PollCount").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.text(), "5");

    let resp = get(&ctx.app, "/value/gauge/Alloc").await;
    assert_eq!(resp.text(), "7.25");
}

#[tokio::test]
async fn batch_with_invalid_entry_writes_nothing() {
    let ctx = build_test_context();
    let batch = json!([
        {"id": "ok", "type": "counter", "delta": 1},
        {"id": "", "type": "counter", "delta": 1}
    ]);
    let resp = post_json(&ctx.app, "/updates/", batch).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = get(&ctx.app, "/value/counter/ok").await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn path_update_accumulates_counters_and_replaces_gauges() {
    let ctx = build_test_context();
    for _ in 0..3 {
        let resp = post(&ctx.app, "/update/counter/requests/4", Body::empty()).await;
        assert_eq!(resp.status, StatusCode::OK);
    }
    assert_eq!(get(&ctx.app, "/value/counter/requests").await.text(), "12");

    post(&ctx.app, "/update/gauge/temp/20.5", Body::empty()).await;
    post(&ctx.app, "/update/gauge/temp/-3", Body::empty()).await;
    assert_eq!(get(&ctx.app, "/value/gauge/temp").await.text(), "-3");
}

#[tokio::test]
async fn path_update_rejects_bad_input() {
    let ctx = build_test_context();

    let resp = post(&ctx.app, "/update/histogram/x/1", Body::empty()).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = post(&ctx.app, "/update/counter/x/1.5", Body::empty()).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = post(&ctx.app, "/update/gauge/x/abc", Body::empty()).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert!(resp.json()["error"].is_string());
}

#[tokio::test]
async fn missing_metric_is_not_found() {
    let ctx = build_test_context();
    let resp = get(&ctx.app, "/value/gauge/nothing").await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);

    let resp = post_json(&ctx.app, "/value/", json!({"id": "nothing", "type": "counter"})).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn json_update_echoes_running_total() {
    let ctx = build_test_context();
    let resp = post_json(&ctx.app, "/update/", json!({"id": "hits", "type": "counter", "delta": 2})).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json(), json!({"id": "hits", "type": "counter", "delta": 2}));

    let resp = post_json(&ctx.app, "/update/", json!({"id": "hits", "type": "counter", "delta": 5})).await;
    assert_eq!(resp.json()["delta"], 7);

    let resp = post_json(&ctx.app, "/value/", json!({"id": "hits", "type": "counter"})).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json(), json!({"id": "hits", "type": "counter", "delta": 7}));
}

#[tokio::test]
async fn json_update_validation_statuses() {
    let ctx = build_test_context();

    let resp = post_json(&ctx.app, "/update/", json!({"id": "x", "type": ""})).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = post_json(&ctx.app, "/update/", json!({"id": "", "type": "gauge", "value": 1.0})).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);

    let resp = post_json(&ctx.app, "/update/", json!({"id": "x", "type": "gauge"})).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = post(&ctx.app, "/update/", "not json").await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn gzip_request_body_is_decompressed() {
    let ctx = build_test_context();
    let payload = json!([{"id": "zipped", "type": "counter", "delta": 9}]).to_string();
    let req = Request::builder()
        .method("POST")
        .uri("/updates/")
        .header("Content-Type", "application/json")
        .header("Content-Encoding", "gzip")
        .body(Body::from(gzip(payload.as_bytes())))
        .unwrap();
    let resp = send(&ctx.app, req).await;
    assert_eq!(resp.status, StatusCode::OK);

    assert_eq!(get(&ctx.app, "/value/counter/zipped").await.text(), "9");
}

#[tokio::test]
async fn signed_request_is_accepted_and_response_signed() {
    let ctx = build_signed_context();
    let hasher = Hasher::new(TEST_KEY).unwrap();
    let payload = json!({"id": "temp", "type": "gauge", "value": 3.5}).to_string();

    let req = Request::builder()
        .method("POST")
        .uri("/update/")
        .header("Content-Type", "application/json")
        .header(DEFAULT_HASH_HEADER, hasher.hash(payload.as_bytes()).unwrap())
        .body(Body::from(payload))
        .unwrap();
    let resp = send(&ctx.app, req).await;
    assert_eq!(resp.status, StatusCode::OK);

    let signature = resp
        .headers
        .get(DEFAULT_HASH_HEADER)
        .and_then(|v| v.to_str().ok())
        .expect("response should be signed");
    assert!(hasher.check(&resp.body, signature));
}

#[tokio::test]
async fn bad_signature_is_rejected() {
    let ctx = build_signed_context();
    let payload = json!([{"id": "x", "type": "counter", "delta": 1}]).to_string();
    let wrong = Hasher::new("other-key").unwrap().hash(payload.as_bytes()).unwrap();

    let req = Request::builder()
        .method("POST")
        .uri("/updates/")
        .header(DEFAULT_HASH_HEADER, wrong)
        .body(Body::from(payload))
        .unwrap();
    let resp = send(&ctx.app, req).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    assert_eq!(get(&ctx.app, "/value/counter/x").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unsigned_request_passes_when_key_configured() {
    let ctx = build_signed_context();
    let resp = post(&ctx.app, "/update/counter/plain/1", Body::empty()).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.headers.get(DEFAULT_HASH_HEADER).is_none());
}

#[tokio::test]
async fn ping_and_index() {
    let ctx = build_test_context();
    let resp = get(&ctx.app, "/ping").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.text(), "pong");
    assert!(resp.headers.get("x-trace-id").is_some());

    post(&ctx.app, "/update/gauge/%3Cscript%3E/1", Body::empty()).await;
    post(&ctx.app, "/update/counter/hits/2", Body::empty()).await;
    let resp = get(&ctx.app, "/").await;
    assert_eq!(resp.status, StatusCode::OK);
    let content_type = resp.headers.get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.starts_with("text/html"));
    let page = resp.text();
    assert!(page.contains("hits"));
    assert!(page.contains("&lt;script&gt;"));
}

#[tokio::test]
async fn wrong_method_is_rejected() {
    let ctx = build_test_context();
    let resp = get(&ctx.app, "/updates/").await;
    assert_eq!(resp.status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn database_backed_state_serves_requests() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("server.db").display());
    let db = Database::connect_with_delays(&url, &[]).await.unwrap();
    let state = AppState::new(
        ServerConfig::default(),
        Arc::new(db.store::<f64>()),
        Arc::new(db.store::<i64>()),
    )
    .unwrap();
    let ctx = from_state(state);

    let batch = json!([
        {"id": "c", "type": "counter", "delta": 4},
        {"id": "c", "type": "counter", "delta": 6},
        {"id": "g", "type": "gauge", "value": 0.5}
    ]);
    assert_eq!(post_json(&ctx.app, "/updates/", batch).await.status, StatusCode::OK);
    assert_eq!(get(&ctx.app, "/value/counter/c").await.text(), "10");
    assert_eq!(get(&ctx.app, "/value/gauge/g").await.text(), "0.5");
    assert_eq!(get(&ctx.app, "/ping").await.text(), "pong");
}

#[tokio::test]
async fn database_restart_with_snapshot_does_not_double_counters() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ServerConfig::default();
    config.storage_type = StorageType::Database;
    config.database_url = Some(format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("server.db").display()
    ));
    config.sync.store_interval_secs = 0;
    config.sync.file_storage_path = dir.path().join("metrics.tsv").display().to_string();

    let cancel = CancellationToken::new();
    let state = AppState::from_config(config.clone()).await.unwrap();
    let sync = FileSync::start(config.sync_config(), &cancel, state.store_handles())
        .await
        .unwrap();
    let ctx = from_state(state);
    post(&ctx.app, "/update/counter/hits/2", Body::empty()).await;
    sync.flush().await.unwrap();
    sync.close().await;
    drop(ctx);

    let state = AppState::from_config(config.clone()).await.unwrap();
    let sync = FileSync::start(config.sync_config(), &cancel, state.store_handles())
        .await
        .unwrap();
    let ctx = from_state(state);
    assert_eq!(get(&ctx.app, "/value/counter/hits").await.text(), "2");
    sync.close().await;
}

/// Counter store whose first write fails with a lost connection.
#[derive(Default)]
struct FlakyCounters {
    inner: MemoryStore<i64>,
    writes: AtomicUsize,
}

#[async_trait]
impl Storager<i64> for FlakyCounters {
    async fn get(&self, key: &str) -> pulsemon_storage::Result<i64> {
        self.inner.get(key).await
    }

    async fn get_all(&self) -> pulsemon_storage::Result<HashMap<String, i64>> {
        self.inner.get_all().await
    }

    async fn set(&self, values: &[Value<i64>]) -> pulsemon_storage::Result<()> {
        if self.writes.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(StorageError::Database(DbErr::Conn(RuntimeErr::Internal(
                "connection lost".into(),
            ))));
        }
        self.inner.set(values).await
    }
}

#[tokio::test]
async fn handler_does_not_replay_failed_counter_batch() {
    let counters = Arc::new(FlakyCounters::default());
    let state = AppState::new(
        ServerConfig::default(),
        Arc::new(MemoryStore::<f64>::new()),
        counters.clone(),
    )
    .unwrap();
    let ctx = from_state(state);

    let batch = json!([{"id": "hits", "type": "counter", "delta": 3}]);
    let resp = post_json(&ctx.app, "/updates/", batch).await;
    assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(counters.writes.load(Ordering::SeqCst), 1);
    assert!(counters.inner.is_empty());
}
