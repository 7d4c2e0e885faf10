use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use rust_inference_backend::config::AppConfig;
use rust_inference_backend::services::object_store::InMemoryObjectStore;
use rust_inference_backend::services::shared_fs::{Area, SharedFs};
use rust_inference_backend::{AppState, create_app};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tower::ServiceExt;

async fn setup(enable_archive: bool) -> (AppState, Arc<InMemoryObjectStore>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::development(dir.path());
    config.enable_archive = enable_archive;

    let shared_fs = Arc::new(SharedFs::mount(dir.path()).await.unwrap());
    let store = Arc::new(InMemoryObjectStore::new());
    let state = AppState::new(store.clone(), shared_fs, config);
    (state, store, dir)
}

async fn materialize_model(state: &AppState, name: &str, bytes: &[u8]) {
    let path = state.shared_fs.resolve(Area::Models, name);
    let mut temp = state.shared_fs.begin_write(&path).await.unwrap();
    temp.write_all(bytes).await.unwrap();
    state.shared_fs.commit(temp, &path).await.unwrap();
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_predict_flow_persists_result() {
    let (state, _store, dir) = setup(false).await;
    materialize_model(&state, "demo.bin", b"model-payload").await;
    let app = create_app(state);

    let (status, body) = post_json(
        &app,
        "/predict",
        json!({ "fileId": "req-1", "model": "demo.bin" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fileId"], "req-1");
    assert!(body["durationMs"].is_u64());
    assert!(body["archiveKey"].is_null());

    let expected_checksum = hex::encode(Sha256::digest(b"model-payload"));
    assert_eq!(body["result"]["checksum"], Value::from(expected_checksum.clone()));
    assert_eq!(body["result"]["fileSize"], 13);
    assert_eq!(body["result"]["status"], "success");

    // The result file carries the same payload the caller got back
    let result_path = dir.path().join("outputs").join("req-1.result");
    assert_eq!(body["path"], result_path.display().to_string());
    let persisted: Value =
        serde_json::from_slice(&std::fs::read(&result_path).unwrap()).unwrap();
    assert_eq!(persisted["checksum"], Value::from(expected_checksum));
    assert_eq!(persisted["fileId"], "req-1");
}

#[tokio::test]
async fn test_predict_missing_model_returns_404_with_file_id() {
    let (state, _store, _dir) = setup(false).await;
    let app = create_app(state);

    let (status, body) = post_json(
        &app,
        "/predict",
        json!({ "fileId": "corr-9", "model": "never-materialized.bin" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");
    assert_eq!(body["fileId"], "corr-9");
}

#[tokio::test]
async fn test_predict_rejects_invalid_identifiers() {
    let (state, _store, _dir) = setup(false).await;
    materialize_model(&state, "demo.bin", b"payload").await;
    let app = create_app(state);

    let (status, _) = post_json(&app, "/predict", json!({ "fileId": "", "model": "demo.bin" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // A fileId that would escape outputs/ is rejected, not rewritten
    let (status, body) = post_json(
        &app,
        "/predict",
        json!({ "fileId": "../escape", "model": "demo.bin" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_predict_recomputes_on_every_request() {
    let (state, _store, dir) = setup(false).await;
    materialize_model(&state, "demo.bin", b"same-input").await;
    let app = create_app(state);

    let req = json!({ "fileId": "rerun", "model": "demo.bin" });
    let (status, first) = post_json(&app, "/predict", req.clone()).await;
    assert_eq!(status, StatusCode::OK);
    let (status, second) = post_json(&app, "/predict", req).await;
    assert_eq!(status, StatusCode::OK);

    // No caching: both runs succeed and agree on the deterministic fields
    assert_eq!(first["result"]["checksum"], second["result"]["checksum"]);
    assert_eq!(first["result"]["fileSize"], second["result"]["fileSize"]);
    assert!(dir.path().join("outputs").join("rerun.result").is_file());
}

#[tokio::test]
async fn test_predict_archives_result_when_enabled() {
    let (state, store, _dir) = setup(true).await;
    materialize_model(&state, "demo.bin", b"archive-me").await;
    let app = create_app(state);

    let (status, body) = post_json(
        &app,
        "/predict",
        json!({ "fileId": "arch-1", "model": "demo.bin" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["archiveKey"], "outputs/arch-1.result");
    assert!(store.contains("outputs/arch-1.result"));
}

#[tokio::test]
async fn test_predict_archive_failure_is_best_effort() {
    let (state, store, dir) = setup(true).await;
    materialize_model(&state, "demo.bin", b"archive-me").await;
    store.fail_puts(true);
    let app = create_app(state);

    let (status, body) = post_json(
        &app,
        "/predict",
        json!({ "fileId": "arch-2", "model": "demo.bin" }),
    )
    .await;

    // Primary result still lands; the archive key is simply absent
    assert_eq!(status, StatusCode::OK);
    assert!(body["archiveKey"].is_null());
    assert_eq!(body["result"]["status"], "success");
    assert!(dir.path().join("outputs").join("arch-2.result").is_file());
    assert!(!store.contains("outputs/arch-2.result"));
}

#[tokio::test]
async fn test_health_reports_components() {
    let (state, _store, _dir) = setup(false).await;
    let app = create_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage"], "connected");
    assert_eq!(body["sharedFs"], "mounted");
}
