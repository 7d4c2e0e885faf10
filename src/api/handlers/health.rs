use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

use crate::AppState;

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub storage: String,
    pub shared_fs: String,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    // A 404 on the probe key still proves the store is reachable
    let storage = if state.object_store.object_exists("health-check").await.is_ok() {
        "connected"
    } else {
        "disconnected"
    };

    let shared_fs = if tokio::fs::metadata(state.shared_fs.root()).await.is_ok() {
        "mounted"
    } else {
        "unavailable"
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        storage: storage.to_string(),
        shared_fs: shared_fs.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
