use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::AppState;
use crate::api::error::AppError;
use crate::services::ingest::{FileIdentifier, IngestTrigger, MaterializeStatus};

#[derive(Deserialize, ToSchema, Validate)]
pub struct IngestRequest {
    /// Object-store key to materialize
    pub key: Option<String>,
    /// Base64-encoded inline payload (alternative to `key`)
    pub data: Option<String>,
    /// Target filename for inline payloads (default: data.bin)
    #[validate(length(min = 1, max = 255, message = "filename must be between 1 and 255 characters"))]
    pub filename: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub file_id: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_key: Option<String>,
    pub size_bytes: u64,
    pub status: MaterializeStatus,
}

impl From<FileIdentifier> for IngestResponse {
    fn from(ident: FileIdentifier) -> Self {
        Self {
            file_id: ident.file_id.to_string(),
            path: ident.materialized_path.display().to_string(),
            source_key: ident.source_key,
            size_bytes: ident.size_bytes,
            status: ident.status,
        }
    }
}

#[utoipa::path(
    post,
    path = "/ingest",
    request_body = IngestRequest,
    responses(
        (status = 200, description = "File materialized on the shared filesystem", body = IngestResponse),
        (status = 400, description = "Neither key nor data present, or malformed payload"),
        (status = 403, description = "Access denied to source object"),
        (status = 404, description = "Source object not found"),
        (status = 413, description = "Payload exceeds configured size limit"),
        (status = 500, description = "Shared filesystem write failed"),
        (status = 504, description = "Request exceeded its wall-clock budget")
    ),
    tag = "ingest"
)]
pub async fn ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let trigger = IngestTrigger::DirectRequest {
        key: req.key,
        data: req.data,
        filename: req.filename,
    };

    // The worker runs as a spawned task so an expired budget returns 504
    // without aborting an in-flight write: the task finishes (or fails) on
    // its own, and idempotent materialization keeps a later retry safe.
    let budget = state.config.request_timeout;
    let ingest = state.ingest.clone();
    let task = tokio::spawn(async move { ingest.handle_trigger(trigger).await });

    let ident = tokio::time::timeout(budget, task)
        .await
        .map_err(|_| AppError::Timeout(budget.as_secs()))?
        .map_err(|e| AppError::Internal(format!("ingestion task failed: {e}")))??;

    Ok(Json(IngestResponse::from(ident)))
}
