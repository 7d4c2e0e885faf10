use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::AppState;
use crate::api::error::AppError;
use crate::services::predict::{Prediction, TransformOutput};

#[derive(Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PredictRequest {
    /// Opaque correlation token; names the result file, never resolves the read path
    #[validate(length(min = 1, max = 128, message = "fileId must be between 1 and 128 characters"))]
    pub file_id: String,
    /// Logical model name under models/
    #[validate(length(min = 1, max = 255, message = "model must be between 1 and 255 characters"))]
    pub model: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PredictResponse {
    pub file_id: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_key: Option<String>,
    pub duration_ms: u64,
    pub result: TransformOutput,
}

impl From<Prediction> for PredictResponse {
    fn from(p: Prediction) -> Self {
        Self {
            file_id: p.file_id,
            path: p.result_path.display().to_string(),
            archive_key: p.archive_key,
            duration_ms: p.duration_ms,
            result: p.payload,
        }
    }
}

#[utoipa::path(
    post,
    path = "/predict",
    request_body = PredictRequest,
    responses(
        (status = 200, description = "Processing complete, result persisted", body = PredictResponse),
        (status = 400, description = "Missing or malformed fileId/model"),
        (status = 404, description = "Model file not materialized"),
        (status = 500, description = "Processing or result persistence failed"),
        (status = 504, description = "Request exceeded its wall-clock budget")
    ),
    tag = "predict"
)]
pub async fn predict(
    State(state): State<AppState>,
    Json(req): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    // Same budget discipline as /ingest: the spawned task is never aborted
    // mid-write, the caller just stops waiting for it.
    let budget = state.config.request_timeout;
    let predict = state.predict.clone();
    let task = tokio::spawn(async move { predict.process(&req.file_id, &req.model).await });

    let prediction = tokio::time::timeout(budget, task)
        .await
        .map_err(|_| AppError::Timeout(budget.as_secs()))?
        .map_err(|e| AppError::Internal(format!("processing task failed: {e}")))??;

    Ok(Json(PredictResponse::from(prediction)))
}
