use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::services::ingest::IngestError;
use crate::services::predict::PredictError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Access denied to source object: {key}")]
    AccessDenied { key: String },

    #[error("Source object not found: {key}")]
    SourceNotFound { key: String },

    #[error("File not found for {file_id}")]
    NotFound { file_id: String, path: String },

    #[error("Payload of {actual} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { max: u64, actual: u64 },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Request exceeded the {0} second budget")]
    Timeout(u64),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl From<IngestError> for AppError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::InvalidRequest(msg) => AppError::BadRequest(msg),
            IngestError::SourceNotFound { key } => AppError::SourceNotFound { key },
            IngestError::AccessDenied { key } => AppError::AccessDenied { key },
            IngestError::SizeLimitExceeded { actual, max } => {
                AppError::PayloadTooLarge { max, actual }
            }
            IngestError::WriteFailed { stage, source } => {
                AppError::WriteFailed(format!("{stage}: {source}"))
            }
            IngestError::Store(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<PredictError> for AppError {
    fn from(e: PredictError) -> Self {
        match e {
            PredictError::InvalidRequest(msg) => AppError::BadRequest(msg),
            PredictError::NotFound { file_id, path } => AppError::NotFound {
                file_id,
                path: path.display().to_string(),
            },
            PredictError::ReadFailed(e) => AppError::ProcessingFailed(e.to_string()),
            PredictError::Encode(e) => AppError::ProcessingFailed(e.to_string()),
            PredictError::WriteFailed(e) => AppError::WriteFailed(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, extra) = match self {
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg, json!({}))
            }
            AppError::AccessDenied { key } => (
                StatusCode::FORBIDDEN,
                "ACCESS_DENIED",
                "Access denied to source object".to_string(),
                json!({ "key": key }),
            ),
            AppError::SourceNotFound { key } => (
                StatusCode::NOT_FOUND,
                "SOURCE_NOT_FOUND",
                "Source object not found".to_string(),
                json!({ "key": key }),
            ),
            AppError::NotFound { file_id, path } => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "Model file not found on shared filesystem".to_string(),
                json!({ "fileId": file_id, "path": path }),
            ),
            AppError::PayloadTooLarge { max, actual } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "FILE_TOO_LARGE",
                format!("Payload size {actual} bytes exceeds maximum of {max} bytes"),
                json!({ "maxSize": max, "actualSize": actual }),
            ),
            AppError::WriteFailed(msg) => {
                tracing::error!("Write failed: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "WRITE_FAILED",
                    "Failed to write to shared filesystem".to_string(),
                    json!({}),
                )
            }
            AppError::ProcessingFailed(msg) => {
                tracing::error!("Processing failed: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "PROCESSING_FAILED",
                    "Processing failed".to_string(),
                    json!({}),
                )
            }
            AppError::Timeout(secs) => (
                StatusCode::GATEWAY_TIMEOUT,
                "TIMEOUT",
                format!("Request exceeded the {secs} second budget"),
                json!({}),
            ),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal Server Error".to_string(),
                    json!({}),
                )
            }
            AppError::Anyhow(e) => {
                tracing::error!("Anyhow error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal Server Error".to_string(),
                    json!({}),
                )
            }
        };

        let mut body = json!({
            "error": code,
            "message": message,
        });
        if let (Some(obj), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                obj.insert(k.clone(), v.clone());
            }
        }

        (status, Json(body)).into_response()
    }
}
