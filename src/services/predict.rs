use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::services::object_store::ObjectStore;
use crate::services::shared_fs::{Area, FsError, SharedFs};
use crate::utils::validation::{sanitize_filename, validate_identifier};

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("model file not found: {path}")]
    NotFound { file_id: String, path: PathBuf },

    #[error("failed to read model file: {0}")]
    ReadFailed(#[source] FsError),

    #[error("failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to persist result: {0}")]
    WriteFailed(#[source] FsError),
}

/// Output of the processing transform. Everything except
/// `processing_duration_ms` is a pure function of the input bytes.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransformOutput {
    pub file_id: String,
    pub file_size: u64,
    pub checksum: String,
    pub unique_bytes: usize,
    pub most_common_byte: u8,
    pub processing_duration_ms: u64,
    pub status: String,
}

/// A completed processing request. Results are not deduplicated: every
/// request recomputes and rewrites its own result file.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub file_id: String,
    pub result_path: PathBuf,
    pub archive_key: Option<String>,
    pub duration_ms: u64,
    pub payload: TransformOutput,
}

/// Stateless worker that reads a materialized file, applies the transform
/// and persists the result. Reads are non-exclusive: any number of
/// concurrent requests may process the same immutable file.
pub struct PredictService {
    shared_fs: Arc<SharedFs>,
    archive: Option<Arc<dyn ObjectStore>>,
}

impl PredictService {
    /// `archive` is the optional best-effort capability: when absent, results
    /// stay on the shared filesystem only.
    pub fn new(shared_fs: Arc<SharedFs>, archive: Option<Arc<dyn ObjectStore>>) -> Self {
        Self { shared_fs, archive }
    }

    /// Process one request. The read path is resolved from `model` alone;
    /// `file_id` is an opaque correlation token that names the result file
    /// and is echoed back to the caller.
    pub async fn process(&self, file_id: &str, model: &str) -> Result<Prediction, PredictError> {
        let started = Instant::now();

        validate_identifier(file_id)
            .map_err(|e| PredictError::InvalidRequest(e.to_string()))?;
        let model_name =
            sanitize_filename(model).map_err(|e| PredictError::InvalidRequest(e.to_string()))?;

        let model_path = self.shared_fs.resolve(Area::Models, &model_name);
        let bytes = match self.shared_fs.read(&model_path).await {
            Ok(bytes) => bytes,
            Err(FsError::NotFound(path)) => {
                return Err(PredictError::NotFound {
                    file_id: file_id.to_string(),
                    path,
                });
            }
            Err(e) => return Err(PredictError::ReadFailed(e)),
        };

        let payload = transform(&bytes, file_id);
        let result_path = self.persist_result(file_id, &payload).await?;
        let archive_key = self.archive(file_id, &payload).await;

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            file_id,
            model = %model_name,
            result = %result_path.display(),
            duration_ms,
            "processing complete"
        );

        Ok(Prediction {
            file_id: file_id.to_string(),
            result_path,
            archive_key,
            duration_ms,
            payload,
        })
    }

    /// Write the result under `outputs/<file_id>.result` with the same
    /// temp-then-rename protocol used for materialization, so a concurrent
    /// reader of the result file never sees a partial write either.
    async fn persist_result(
        &self,
        file_id: &str,
        payload: &TransformOutput,
    ) -> Result<PathBuf, PredictError> {
        let path = self
            .shared_fs
            .resolve(Area::Outputs, &format!("{file_id}.result"));
        let json = serde_json::to_vec_pretty(payload)?;

        let mut temp = self
            .shared_fs
            .begin_write(&path)
            .await
            .map_err(PredictError::WriteFailed)?;
        if let Err(e) = temp.write_all(&json).await {
            temp.discard().await;
            return Err(PredictError::WriteFailed(e));
        }
        let materialized = self
            .shared_fs
            .commit(temp, &path)
            .await
            .map_err(PredictError::WriteFailed)?;

        Ok(materialized.path)
    }

    /// Best-effort archive to the object store. A failure here is logged and
    /// swallowed; the primary response never depends on it.
    async fn archive(&self, file_id: &str, payload: &TransformOutput) -> Option<String> {
        let store = self.archive.as_ref()?;
        let key = format!("outputs/{file_id}.result");

        let json = match serde_json::to_vec_pretty(payload) {
            Ok(json) => json,
            Err(e) => {
                warn!(file_id, error = %e, "result not archivable, skipping");
                return None;
            }
        };

        match store.put_object(&key, json, "application/json").await {
            Ok(()) => {
                info!(file_id, key, "archived result to object store");
                Some(key)
            }
            Err(e) => {
                warn!(file_id, key, error = %e, "result archive failed, continuing without it");
                None
            }
        }
    }
}

/// The processing transform: size, SHA-256 digest and byte-frequency stats
/// over the first 1000 bytes. Deterministic, no shared state, safe under
/// unbounded concurrent invocation against the same input.
pub fn transform(bytes: &[u8], file_id: &str) -> TransformOutput {
    let started = Instant::now();

    let checksum = hex::encode(Sha256::digest(bytes));

    let mut counts = [0u64; 256];
    for &b in bytes.iter().take(1000) {
        counts[b as usize] += 1;
    }

    let mut unique_bytes = 0;
    let mut most_common_byte = 0u8;
    let mut best = 0u64;
    for (byte, &count) in counts.iter().enumerate() {
        if count == 0 {
            continue;
        }
        unique_bytes += 1;
        if count > best {
            best = count;
            most_common_byte = byte as u8;
        }
    }

    TransformOutput {
        file_id: file_id.to_string(),
        file_size: bytes.len() as u64,
        checksum,
        unique_bytes,
        most_common_byte,
        processing_duration_ms: started.elapsed().as_millis() as u64,
        status: "success".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_is_deterministic() {
        let a = transform(b"abcabc", "f1");
        let b = transform(b"abcabc", "f1");
        assert_eq!(a.checksum, b.checksum);
        assert_eq!(a.file_size, 6);
        assert_eq!(a.unique_bytes, 3);
        assert_eq!(a.most_common_byte, b'a');
        assert_eq!(a.status, "success");
    }

    #[test]
    fn test_transform_empty_input() {
        let out = transform(b"", "f2");
        assert_eq!(out.file_size, 0);
        assert_eq!(out.unique_bytes, 0);
        assert_eq!(out.most_common_byte, 0);
        // SHA-256 of the empty string
        assert_eq!(
            out.checksum,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_transform_samples_first_1000_bytes_only() {
        let mut data = vec![b'x'; 1000];
        data.extend_from_slice(&[1, 2, 3, 4]);
        let out = transform(&data, "f3");
        assert_eq!(out.unique_bytes, 1);
        assert_eq!(out.most_common_byte, b'x');
        assert_eq!(out.file_size, 1004);
    }
}
