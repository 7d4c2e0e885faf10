use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::services::object_store::{ObjectStore, ObjectStoreError};
use crate::services::shared_fs::{Area, FsError, SharedFs};
use crate::utils::validation::sanitize_filename;

/// The two ways a materialization can be triggered: a storage-created event
/// pushed by the object store, or a direct client request. Matched exactly
/// once, at `handle_trigger`.
#[derive(Debug, Clone)]
pub enum IngestTrigger {
    StorageEvent {
        key: String,
    },
    DirectRequest {
        key: Option<String>,
        data: Option<String>,
        filename: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MaterializeStatus {
    Created,
    Exists,
}

/// Identifies a materialized file. 1:1 with the file on the shared
/// filesystem and durable as long as the file exists: the id is derived from
/// the final path, so every materialization of the same logical name yields
/// the same identifier.
#[derive(Debug, Clone)]
pub struct FileIdentifier {
    pub file_id: Uuid,
    pub source_key: Option<String>,
    pub materialized_path: PathBuf,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub status: MaterializeStatus,
}

/// Stages of a single materialization. The short-circuit for an existing
/// file jumps from Validating straight to Committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Validating,
    Fetching,
    Writing,
    Committed,
}

impl IngestStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStage::Validating => "validating",
            IngestStage::Fetching => "fetching",
            IngestStage::Writing => "writing",
            IngestStage::Committed => "committed",
        }
    }
}

impl std::fmt::Display for IngestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("source object not found: {key}")]
    SourceNotFound { key: String },

    #[error("access denied to source object: {key}")]
    AccessDenied { key: String },

    #[error("payload of {actual} bytes exceeds the {max} byte limit")]
    SizeLimitExceeded { actual: u64, max: u64 },

    #[error("filesystem write failed during {stage}: {source}")]
    WriteFailed {
        stage: IngestStage,
        #[source]
        source: FsError,
    },

    #[error("object store error: {0}")]
    Store(#[source] ObjectStoreError),
}

/// Where the bytes for a materialization come from.
pub enum ByteSource {
    Store { key: String },
    Inline { bytes: Vec<u8> },
}

impl ByteSource {
    fn key(&self) -> Option<&str> {
        match self {
            ByteSource::Store { key } => Some(key),
            ByteSource::Inline { .. } => None,
        }
    }
}

/// Stateless worker that materializes externally-sourced content onto the
/// shared filesystem. Holds no per-request state; any number of instances or
/// concurrent calls behave identically.
pub struct IngestService {
    store: Arc<dyn ObjectStore>,
    shared_fs: Arc<SharedFs>,
    max_object_size: u64,
}

impl IngestService {
    pub fn new(store: Arc<dyn ObjectStore>, shared_fs: Arc<SharedFs>, config: &AppConfig) -> Self {
        Self {
            store,
            shared_fs,
            max_object_size: config.max_object_size,
        }
    }

    /// Entry point for both trigger shapes. Validation happens here, once;
    /// everything downstream deals in a resolved byte source.
    pub async fn handle_trigger(&self, trigger: IngestTrigger) -> Result<FileIdentifier, IngestError> {
        match trigger {
            IngestTrigger::StorageEvent { key } => {
                let source = ByteSource::Store { key: key.clone() };
                self.materialize(&key, source).await
            }
            IngestTrigger::DirectRequest {
                key: Some(_),
                data: Some(_),
                ..
            } => Err(IngestError::InvalidRequest(
                "Request body must contain either 'key' or 'data', not both".to_string(),
            )),
            IngestTrigger::DirectRequest { key: Some(key), .. } => {
                let source = ByteSource::Store { key: key.clone() };
                self.materialize(&key, source).await
            }
            IngestTrigger::DirectRequest {
                data: Some(data),
                filename,
                ..
            } => {
                let bytes = BASE64.decode(data.as_bytes()).map_err(|e| {
                    IngestError::InvalidRequest(format!("Field 'data' is not valid base64: {e}"))
                })?;
                let name = filename.unwrap_or_else(|| "data.bin".to_string());
                self.materialize(&name, ByteSource::Inline { bytes }).await
            }
            IngestTrigger::DirectRequest { .. } => Err(IngestError::InvalidRequest(
                "Request body must contain a 'key' or 'data' field".to_string(),
            )),
        }
    }

    /// Materialize `logical_name` onto the shared filesystem, idempotently.
    ///
    /// Committed files are immutable, so the existing-file check needs no
    /// lock: once a path is visible it stays complete and valid. Two
    /// concurrent calls that both miss the check each write their own temp
    /// file and race on the final rename; either way exactly one complete
    /// file ends up visible.
    pub async fn materialize(
        &self,
        logical_name: &str,
        source: ByteSource,
    ) -> Result<FileIdentifier, IngestError> {
        let (area, filename) = route_logical_name(logical_name)?;
        let final_path = self.shared_fs.resolve(area, &filename);

        debug!(
            stage = IngestStage::Validating.as_str(),
            logical_name,
            path = %final_path.display(),
            "resolved target path"
        );

        if let Some(existing) = self.shared_fs.stat(&final_path).await {
            info!(
                stage = IngestStage::Committed.as_str(),
                path = %final_path.display(),
                size_bytes = existing.size_bytes,
                "file already materialized, returning existing entry"
            );
            return Ok(FileIdentifier {
                file_id: file_id_for(&final_path),
                source_key: source.key().map(str::to_string),
                materialized_path: existing.path,
                size_bytes: existing.size_bytes,
                created_at: existing.created_at,
                status: MaterializeStatus::Exists,
            });
        }

        debug!(stage = IngestStage::Fetching.as_str(), logical_name, "fetching source bytes");
        let (bytes, source_key) = match source {
            ByteSource::Store { key } => {
                let object = self.store.get_object(&key).await.map_err(|e| match e {
                    ObjectStoreError::NotFound(_) => IngestError::SourceNotFound { key: key.clone() },
                    ObjectStoreError::AccessDenied(_) => IngestError::AccessDenied { key: key.clone() },
                    other => IngestError::Store(other),
                })?;
                (object.bytes, Some(key))
            }
            ByteSource::Inline { bytes } => (bytes, None),
        };

        // Size gate sits before any destination allocation: an oversized
        // payload leaves no temp file and no final file behind.
        if bytes.len() as u64 > self.max_object_size {
            return Err(IngestError::SizeLimitExceeded {
                actual: bytes.len() as u64,
                max: self.max_object_size,
            });
        }

        debug!(
            stage = IngestStage::Writing.as_str(),
            path = %final_path.display(),
            size_bytes = bytes.len(),
            "writing temp file"
        );
        let mut temp = self
            .shared_fs
            .begin_write(&final_path)
            .await
            .map_err(|e| IngestError::WriteFailed {
                stage: IngestStage::Writing,
                source: e,
            })?;

        if let Err(e) = temp.write_all(&bytes).await {
            temp.discard().await;
            return Err(IngestError::WriteFailed {
                stage: IngestStage::Writing,
                source: e,
            });
        }

        let materialized = self
            .shared_fs
            .commit(temp, &final_path)
            .await
            .map_err(|e| IngestError::WriteFailed {
                stage: IngestStage::Writing,
                source: e,
            })?;

        let file_id = file_id_for(&final_path);
        info!(
            stage = IngestStage::Committed.as_str(),
            file_id = %file_id,
            path = %materialized.path.display(),
            size_bytes = materialized.size_bytes,
            "materialized"
        );

        Ok(FileIdentifier {
            file_id,
            source_key,
            materialized_path: materialized.path,
            size_bytes: materialized.size_bytes,
            created_at: materialized.created_at,
            status: MaterializeStatus::Created,
        })
    }
}

/// File ids are UUIDv5 over the final path, so they are stable across
/// repeated materializations of the same logical name.
fn file_id_for(path: &Path) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, path.to_string_lossy().as_bytes())
}

/// Map a logical name onto a shared-filesystem area. `models/` and `inputs/`
/// prefixes route to their areas; everything else lands in `models/` under
/// its basename.
fn route_logical_name(logical_name: &str) -> Result<(Area, String), IngestError> {
    let (area, rest) = if let Some(rest) = logical_name.strip_prefix("models/") {
        (Area::Models, rest)
    } else if let Some(rest) = logical_name.strip_prefix("inputs/") {
        (Area::Inputs, rest)
    } else {
        (Area::Models, logical_name)
    };

    let filename =
        sanitize_filename(rest).map_err(|e| IngestError::InvalidRequest(e.to_string()))?;
    Ok((area, filename))
}
