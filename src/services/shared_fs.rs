use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("failed to prepare shared directory {path}: {source}")]
    Mount {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("read failed for {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("write failed for {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level areas of the shared filesystem layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    Models,
    Inputs,
    Outputs,
}

impl Area {
    pub const ALL: [Area; 3] = [Area::Models, Area::Inputs, Area::Outputs];

    pub fn dir_name(&self) -> &'static str {
        match self {
            Area::Models => "models",
            Area::Inputs => "inputs",
            Area::Outputs => "outputs",
        }
    }
}

/// A file that has been committed to its final path.
/// Invariant: anything described by this struct is complete — readers can
/// never observe a partially written file at `path`.
#[derive(Debug, Clone)]
pub struct Materialized {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// An in-flight write. The content lives in a uniquely named temp file in the
/// same directory as its eventual final path and is invisible to readers
/// until `SharedFs::commit` renames it into place.
pub struct TempFile {
    path: PathBuf,
    file: fs::File,
}

impl TempFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<(), FsError> {
        self.file.write_all(bytes).await.map_err(|e| FsError::Write {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Abandon the write and remove the temp file. Best-effort: a temp file
    /// left behind is invisible to readers and harmless.
    pub async fn discard(self) {
        drop(self.file);
        let _ = fs::remove_file(&self.path).await;
    }
}

/// Path-addressable byte storage on a filesystem reachable by every worker.
/// All cross-worker coordination goes through here; no other state is shared.
pub struct SharedFs {
    root: PathBuf,
}

impl SharedFs {
    /// Open the shared filesystem and create the standard layout
    /// (models/, inputs/, outputs/). Directory creation is idempotent;
    /// failure here means the mount itself is unusable.
    pub async fn mount(root: impl Into<PathBuf>) -> Result<Self, FsError> {
        let shared = Self { root: root.into() };
        shared.ensure_layout().await?;
        Ok(shared)
    }

    pub async fn ensure_layout(&self) -> Result<(), FsError> {
        for area in Area::ALL {
            let dir = self.area_dir(area);
            fs::create_dir_all(&dir).await.map_err(|e| FsError::Mount {
                path: dir.clone(),
                source: e,
            })?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn area_dir(&self, area: Area) -> PathBuf {
        self.root.join(area.dir_name())
    }

    /// Resolve a sanitized filename inside an area. Resolution is purely
    /// deterministic: the same inputs always name the same path.
    pub fn resolve(&self, area: Area, filename: &str) -> PathBuf {
        self.area_dir(area).join(filename)
    }

    /// Metadata of a committed file, or None if nothing is visible at `path`.
    pub async fn stat(&self, path: &Path) -> Option<Materialized> {
        match fs::metadata(path).await {
            Ok(md) if md.is_file() => Some(Materialized {
                path: path.to_path_buf(),
                size_bytes: md.len(),
                created_at: md
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now()),
            }),
            _ => None,
        }
    }

    /// Read the full contents of a committed file.
    pub async fn read(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FsError::NotFound(path.to_path_buf())
            } else {
                FsError::Read {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })
    }

    /// Start a write targeting `final_path`. The temp file is created in the
    /// same directory as the final path so the later rename never crosses a
    /// filesystem boundary. Its `.tmp-<uuid>` name cannot collide with
    /// committed files (leading dots are rejected during sanitization).
    pub async fn begin_write(&self, final_path: &Path) -> Result<TempFile, FsError> {
        let dir = final_path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir).await.map_err(|e| FsError::Mount {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let temp_path = dir.join(format!(".tmp-{}", Uuid::new_v4()));
        let file = fs::File::create(&temp_path).await.map_err(|e| FsError::Write {
            path: temp_path.clone(),
            source: e,
        })?;

        debug!(temp = %temp_path.display(), "opened temp file");
        Ok(TempFile {
            path: temp_path,
            file,
        })
    }

    /// Flush the temp file to stable storage and rename it onto `final_path`.
    ///
    /// Precondition: `temp` was created via `begin_write(final_path)`, i.e.
    /// both paths share a directory — rename is only atomic within one.
    ///
    /// This is the sole operation that makes content visible at its logical
    /// path. Readers see either the complete prior file or the complete new
    /// one, never a mixture. If two writers race on the same final path, each
    /// renames a complete temp file, so whichever lands last the result is
    /// one valid file.
    pub async fn commit(&self, mut temp: TempFile, final_path: &Path) -> Result<Materialized, FsError> {
        debug_assert_eq!(temp.path.parent(), final_path.parent());

        let flushed = async {
            temp.file.flush().await?;
            temp.file.sync_all().await
        }
        .await;

        if let Err(e) = flushed {
            let err = FsError::Write {
                path: temp.path.clone(),
                source: e,
            };
            temp.discard().await;
            return Err(err);
        }

        if let Err(e) = fs::rename(&temp.path, final_path).await {
            let err = FsError::Write {
                path: final_path.to_path_buf(),
                source: e,
            };
            temp.discard().await;
            return Err(err);
        }

        debug!(path = %final_path.display(), "committed");
        self.stat(final_path).await.ok_or_else(|| FsError::NotFound(final_path.to_path_buf()))
    }
}
