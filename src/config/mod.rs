use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for the ingestion and processing workers
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Root of the shared filesystem mount (default: /mnt/shared)
    pub shared_fs_root: PathBuf,

    /// Maximum payload size in bytes accepted for materialization (default: 1 GiB)
    pub max_object_size: u64,

    /// Archive processing results back to the object store (default: false)
    pub enable_archive: bool,

    /// Object-key prefixes accepted from storage-created events
    pub event_key_prefixes: Vec<String>,

    /// Wall-clock budget for a single request (default: 300 s)
    pub request_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            shared_fs_root: PathBuf::from("/mnt/shared"),
            max_object_size: 1024 * 1024 * 1024, // 1 GiB
            enable_archive: false,
            event_key_prefixes: vec!["models/".to_string(), "inputs/".to_string()],
            request_timeout: Duration::from_secs(300),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            shared_fs_root: env::var("SHARED_FS_ROOT")
                .map(PathBuf::from)
                .unwrap_or(default.shared_fs_root),

            max_object_size: env::var("MAX_OBJECT_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_object_size),

            enable_archive: env::var("ENABLE_ARCHIVE")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(default.enable_archive),

            event_key_prefixes: env::var("EVENT_KEY_PREFIXES")
                .map(|v| {
                    v.split(',')
                        .map(|p| p.trim().to_string())
                        .filter(|p| !p.is_empty())
                        .collect()
                })
                .unwrap_or(default.event_key_prefixes),

            request_timeout: env::var("REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.request_timeout),
        }
    }

    /// Create config for tests and local development (tight limits, fast timeout)
    pub fn development(shared_fs_root: impl Into<PathBuf>) -> Self {
        Self {
            shared_fs_root: shared_fs_root.into(),
            max_object_size: 64 * 1024 * 1024,
            enable_archive: false,
            event_key_prefixes: vec!["models/".to_string(), "inputs/".to_string()],
            request_timeout: Duration::from_secs(30),
        }
    }
}
