use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::config::AppConfig;
use crate::services::shared_fs::SharedFs;

/// Open the shared filesystem mount and ensure the standard layout exists.
/// A failure here is environment-level (unusable mount) and fatal: the
/// process refuses to serve rather than fail every request later.
pub async fn setup_shared_fs(config: &AppConfig) -> anyhow::Result<Arc<SharedFs>> {
    let shared_fs = SharedFs::mount(config.shared_fs_root.clone())
        .await
        .with_context(|| {
            format!(
                "shared filesystem mount failed at {}",
                config.shared_fs_root.display()
            )
        })?;

    info!("📁 Shared filesystem root: {}", config.shared_fs_root.display());
    Ok(Arc::new(shared_fs))
}
