/*!
 * VFS Initialization
 * Boots the standard tree: root store, mounts and standard directories
 */

use std::sync::Arc;
use tracing::{info, warn};

use super::fs::Vfs;
use super::memory::MemoryBackend;
use super::paths::{self, mounts, standard_directories};
use super::sqlite::SqliteBackend;
use super::traits::StorageBackend;
use super::types::*;
use crate::core::config::KernelConfig;
use crate::process::{ProcessBackend, ProcessRegistry};

/// Initialize the filesystem with every layer, standard mounts and directories
pub async fn init_vfs(config: &KernelConfig, registry: Arc<ProcessRegistry>) -> VfsResult<Vfs> {
    info!("Initializing VFS with standard directory structure");

    let backend: Arc<dyn StorageBackend> = match &config.storage_path {
        Some(path) => {
            info!(storage_path = %path.display(), "Opening durable root store");
            Arc::new(SqliteBackend::open(path)?)
        }
        None => {
            info!("No storage path configured, root tree is in-memory");
            Arc::new(MemoryBackend::new())
        }
    };

    let vfs = Vfs::builder(backend)
        .with_mounts()
        .with_cache()
        .with_links()
        .build()
        .await?;

    info!("Mounting in-memory filesystem at /{}", mounts::TMP);
    vfs.mount(&[], Arc::new(MemoryBackend::new()), mounts::TMP)
        .await?;

    info!("Mounting process table at /{}", mounts::PROC);
    vfs.mount(&[], Arc::new(ProcessBackend::new(registry)), mounts::PROC)
        .await?;

    create_standard_directories(&vfs).await?;

    info!("VFS initialization complete");
    Ok(vfs)
}

/// Create all standard directories in the filesystem
async fn create_standard_directories(vfs: &Vfs) -> VfsResult<()> {
    info!("Creating standard directory structure");

    let dirs = standard_directories();
    let total = dirs.len();
    let mut created = 0;
    let mut existed = 0;

    for dir in dirs {
        let mut segments = paths::parse(dir);
        let Some(name) = segments.pop() else {
            continue;
        };
        let parent = vfs.get_file(&segments).await?;

        match parent.add_directory(&name).await {
            Ok(_) => created += 1,
            Err(VfsError::AlreadyExists(_)) => existed += 1,
            Err(e) => {
                warn!(path = %dir, error = %e, "Failed to create directory");
            }
        }
    }

    info!(
        created = created,
        existed = existed,
        total = total,
        "Standard directory structure ready"
    );
    Ok(())
}
