/*!
 * Shared fixtures for filesystem tests
 */

use std::sync::Arc;
use tempfile::TempDir;

use vfs_kernel::vfs::{MemoryBackend, Node, NodeExt, NodeRef, SqliteBackend, StorageBackend, Vfs};

/// Tree built over one backend, with every layer
pub async fn layered(backend: Arc<dyn StorageBackend>) -> Vfs {
    Vfs::builder(backend)
        .with_mounts()
        .with_cache()
        .with_links()
        .build()
        .await
        .unwrap()
}

/// Roots to run the same scenario against: bare memory, bare sqlite, fully layered
pub async fn roots() -> (Vec<(&'static str, NodeRef)>, TempDir) {
    let temp = TempDir::new().unwrap();
    let sqlite = Arc::new(SqliteBackend::open(temp.path().join("tree.db")).unwrap());

    let bare_memory = Vfs::builder(Arc::new(MemoryBackend::new()))
        .build()
        .await
        .unwrap();
    let bare_sqlite = Vfs::builder(sqlite).build().await.unwrap();
    let full = layered(Arc::new(MemoryBackend::new())).await;

    let roots = vec![
        ("memory", bare_memory.root()),
        ("sqlite", bare_sqlite.root()),
        ("layered", full.root()),
    ];
    (roots, temp)
}

/// Child names, reference links excluded
pub async fn names(dir: &NodeRef) -> Vec<String> {
    let mut names: Vec<String> = dir
        .children()
        .await
        .unwrap()
        .iter()
        .filter(|child| !child.is_link())
        .map(|child| child.name())
        .collect();
    names.sort();
    names
}
