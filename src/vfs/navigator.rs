/*!
 * Navigator
 * Current-directory state with serialized mutations
 *
 * Every state-mutating operation takes the FIFO gate, runs, then refreshes
 * the current listing before releasing it, whether the operation succeeded
 * or failed. Read-only operations pass
 * through the gate once, so they observe every mutation queued before them.
 */

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::fs::Vfs;
use super::paths;
use super::traits::{NodeExt, NodeRef};
use super::types::*;

/// Navigation phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavPhase {
    Idle,
    Navigating,
}

struct NavState {
    phase: NavPhase,
    current_path: Vec<String>,
    current: NodeRef,
    listing: Vec<NodeRef>,
}

/// Tracks the current directory of one caller
pub struct Navigator {
    vfs: Vfs,
    gate: Mutex<()>,
    state: RwLock<NavState>,
}

impl Navigator {
    /// Start at the root
    pub async fn new(vfs: Vfs) -> VfsResult<Self> {
        let root = vfs.root();
        let listing = root.children().await?;
        Ok(Self {
            vfs,
            gate: Mutex::new(()),
            state: RwLock::new(NavState {
                phase: NavPhase::Idle,
                current_path: Vec::new(),
                current: root,
                listing,
            }),
        })
    }

    pub fn phase(&self) -> NavPhase {
        self.state.read().phase
    }

    pub fn current_path(&self) -> Vec<String> {
        self.state.read().current_path.clone()
    }

    pub fn current_path_string(&self) -> String {
        paths::format(&self.state.read().current_path)
    }

    /// Current directory node
    pub fn current(&self) -> NodeRef {
        Arc::clone(&self.state.read().current)
    }

    /// Listing captured by the last refresh
    pub fn listing(&self) -> Vec<NodeRef> {
        self.state.read().listing.clone()
    }

    /// Enter the directory at `path`, relative to the current one
    pub async fn change_directory(&self, path: &str) -> VfsResult<()> {
        let _turn = self.gate.lock().await;
        self.state.write().phase = NavPhase::Navigating;

        let result = self.enter(path).await;

        self.state.write().phase = NavPhase::Idle;
        result
    }

    async fn enter(&self, path: &str) -> VfsResult<()> {
        let node = self.vfs.resolve(&self.current_path(), path).await?;
        if !node.is_directory() {
            return Err(VfsError::NotFound(format!(
                "{} is not a directory",
                node.path_string()
            )));
        }
        {
            let mut state = self.state.write();
            state.current_path = node.path();
            state.current = node;
        }
        debug!(path = %self.current_path_string(), "Changed directory");
        self.refresh_locked().await
    }

    /// Drop cached entries for the current directory and list it again
    pub async fn refresh(&self) -> VfsResult<()> {
        let _turn = self.gate.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> VfsResult<()> {
        self.current().invalidate();
        let node = self.vfs.get_file(&self.current_path()).await?;
        let listing = node.children().await?;

        let mut state = self.state.write();
        state.current = node;
        state.listing = listing;
        Ok(())
    }

    /// Refresh after a mutation whether or not it succeeded
    ///
    /// The mutation's own error wins over a failed refresh.
    async fn finish<T>(&self, result: VfsResult<T>) -> VfsResult<T> {
        let refreshed = self.refresh_locked().await;
        match result {
            Ok(value) => refreshed.map(|()| value),
            Err(e) => {
                if let Err(refresh) = refreshed {
                    debug!(error = %refresh, "Refresh after failed mutation also failed");
                }
                Err(e)
            }
        }
    }

    pub async fn add_file(&self, data: &[u8], name: &str, mime_type: &str) -> VfsResult<NodeRef> {
        let _turn = self.gate.lock().await;
        let result = self.current().add_file(data, name, mime_type).await;
        self.finish(result).await
    }

    pub async fn add_directory(&self, name: &str) -> VfsResult<NodeRef> {
        let _turn = self.gate.lock().await;
        let result = self.current().add_directory(name).await;
        self.finish(result).await
    }

    pub async fn delete(&self, path: &str) -> VfsResult<()> {
        let _turn = self.gate.lock().await;
        let result = async {
            let node = self.vfs.resolve(&self.current_path(), path).await?;
            node.delete().await
        }
        .await;
        self.finish(result).await
    }

    pub async fn rename(&self, path: &str, new_name: &str) -> VfsResult<()> {
        let _turn = self.gate.lock().await;
        let result = async {
            let node = self.vfs.resolve(&self.current_path(), path).await?;
            node.rename(new_name).await
        }
        .await;
        self.finish(result).await
    }

    pub async fn write(&self, path: &str, data: &[u8]) -> VfsResult<Vec<u8>> {
        let _turn = self.gate.lock().await;
        let result = async {
            let node = self.vfs.resolve(&self.current_path(), path).await?;
            node.write(data).await
        }
        .await;
        self.finish(result).await
    }

    /// Copy `source` into the directory `target`
    pub async fn copy(&self, source: &str, target: &str) -> VfsResult<NodeRef> {
        let _turn = self.gate.lock().await;
        let result = async {
            let base = self.current_path();
            let node = self.vfs.resolve(&base, source).await?;
            let dir = self.vfs.resolve(&base, target).await?;
            node.copy_to(dir).await
        }
        .await;
        self.finish(result).await
    }

    /// Move `source` into the directory `target`
    pub async fn move_node(&self, source: &str, target: &str) -> VfsResult<NodeRef> {
        let _turn = self.gate.lock().await;
        let result = async {
            let base = self.current_path();
            let node = self.vfs.resolve(&base, source).await?;
            let dir = self.vfs.resolve(&base, target).await?;
            node.move_to(dir).await
        }
        .await;
        self.finish(result).await
    }

    /// Search below the current directory
    pub async fn search(&self, query: &str) -> VfsResult<Vec<NodeRef>> {
        drop(self.gate.lock().await);
        self.current().search(query).await
    }

    pub async fn get_file(&self, path: &str) -> VfsResult<NodeRef> {
        drop(self.gate.lock().await);
        self.vfs.resolve(&self.current_path(), path).await
    }

    pub async fn read(&self, path: &str) -> VfsResult<Vec<u8>> {
        let node = self.get_file(path).await?;
        node.read_all().await
    }
}
