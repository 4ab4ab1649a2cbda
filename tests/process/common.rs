/*!
 * Shared fixtures for process tests
 */

use std::sync::Arc;
use std::time::Duration;

use vfs_kernel::vfs::NodeExt;
use vfs_kernel::{
    init_vfs, KernelConfig, Node, NodeRef, ProcessConfig, ProcessManager, ProcessRegistry,
    RhaiEngine, Vfs,
};

pub struct Kernel {
    pub vfs: Vfs,
    pub manager: ProcessManager,
    pub registry: Arc<ProcessRegistry>,
    pub stdout: NodeRef,
    pub stderr: NodeRef,
}

impl Kernel {
    pub async fn boot() -> Self {
        let registry = Arc::new(ProcessRegistry::new());
        let vfs = init_vfs(&KernelConfig::new(), Arc::clone(&registry))
            .await
            .unwrap();
        let tmp = vfs.get_path("/tmp").await.unwrap();
        let stdout = tmp.add_file(b"", "stdout", "text/plain").await.unwrap();
        let stderr = tmp.add_file(b"", "stderr", "text/plain").await.unwrap();
        let manager = ProcessManager::new(
            vfs.clone(),
            Arc::new(RhaiEngine::new()),
            Arc::clone(&registry),
        );
        Self {
            vfs,
            manager,
            registry,
            stdout,
            stderr,
        }
    }

    /// Store `source` as `/bin/<name>.rhai`
    pub async fn install(&self, name: &str, source: &str) {
        let bin = self.vfs.get_path("/bin").await.unwrap();
        bin.add_file(source.as_bytes(), &format!("{}.rhai", name), "text/plain")
            .await
            .unwrap();
    }

    pub async fn create(&self, path: &str, content: &str) -> NodeRef {
        let mut segments = vfs_kernel::vfs::paths::parse(path);
        let name = segments.pop().unwrap();
        let dir = self.vfs.get_file(&segments).await.unwrap();
        dir.add_file(content.as_bytes(), &name, "text/plain").await.unwrap()
    }

    pub fn config(&self, executable: &str) -> ProcessConfig {
        ProcessConfig::new(
            executable,
            Arc::clone(&self.stdout),
            Arc::clone(&self.stderr),
        )
    }

    pub async fn stdout(&self) -> String {
        String::from_utf8(self.stdout.read_all().await.unwrap()).unwrap()
    }

    pub async fn stderr(&self) -> String {
        String::from_utf8(self.stderr.read_all().await.unwrap()).unwrap()
    }

    pub async fn text(&self, path: &str) -> String {
        let node = self.vfs.get_path(path).await.unwrap();
        String::from_utf8(node.read_all().await.unwrap()).unwrap()
    }

    /// Wait until every process, children included, has been torn down
    pub async fn settle(&self) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while !self.registry.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("processes did not finish");
    }
}
