/*!
 * Process Filesystem
 * Read-only pseudo-directory listing live processes
 *
 * The root lists one file per running process, named by pid. Reading a file
 * yields its JSON snapshot. Every mutation is rejected.
 */

use async_trait::async_trait;
use std::sync::Arc;

use super::registry::ProcessRegistry;
use super::types::Process;
use crate::core::id::next_backend_id;
use crate::core::types::{BackendId, Pid};
use crate::vfs::{ListenerTable, NodeRecord, StorageBackend, VfsError, VfsResult};

/// Id of the pseudo-directory root
pub const ROOT_ID: &str = "proc";

const INFO_MIME_TYPE: &str = "application/json";

/// Backend view of a [`ProcessRegistry`]
pub struct ProcessBackend {
    id: BackendId,
    listeners: Arc<ListenerTable>,
    registry: Arc<ProcessRegistry>,
}

impl ProcessBackend {
    pub fn new(registry: Arc<ProcessRegistry>) -> Self {
        Self {
            id: next_backend_id(),
            listeners: Arc::new(ListenerTable::new()),
            registry,
        }
    }

    fn process(&self, id: &str) -> VfsResult<Arc<Process>> {
        id.parse::<Pid>()
            .ok()
            .and_then(|pid| self.registry.get(pid))
            .ok_or_else(|| VfsError::NotFound(format!("no process {}", id)))
    }

    fn record(process: &Process) -> VfsResult<NodeRecord> {
        let size = serde_json::to_vec(&process.info())?.len() as u64;
        let pid = process.pid().to_string();
        let mut record = NodeRecord::file(pid.clone(), pid.clone(), INFO_MIME_TYPE, size)
            .with_url(format!("proc:{}", pid));
        record.created = process.started();
        record.last_modified = process.started();
        Ok(record)
    }

    fn read_only(&self, what: &str) -> VfsError {
        VfsError::NotSupported(format!("process table is read-only: {}", what))
    }
}

#[async_trait]
impl StorageBackend for ProcessBackend {
    fn id(&self) -> BackendId {
        self.id
    }

    fn kind(&self) -> &str {
        "proc"
    }

    fn listener_table(&self) -> &ListenerTable {
        &self.listeners
    }

    fn volatile(&self) -> bool {
        true
    }

    async fn root(&self) -> VfsResult<NodeRecord> {
        Ok(NodeRecord::directory(ROOT_ID, ""))
    }

    async fn stat(&self, id: &str) -> VfsResult<NodeRecord> {
        if id == ROOT_ID {
            return self.root().await;
        }
        let process = self.process(id)?;
        Self::record(&process)
    }

    async fn children(&self, id: &str) -> VfsResult<Vec<NodeRecord>> {
        if id != ROOT_ID {
            self.process(id)?;
            return Err(VfsError::NotSupported(format!("process {} is not a directory", id)));
        }
        self.registry
            .list()
            .iter()
            .map(|process| Self::record(process))
            .collect()
    }

    async fn read_content(&self, id: &str) -> VfsResult<Vec<u8>> {
        Ok(serde_json::to_vec(&self.process(id)?.info())?)
    }

    async fn write(&self, id: &str, _data: &[u8]) -> VfsResult<Vec<u8>> {
        Err(self.read_only(&format!("write {}", id)))
    }

    async fn add_file(
        &self,
        _parent: &str,
        _data: &[u8],
        name: &str,
        _mime_type: &str,
    ) -> VfsResult<NodeRecord> {
        Err(self.read_only(&format!("create {}", name)))
    }

    async fn add_directory(&self, _parent: &str, name: &str) -> VfsResult<NodeRecord> {
        Err(self.read_only(&format!("create {}", name)))
    }

    async fn rename(&self, id: &str, _new_name: &str) -> VfsResult<NodeRecord> {
        Err(self.read_only(&format!("rename {}", id)))
    }

    async fn delete(&self, id: &str) -> VfsResult<()> {
        Err(self.read_only(&format!("delete {}", id)))
    }

    async fn copy(&self, id: &str, _target_parent: &str) -> VfsResult<NodeRecord> {
        Err(self.read_only(&format!("copy {}", id)))
    }

    async fn move_node(&self, id: &str, _target_parent: &str) -> VfsResult<NodeRecord> {
        Err(self.read_only(&format!("move {}", id)))
    }
}
