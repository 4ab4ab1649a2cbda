/*!
 * In-Memory Filesystem Backend
 * Fast, volatile storage for testing and temporary trees
 */

mod dir_ops;
mod file_ops;
mod node;

use ahash::RandomState;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use dashmap::mapref::one::{Ref, RefMut};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

use super::observable::ListenerTable;
use super::traits::StorageBackend;
use super::types::*;
use crate::core::id::next_backend_id;
use crate::core::types::BackendId;
use node::{MemKind, MemNode};

/// Id of the root directory
pub const ROOT_ID: &str = "root";

/// In-memory filesystem backend
///
/// Nodes are keyed by id; each directory maps child names to ids. Content
/// locators are embedded `data:` URLs.
///
/// # Performance
/// - Cache-line aligned so the node map and mutation lock do not share a line with neighbours
#[repr(C, align(64))]
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    id: BackendId,
    listeners: Arc<ListenerTable>,
    pub(super) nodes: Arc<DashMap<String, MemNode, RandomState>>,
    /// Serializes structural mutations spanning several nodes
    pub(super) mutation: Arc<Mutex<()>>,
}

impl MemoryBackend {
    /// Create new in-memory backend with an empty root directory
    pub fn new() -> Self {
        let nodes = DashMap::with_hasher(RandomState::new());
        nodes.insert(
            ROOT_ID.to_string(),
            MemNode::directory(NodeRecord::directory(ROOT_ID, ""), None),
        );

        Self {
            id: next_backend_id(),
            listeners: Arc::new(ListenerTable::new()),
            nodes: Arc::new(nodes),
            mutation: Arc::new(Mutex::new(())),
        }
    }

    /// Number of stored nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub(super) fn node(&self, id: &str) -> VfsResult<Ref<'_, String, MemNode, RandomState>> {
        self.nodes
            .get(id)
            .ok_or_else(|| VfsError::NotFound(format!("memory node {}", id)))
    }

    pub(super) fn node_mut(
        &self,
        id: &str,
    ) -> VfsResult<RefMut<'_, String, MemNode, RandomState>> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| VfsError::NotFound(format!("memory node {}", id)))
    }

    /// Fresh node id
    pub(super) fn generate_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Embed content in a `data:` URL
pub(super) fn data_url(mime_type: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(data))
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn id(&self) -> BackendId {
        self.id
    }

    fn kind(&self) -> &str {
        "memory"
    }

    fn listener_table(&self) -> &ListenerTable {
        &self.listeners
    }

    async fn root(&self) -> VfsResult<NodeRecord> {
        self.stat_node(ROOT_ID)
    }

    async fn stat(&self, id: &str) -> VfsResult<NodeRecord> {
        self.stat_node(id)
    }

    async fn children(&self, id: &str) -> VfsResult<Vec<NodeRecord>> {
        self.list_children(id)
    }

    async fn read_content(&self, id: &str) -> VfsResult<Vec<u8>> {
        self.read_data(id)
    }

    async fn write(&self, id: &str, data: &[u8]) -> VfsResult<Vec<u8>> {
        self.write_data(id, data)
    }

    async fn add_file(
        &self,
        parent: &str,
        data: &[u8],
        name: &str,
        mime_type: &str,
    ) -> VfsResult<NodeRecord> {
        self.create_file(parent, data, name, mime_type)
    }

    async fn add_directory(&self, parent: &str, name: &str) -> VfsResult<NodeRecord> {
        self.create_dir(parent, name)
    }

    async fn rename(&self, id: &str, new_name: &str) -> VfsResult<NodeRecord> {
        self.rename_node(id, new_name)
    }

    async fn delete(&self, id: &str) -> VfsResult<()> {
        self.remove_node(id)
    }

    async fn copy(&self, id: &str, target_parent: &str) -> VfsResult<NodeRecord> {
        self.copy_node(id, target_parent)
    }

    async fn move_node(&self, id: &str, target_parent: &str) -> VfsResult<NodeRecord> {
        self.move_into(id, target_parent)
    }
}
