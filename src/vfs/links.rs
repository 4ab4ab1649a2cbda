/*!
 * Reference Links
 * Synthetic `.` and `..` entries that point back into the tree
 *
 * A link is a read-only file carrying `LINK_MIME_TYPE`; its content is the
 * JSON array of path segments it points to. Path resolution follows links
 * by walking that target from the root again.
 */

use async_trait::async_trait;
use std::sync::Arc;

use super::observable::{FileEvent, Listeners};
use super::traits::{chain_below, relocate, Node, NodeExt, NodeKey, NodeRef, StorageBackend};
use super::types::*;
use crate::core::limits::LINK_MIME_TYPE;
use crate::core::types::BackendId;

/// Name of the self link
pub const SELF_LINK: &str = ".";

/// Name of the parent link
pub const PARENT_LINK: &str = "..";

/// Links belong to no storage medium
const LINK_BACKEND: BackendId = BackendId(0);

/// Decode the target of a link node
pub async fn read_link(node: &dyn Node) -> VfsResult<Vec<String>> {
    let bytes = node.read(&ReadParams::full()).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Directory view that adds `.` and `..` to every listing
#[derive(Clone)]
pub struct LinkNode {
    inner: NodeRef,
    parent: Option<NodeRef>,
}

impl LinkNode {
    /// Wrap the root of a tree
    pub fn root(inner: NodeRef) -> NodeRef {
        Arc::new(Self {
            inner,
            parent: None,
        })
    }

    fn wrap(inner: NodeRef, parent: NodeRef) -> NodeRef {
        Arc::new(Self {
            inner,
            parent: Some(parent),
        })
    }

    fn as_node_ref(&self) -> NodeRef {
        Arc::new(self.clone())
    }

    fn links(&self, this: &NodeRef) -> Vec<NodeRef> {
        let mut links = vec![LinkFile::new(Arc::clone(this), SELF_LINK, self.path())];
        if let Some(parent) = &self.parent {
            links.push(LinkFile::new(Arc::clone(this), PARENT_LINK, parent.path()));
        }
        links
    }
}

#[async_trait]
impl Node for LinkNode {
    fn record(&self) -> NodeRecord {
        self.inner.record()
    }

    fn key(&self) -> NodeKey {
        self.inner.key()
    }

    fn parent(&self) -> Option<NodeRef> {
        self.parent.clone()
    }

    fn backend(&self) -> Option<Arc<dyn StorageBackend>> {
        self.inner.backend()
    }

    fn listeners(&self) -> Listeners {
        self.inner.listeners()
    }

    fn notify(&self, event: &FileEvent) {
        self.inner.notify(event);
    }

    fn invalidate(&self) {
        self.inner.invalidate();
    }

    async fn read(&self, params: &ReadParams) -> VfsResult<Vec<u8>> {
        if !self.inner.is_directory() {
            return self.inner.read(params).await;
        }
        // Keep the byte listing in step with children(), links included
        let records: Vec<NodeRecord> = self.children().await?.iter().map(|c| c.record()).collect();
        Ok(params.apply(encode_listing(&records)?))
    }

    async fn write(&self, data: &[u8]) -> VfsResult<Vec<u8>> {
        self.inner.write(data).await
    }

    async fn rename(&self, new_name: &str) -> VfsResult<()> {
        self.inner.rename(new_name).await
    }

    async fn delete(&self) -> VfsResult<()> {
        self.inner.delete().await
    }

    async fn children(&self) -> VfsResult<Vec<NodeRef>> {
        let this = self.as_node_ref();
        let mut children: Vec<NodeRef> = self
            .inner
            .children()
            .await?
            .into_iter()
            .map(|child| Self::wrap(child, Arc::clone(&this)))
            .collect();
        children.extend(self.links(&this));
        Ok(children)
    }

    async fn add_file(&self, data: &[u8], name: &str, mime_type: &str) -> VfsResult<NodeRef> {
        let created = self.inner.add_file(data, name, mime_type).await?;
        Ok(Self::wrap(created, self.as_node_ref()))
    }

    async fn add_directory(&self, name: &str) -> VfsResult<NodeRef> {
        let created = self.inner.add_directory(name).await?;
        Ok(Self::wrap(created, self.as_node_ref()))
    }

    async fn copy_to(&self, target: NodeRef) -> VfsResult<NodeRef> {
        let created = self.inner.copy_to(Arc::clone(&target)).await?;
        relocate(&target, &created).await
    }

    async fn move_to(&self, target: NodeRef) -> VfsResult<NodeRef> {
        let moved = self.inner.move_to(Arc::clone(&target)).await?;
        relocate(&target, &moved).await
    }

    async fn search(&self, query: &str) -> VfsResult<Vec<NodeRef>> {
        let anchor = self.inner.key();
        let this = self.as_node_ref();
        Ok(self
            .inner
            .search(query)
            .await?
            .into_iter()
            .map(|hit| {
                chain_below(hit, &anchor)
                    .into_iter()
                    .fold(Arc::clone(&this), |parent, node| Self::wrap(node, parent))
            })
            .collect())
    }
}

/// One synthetic link entry
pub struct LinkFile {
    parent: NodeRef,
    record: NodeRecord,
    target: Vec<String>,
    listeners: Listeners,
}

impl LinkFile {
    fn new(parent: NodeRef, name: &str, target: Vec<String>) -> NodeRef {
        let id = format!("link:{}:{}", parent.key(), name);
        let size = serde_json::to_vec(&target).map(|b| b.len() as u64).unwrap_or(0);
        Arc::new(Self {
            record: NodeRecord::file(id, name, LINK_MIME_TYPE, size),
            parent,
            target,
            listeners: Listeners::new(),
        })
    }

    fn read_only(&self) -> VfsError {
        VfsError::NotSupported(format!("{} is a reference link", self.path_string()))
    }
}

#[async_trait]
impl Node for LinkFile {
    fn record(&self) -> NodeRecord {
        self.record.clone()
    }

    fn key(&self) -> NodeKey {
        NodeKey::new(LINK_BACKEND, self.record.id.clone())
    }

    fn parent(&self) -> Option<NodeRef> {
        Some(Arc::clone(&self.parent))
    }

    fn backend(&self) -> Option<Arc<dyn StorageBackend>> {
        None
    }

    fn listeners(&self) -> Listeners {
        self.listeners.clone()
    }

    fn notify(&self, event: &FileEvent) {
        self.listeners.emit(event);
        self.parent.notify(event);
    }

    async fn read(&self, params: &ReadParams) -> VfsResult<Vec<u8>> {
        Ok(params.apply(serde_json::to_vec(&self.target)?))
    }

    async fn write(&self, _data: &[u8]) -> VfsResult<Vec<u8>> {
        Err(self.read_only())
    }

    async fn rename(&self, _new_name: &str) -> VfsResult<()> {
        Err(self.read_only())
    }

    async fn delete(&self) -> VfsResult<()> {
        Err(self.read_only())
    }

    async fn children(&self) -> VfsResult<Vec<NodeRef>> {
        Err(self.read_only())
    }

    async fn add_file(&self, _data: &[u8], _name: &str, _mime_type: &str) -> VfsResult<NodeRef> {
        Err(self.read_only())
    }

    async fn add_directory(&self, _name: &str) -> VfsResult<NodeRef> {
        Err(self.read_only())
    }

    async fn copy_to(&self, _target: NodeRef) -> VfsResult<NodeRef> {
        Err(self.read_only())
    }

    async fn move_to(&self, _target: NodeRef) -> VfsResult<NodeRef> {
        Err(self.read_only())
    }

    async fn search(&self, _query: &str) -> VfsResult<Vec<NodeRef>> {
        Err(self.read_only())
    }
}
