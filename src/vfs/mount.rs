/*!
 * Mount Manager
 * Grafts backend roots onto named slots of host directories
 *
 * Mounts are resolved at lookup time: listing a host directory injects one
 * extra child per mount registered on it. Duplicate names on the same host
 * are allowed; the first registration wins, and a mount shadows a stored
 * child of the same name.
 */

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use super::node::BackendNode;
use super::observable::{FileEvent, Listeners};
use super::paths::validate_name;
use super::traits::{
    chain_below, relocate, search_tree, Node, NodeExt, NodeKey, NodeRef, StorageBackend,
};
use super::types::*;

/// One grafted backend
#[derive(Clone)]
pub struct MountEntry {
    /// Identity of the host directory
    pub host: NodeKey,
    pub backend: Arc<dyn StorageBackend>,
    pub name: String,
}

impl std::fmt::Debug for MountEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountEntry")
            .field("host", &self.host)
            .field("backend", &self.backend.kind())
            .field("name", &self.name)
            .finish()
    }
}

/// Mount table shared by every node of one tree
///
/// Cheap to clone; clones share entries. There is no unmount.
#[derive(Clone, Default)]
pub struct MountTable {
    entries: Arc<RwLock<Vec<MountEntry>>>,
}

impl MountTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `backend` under `name` in the directory identified by `host`
    pub fn mount(
        &self,
        host: NodeKey,
        backend: Arc<dyn StorageBackend>,
        name: &str,
    ) -> VfsResult<()> {
        validate_name(name)?;
        info!(host = %host, name, backend = backend.kind(), "Mounting backend");
        self.entries.write().push(MountEntry {
            host,
            backend,
            name: name.to_string(),
        });
        Ok(())
    }

    /// Mounts registered on `host`, first registration first, duplicates dropped
    pub fn mounts_at(&self, host: &NodeKey) -> Vec<MountEntry> {
        let mut seen = HashSet::new();
        self.entries
            .read()
            .iter()
            .filter(|entry| entry.host == *host && seen.insert(entry.name.clone()))
            .cloned()
            .collect()
    }

    /// All registrations in insertion order
    pub fn entries(&self) -> Vec<MountEntry> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Directory view that injects mounted roots into listings
#[derive(Clone)]
pub struct MountNode {
    inner: NodeRef,
    parent: Option<NodeRef>,
    table: MountTable,
}

impl MountNode {
    /// Wrap the root of a tree
    pub fn root(inner: NodeRef, table: MountTable) -> NodeRef {
        Arc::new(Self {
            inner,
            parent: None,
            table,
        })
    }

    fn wrap(&self, inner: NodeRef, parent: NodeRef) -> NodeRef {
        Arc::new(Self {
            inner,
            parent: Some(parent),
            table: self.table.clone(),
        })
    }

    fn as_node_ref(&self) -> NodeRef {
        Arc::new(self.clone())
    }

    /// Mounted roots that belong in this directory's listing
    async fn mounted_children(&self) -> VfsResult<Vec<NodeRef>> {
        let this = self.as_node_ref();
        let mut roots = Vec::new();
        for entry in self.table.mounts_at(&self.inner.key()) {
            let root =
                BackendNode::mounted(Arc::clone(&entry.backend), &entry.name, Arc::clone(&this))
                    .await?;
            roots.push(self.wrap(Arc::new(root), Arc::clone(&this)));
        }
        Ok(roots)
    }
}

#[async_trait]
impl Node for MountNode {
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
        if !self.inner.is_directory() || self.table.mounts_at(&self.inner.key()).is_empty() {
            return self.inner.read(params).await;
        }
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
        let mounted = self.mounted_children().await?;
        let shadowed: HashSet<String> = mounted.iter().map(|m| m.name()).collect();

        let mut children: Vec<NodeRef> = self
            .inner
            .children()
            .await?
            .into_iter()
            .filter(|child| !shadowed.contains(&child.name()))
            .map(|child| self.wrap(child, Arc::clone(&this)))
            .collect();
        children.extend(mounted);
        Ok(children)
    }

    async fn add_file(&self, data: &[u8], name: &str, mime_type: &str) -> VfsResult<NodeRef> {
        let created = self.inner.add_file(data, name, mime_type).await?;
        Ok(self.wrap(created, self.as_node_ref()))
    }

    async fn add_directory(&self, name: &str) -> VfsResult<NodeRef> {
        let created = self.inner.add_directory(name).await?;
        Ok(self.wrap(created, self.as_node_ref()))
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
        if !self.table.is_empty() {
            // Mounted subtrees are only visible through this layer's listings
            return search_tree(self.as_node_ref(), query).await;
        }
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
                    .fold(Arc::clone(&this), |parent, node| self.wrap(node, parent))
            })
            .collect())
    }
}
