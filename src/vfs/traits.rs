/*!
 * VFS Traits
 * Core filesystem abstraction traits
 */

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use super::observable::{FileEvent, ListenerId, ListenerTable, Listeners};
use super::paths;
use super::types::*;
use crate::core::types::BackendId;

/// Storage backend trait
///
/// Raw tree operations over one medium. Backends know nothing about mounts,
/// proxies or links; they operate purely on their own node identifiers.
/// Every operation fails with `NotFound` when the referenced node is gone and
/// with `AlreadyExists` when it would break per-directory name uniqueness.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Identity of this backend instance
    fn id(&self) -> BackendId;

    /// Short medium name for logs ("memory", "sqlite", ...)
    fn kind(&self) -> &str;

    /// Listener sets of this backend's nodes, shared by every handle
    fn listener_table(&self) -> &ListenerTable;

    /// True when listings change without going through this tree, so
    /// caching layers must not keep them
    fn volatile(&self) -> bool {
        false
    }

    /// Root directory record
    async fn root(&self) -> VfsResult<NodeRecord>;

    /// Current record for a node
    async fn stat(&self, id: &str) -> VfsResult<NodeRecord>;

    /// Records of a directory's children
    async fn children(&self, id: &str) -> VfsResult<Vec<NodeRecord>>;

    /// Stored bytes of a file
    async fn read_content(&self, id: &str) -> VfsResult<Vec<u8>>;

    /// Replace a file's content; returns the stored bytes
    async fn write(&self, id: &str, data: &[u8]) -> VfsResult<Vec<u8>>;

    /// Create a file under `parent`
    async fn add_file(
        &self,
        parent: &str,
        data: &[u8],
        name: &str,
        mime_type: &str,
    ) -> VfsResult<NodeRecord>;

    /// Create a directory under `parent`
    async fn add_directory(&self, parent: &str, name: &str) -> VfsResult<NodeRecord>;

    /// Rename a node in place
    async fn rename(&self, id: &str, new_name: &str) -> VfsResult<NodeRecord>;

    /// Delete a node and everything below it
    async fn delete(&self, id: &str) -> VfsResult<()>;

    /// Deep-copy a node into `target_parent`
    async fn copy(&self, id: &str, target_parent: &str) -> VfsResult<NodeRecord>;

    /// Re-parent a node under `target_parent`
    async fn move_node(&self, id: &str, target_parent: &str) -> VfsResult<NodeRecord>;

    /// Read a node; directories are synthesized from their children
    async fn read(&self, id: &str, params: &ReadParams) -> VfsResult<Vec<u8>> {
        let record = self.stat(id).await?;
        let bytes = if record.directory {
            encode_listing(&self.children(id).await?)?
        } else {
            self.read_content(id).await?
        };
        Ok(params.apply(bytes))
    }

    /// Find nodes below `id` whose name contains `query` (case-insensitive)
    async fn search(&self, id: &str, query: &str) -> VfsResult<Vec<SearchHit>> {
        let mut hits = Vec::new();
        let mut pending: Vec<(Vec<NodeRecord>, String)> = vec![(Vec::new(), id.to_string())];

        while let Some((ancestors, dir)) = pending.pop() {
            for child in self.children(&dir).await? {
                if name_matches(&child.name, query) {
                    hits.push(SearchHit {
                        ancestors: ancestors.clone(),
                        node: child.clone(),
                    });
                }
                if child.directory {
                    let mut chain = ancestors.clone();
                    chain.push(child.clone());
                    pending.push((chain, child.id.clone()));
                }
            }
        }
        Ok(hits)
    }
}

/// Shared handle to any node in any layer
pub type NodeRef = Arc<dyn Node>;

/// Node identity: backend instance plus the backend's own id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeKey {
    pub backend: BackendId,
    pub id: String,
}

impl NodeKey {
    pub fn new(backend: BackendId, id: impl Into<String>) -> Self {
        Self {
            backend,
            id: id.into(),
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.backend, self.id)
    }
}

/// File / Directory contract
///
/// Every layer (concrete backend nodes, mounts, proxies, links, pseudo
/// directories) implements this trait, so layers compose by wrapping.
/// Directory operations on a plain file fail with `NotFound` (descending
/// through a non-directory) or `NotSupported`.
#[async_trait]
pub trait Node: Send + Sync {
    /// Snapshot of this node's metadata
    fn record(&self) -> NodeRecord;

    /// Identity used for mounts, caching and equality
    fn key(&self) -> NodeKey;

    /// Parent in the same layer, `None` at the root
    fn parent(&self) -> Option<NodeRef>;

    /// Backend that stores this node, if any
    fn backend(&self) -> Option<Arc<dyn StorageBackend>>;

    /// Change listeners registered on this node
    fn listeners(&self) -> Listeners;

    /// Fire this node's listeners, then bubble to every ancestor
    fn notify(&self, event: &FileEvent);

    /// Drop cached listings held for this node and its ancestors
    fn invalidate(&self) {}

    async fn read(&self, params: &ReadParams) -> VfsResult<Vec<u8>>;

    async fn write(&self, data: &[u8]) -> VfsResult<Vec<u8>>;

    async fn rename(&self, new_name: &str) -> VfsResult<()>;

    async fn delete(&self) -> VfsResult<()>;

    async fn children(&self) -> VfsResult<Vec<NodeRef>>;

    async fn add_file(&self, data: &[u8], name: &str, mime_type: &str) -> VfsResult<NodeRef>;

    async fn add_directory(&self, name: &str) -> VfsResult<NodeRef>;

    /// Copy this node into the `target` directory
    async fn copy_to(&self, target: NodeRef) -> VfsResult<NodeRef>;

    /// Move this node into the `target` directory
    async fn move_to(&self, target: NodeRef) -> VfsResult<NodeRef>;

    /// Find nodes below this directory whose name contains `query`
    async fn search(&self, query: &str) -> VfsResult<Vec<NodeRef>>;
}

impl fmt::Debug for dyn Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("key", &self.key())
            .field("path", &self.path_string())
            .finish()
    }
}

/// Convenience accessors available on every node
#[async_trait]
pub trait NodeExt {
    fn name(&self) -> String;
    fn id(&self) -> String;
    fn is_directory(&self) -> bool;
    fn is_link(&self) -> bool;

    /// Segments from the root of this layer down to the node
    fn path(&self) -> Vec<String>;

    /// Path rendered as a string
    fn path_string(&self) -> String {
        paths::format(&self.path())
    }

    fn add_listener<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&FileEvent) + Send + Sync + 'static;

    fn remove_listener(&self, id: ListenerId) -> bool;

    /// Look up a direct child by name
    async fn child(&self, name: &str) -> VfsResult<NodeRef>;

    /// Read the whole content
    async fn read_all(&self) -> VfsResult<Vec<u8>>;
}

#[async_trait]
impl<N: Node + ?Sized> NodeExt for N {
    fn name(&self) -> String {
        self.record().name
    }

    fn id(&self) -> String {
        self.record().id
    }

    fn is_directory(&self) -> bool {
        self.record().directory
    }

    fn is_link(&self) -> bool {
        self.record().is_link()
    }

    fn path(&self) -> Vec<String> {
        let mut segments = Vec::new();
        let mut current = self.parent();
        if current.is_none() {
            return segments;
        }
        segments.push(self.name());
        while let Some(node) = current {
            let parent = node.parent();
            if parent.is_some() {
                segments.push(node.name());
            }
            current = parent;
        }
        segments.reverse();
        segments
    }

    fn add_listener<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&FileEvent) + Send + Sync + 'static,
    {
        self.listeners().add(callback)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners().remove(id)
    }

    async fn child(&self, name: &str) -> VfsResult<NodeRef> {
        self.children()
            .await?
            .into_iter()
            .find(|child| child.name() == name)
            .ok_or_else(|| {
                VfsError::NotFound(format!("{} has no entry {}", self.path_string(), name))
            })
    }

    async fn read_all(&self) -> VfsResult<Vec<u8>> {
        self.read(&ReadParams::full()).await
    }
}

/// Nodes between `anchor` (exclusive) and `node` (inclusive), top-down
///
/// Used by wrapping layers to re-parent nodes returned from an inner layer
/// (search hits, copy results) under their own wrapped ancestors.
pub fn chain_below(node: NodeRef, anchor: &NodeKey) -> Vec<NodeRef> {
    let mut chain = Vec::new();
    let mut current = Some(node);
    while let Some(n) = current {
        if n.key() == *anchor {
            break;
        }
        current = n.parent();
        chain.push(n);
    }
    chain.reverse();
    chain
}

/// Find `created` among `target`'s children as seen through `target`'s layers
pub async fn relocate(target: &NodeRef, created: &NodeRef) -> VfsResult<NodeRef> {
    let key = created.key();
    target
        .children()
        .await?
        .into_iter()
        .find(|child| child.key() == key)
        .ok_or_else(|| VfsError::NotFound(format!("{} vanished after creation", key)))
}

/// Depth-first name search through `root`'s own layer
///
/// Reference links are skipped and a directory already on the current
/// branch is not entered twice.
pub async fn search_tree(root: NodeRef, query: &str) -> VfsResult<Vec<NodeRef>> {
    let mut hits = Vec::new();
    let mut pending: Vec<(NodeRef, Vec<NodeKey>)> = vec![(Arc::clone(&root), vec![root.key()])];

    while let Some((dir, branch)) = pending.pop() {
        for child in dir.children().await? {
            if child.is_link() {
                continue;
            }
            if name_matches(&child.name(), query) {
                hits.push(Arc::clone(&child));
            }
            if child.is_directory() {
                let key = child.key();
                if branch.contains(&key) {
                    continue;
                }
                let mut next = branch.clone();
                next.push(key);
                pending.push((child, next));
            }
        }
    }
    Ok(hits)
}
