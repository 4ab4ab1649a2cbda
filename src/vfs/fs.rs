/*!
 * Virtual Filesystem
 * Layer composition and path resolution over one root tree
 *
 * Capability layers are decorators stacked at build time, innermost first:
 * mounts, then the caching proxy, then reference links. Whatever is enabled,
 * callers see one `NodeRef` root and resolve paths against it.
 */

use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use super::links::{read_link, LinkNode};
use super::mount::{MountEntry, MountNode, MountTable};
use super::node::BackendNode;
use super::observable::{EventBroadcaster, FileEvent};
use super::paths;
use super::proxy::{ProxyArena, ProxyNode};
use super::traits::{NodeExt, NodeRef, StorageBackend};
use super::types::*;
use crate::core::limits::MAX_LINK_HOPS;

/// Builder choosing which layers wrap the root backend
pub struct VfsBuilder {
    backend: Arc<dyn StorageBackend>,
    mounts: bool,
    cache: bool,
    links: bool,
}

impl VfsBuilder {
    /// Allow grafting other backends into the tree
    pub fn with_mounts(mut self) -> Self {
        self.mounts = true;
        self
    }

    /// Cache directory listings behind invalidating proxies
    pub fn with_cache(mut self) -> Self {
        self.cache = true;
        self
    }

    /// Add `.` and `..` entries to every listing
    pub fn with_links(mut self) -> Self {
        self.links = true;
        self
    }

    pub async fn build(self) -> VfsResult<Vfs> {
        let mut root: NodeRef = Arc::new(BackendNode::root(Arc::clone(&self.backend)).await?);

        let mounts = if self.mounts {
            let table = MountTable::new();
            root = MountNode::root(root, table.clone());
            Some(table)
        } else {
            None
        };

        let arena = if self.cache {
            let proxy = ProxyNode::root(root);
            let arena = proxy.arena();
            root = Arc::new(proxy);
            Some(arena)
        } else {
            None
        };

        if self.links {
            root = LinkNode::root(root);
        }

        let events = EventBroadcaster::default();
        let sink = events.clone();
        root.add_listener(move |event: &FileEvent| sink.emit(event.clone()));

        info!(
            backend = self.backend.kind(),
            mounts = self.mounts,
            cache = self.cache,
            links = self.links,
            "Filesystem assembled"
        );

        Ok(Vfs {
            root,
            mounts,
            arena,
            links: self.links,
            events,
        })
    }
}

/// Composed filesystem
///
/// Cheap to clone; clones share the tree, mount table and event stream.
#[derive(Clone)]
pub struct Vfs {
    root: NodeRef,
    mounts: Option<MountTable>,
    arena: Option<Arc<ProxyArena>>,
    links: bool,
    events: EventBroadcaster,
}

impl Vfs {
    pub fn builder(backend: Arc<dyn StorageBackend>) -> VfsBuilder {
        VfsBuilder {
            backend,
            mounts: false,
            cache: false,
            links: false,
        }
    }

    /// Root directory, as seen through every enabled layer
    pub fn root(&self) -> NodeRef {
        Arc::clone(&self.root)
    }

    /// Resolve a segment path from the root
    ///
    /// Links met along the way, or at the end, are followed by re-resolving
    /// their target. Descending through a file or a missing name fails with
    /// `NotFound`.
    pub async fn get_file(&self, segments: &[String]) -> VfsResult<NodeRef> {
        let segments = if self.links {
            segments.to_vec()
        } else {
            paths::normalize(segments)
        };
        let mut hops = 0;
        self.walk(segments, &mut hops).await
    }

    /// Resolve a path string from the root
    pub async fn get_path(&self, path: &str) -> VfsResult<NodeRef> {
        self.get_file(&paths::parse(path)).await
    }

    /// Resolve `path` relative to `base` (absolute paths ignore `base`)
    pub async fn resolve(&self, base: &[String], path: &str) -> VfsResult<NodeRef> {
        self.get_file(&paths::join(base, path)).await
    }

    fn walk<'a>(&'a self, segments: Vec<String>, hops: &'a mut usize) -> BoxFuture<'a, VfsResult<NodeRef>> {
        async move {
            let mut node = self.root();
            for segment in &segments {
                node = self.follow(node, hops).await?;
                if !node.is_directory() {
                    return Err(VfsError::NotFound(format!(
                        "{} is not a directory",
                        node.path_string()
                    )));
                }
                node = node.child(segment).await?;
            }
            self.follow(node, hops).await
        }
        .boxed()
    }

    async fn follow(&self, mut node: NodeRef, hops: &mut usize) -> VfsResult<NodeRef> {
        while node.is_link() {
            *hops += 1;
            if *hops > MAX_LINK_HOPS {
                return Err(VfsError::InvalidPath(format!(
                    "too many links while resolving {}",
                    node.path_string()
                )));
            }
            let target = read_link(node.as_ref()).await?;
            node = self.walk(target, hops).await?;
        }
        Ok(node)
    }

    /// Graft `backend`'s root into the directory at `host` under `name`
    pub async fn mount(
        &self,
        host: &[String],
        backend: Arc<dyn StorageBackend>,
        name: &str,
    ) -> VfsResult<()> {
        let table = self
            .mounts
            .as_ref()
            .ok_or_else(|| VfsError::NotSupported("filesystem was built without mounts".into()))?;

        let host = self.get_file(host).await?;
        if !host.is_directory() {
            return Err(VfsError::NotSupported(format!(
                "cannot mount on {}: not a directory",
                host.path_string()
            )));
        }
        table.mount(host.key(), backend, name)?;

        let mut segments = host.path();
        segments.push(name.to_string());
        host.notify(&FileEvent::Created {
            path: paths::format(&segments),
        });
        Ok(())
    }

    /// Registered mounts, in registration order
    pub fn mounts(&self) -> Vec<MountEntry> {
        self.mounts.as_ref().map(|t| t.entries()).unwrap_or_default()
    }

    /// Live proxies when the cache layer is enabled
    pub fn cached_nodes(&self) -> usize {
        self.arena.as_ref().map(|a| a.live_count()).unwrap_or(0)
    }

    /// Stream of every change seen at the top layer
    pub fn subscribe(&self) -> broadcast::Receiver<FileEvent> {
        self.events.subscribe()
    }
}
