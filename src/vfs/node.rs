/*!
 * Backend Nodes
 * The File/Directory contract implemented directly over a storage backend
 */

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::observable::{FileEvent, Listeners};
use super::traits::{Node, NodeExt, NodeKey, NodeRef, StorageBackend};
use super::types::*;

struct NodeState {
    backend: Arc<dyn StorageBackend>,
    record: RwLock<NodeRecord>,
    /// Name shown in place of the stored one (mount name of a mounted root)
    alias: Option<String>,
    parent: Option<NodeRef>,
}

/// Node bound to one backend record
///
/// Cheap to clone; clones share metadata. Listeners live in the backend's
/// [`ListenerTable`](super::observable::ListenerTable), so every handle to
/// the same node id sees the same set. Children returned by `children()`
/// hold a clone of this node as their parent, so events on a child reach
/// the listeners registered on its ancestors.
#[derive(Clone)]
pub struct BackendNode {
    state: Arc<NodeState>,
}

impl BackendNode {
    /// Root directory of a backend, parent-less
    pub async fn root(backend: Arc<dyn StorageBackend>) -> VfsResult<Self> {
        let record = backend.root().await?;
        Ok(Self::from_record(backend, record, None, None))
    }

    /// Root of a backend grafted under `parent` with a display name
    pub async fn mounted(
        backend: Arc<dyn StorageBackend>,
        name: &str,
        parent: NodeRef,
    ) -> VfsResult<Self> {
        let record = backend.root().await?;
        Ok(Self::from_record(
            backend,
            record,
            Some(name.to_string()),
            Some(parent),
        ))
    }

    pub fn from_record(
        backend: Arc<dyn StorageBackend>,
        record: NodeRecord,
        alias: Option<String>,
        parent: Option<NodeRef>,
    ) -> Self {
        Self {
            state: Arc::new(NodeState {
                backend,
                record: RwLock::new(record),
                alias,
                parent,
            }),
        }
    }

    fn node_id(&self) -> String {
        self.state.record.read().id.clone()
    }

    fn as_node_ref(&self) -> NodeRef {
        Arc::new(self.clone())
    }

    fn child_node(&self, record: NodeRecord) -> BackendNode {
        Self::from_record(
            Arc::clone(&self.state.backend),
            record,
            None,
            Some(self.as_node_ref()),
        )
    }

    fn set_record(&self, record: NodeRecord) {
        *self.state.record.write() = record;
    }

    fn ensure_directory(&self) -> VfsResult<()> {
        if self.state.record.read().directory {
            Ok(())
        } else {
            Err(VfsError::NotSupported(format!(
                "{} is not a directory",
                self.path_string()
            )))
        }
    }

    fn same_backend(&self, target: &NodeRef) -> bool {
        target
            .backend()
            .map(|backend| backend.id() == self.state.backend.id())
            .unwrap_or(false)
    }
}

impl fmt::Debug for BackendNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendNode")
            .field("backend", &self.state.backend.kind())
            .field("key", &self.key())
            .field("alias", &self.state.alias)
            .finish()
    }
}

#[async_trait]
impl Node for BackendNode {
    fn record(&self) -> NodeRecord {
        let mut record = self.state.record.read().clone();
        if let Some(alias) = &self.state.alias {
            record.name = alias.clone();
        }
        record
    }

    fn key(&self) -> NodeKey {
        NodeKey::new(self.state.backend.id(), self.node_id())
    }

    fn parent(&self) -> Option<NodeRef> {
        self.state.parent.clone()
    }

    fn backend(&self) -> Option<Arc<dyn StorageBackend>> {
        Some(Arc::clone(&self.state.backend))
    }

    fn listeners(&self) -> Listeners {
        self.state.backend.listener_table().listeners(&self.node_id())
    }

    fn notify(&self, event: &FileEvent) {
        self.state
            .backend
            .listener_table()
            .emit(&self.node_id(), event);
        if let Some(parent) = &self.state.parent {
            parent.notify(event);
        }
    }

    async fn read(&self, params: &ReadParams) -> VfsResult<Vec<u8>> {
        self.state.backend.read(&self.node_id(), params).await
    }

    async fn write(&self, data: &[u8]) -> VfsResult<Vec<u8>> {
        let id = self.node_id();
        let stored = self.state.backend.write(&id, data).await?;
        self.set_record(self.state.backend.stat(&id).await?);
        self.notify(&FileEvent::Modified {
            path: self.path_string(),
        });
        Ok(stored)
    }

    async fn rename(&self, new_name: &str) -> VfsResult<()> {
        if self.state.alias.is_some() {
            return Err(VfsError::NotSupported(format!(
                "cannot rename mount point {}",
                self.path_string()
            )));
        }
        let from = self.path_string();
        let id = self.node_id();
        let record = self.state.backend.rename(&id, new_name).await?;
        self.state.backend.listener_table().rekey(&id, &record.id);
        self.set_record(record);
        self.notify(&FileEvent::Renamed {
            from,
            to: self.path_string(),
        });
        Ok(())
    }

    async fn delete(&self) -> VfsResult<()> {
        if self.state.alias.is_some() {
            return Err(VfsError::NotSupported(format!(
                "cannot delete mount point {}",
                self.path_string()
            )));
        }
        let id = self.node_id();
        self.state.backend.delete(&id).await?;
        self.notify(&FileEvent::Deleted {
            path: self.path_string(),
        });
        self.state.backend.listener_table().forget(&id);
        Ok(())
    }

    async fn children(&self) -> VfsResult<Vec<NodeRef>> {
        let records = self.state.backend.children(&self.node_id()).await?;
        Ok(records
            .into_iter()
            .map(|record| Arc::new(self.child_node(record)) as NodeRef)
            .collect())
    }

    async fn add_file(&self, data: &[u8], name: &str, mime_type: &str) -> VfsResult<NodeRef> {
        let record = self
            .state
            .backend
            .add_file(&self.node_id(), data, name, mime_type)
            .await?;
        let child = self.child_node(record);
        self.notify(&FileEvent::Created {
            path: child.path_string(),
        });
        Ok(Arc::new(child))
    }

    async fn add_directory(&self, name: &str) -> VfsResult<NodeRef> {
        let record = self
            .state
            .backend
            .add_directory(&self.node_id(), name)
            .await?;
        let child = self.child_node(record);
        self.notify(&FileEvent::Created {
            path: child.path_string(),
        });
        Ok(Arc::new(child))
    }

    async fn copy_to(&self, target: NodeRef) -> VfsResult<NodeRef> {
        if !target.is_directory() {
            return Err(VfsError::NotSupported(format!(
                "copy target {} is not a directory",
                target.path_string()
            )));
        }
        if !self.same_backend(&target) {
            debug!(source = %self.key(), target = %target.key(), "Streaming cross-backend copy");
            return stream_copy(self.as_node_ref(), target).await;
        }

        let record = self.state.backend.copy(&self.node_id(), &target.id()).await?;
        let copy = BackendNode::from_record(
            Arc::clone(&self.state.backend),
            record,
            None,
            Some(Arc::clone(&target)),
        );
        target.notify(&FileEvent::Created {
            path: copy.path_string(),
        });
        Ok(Arc::new(copy))
    }

    async fn move_to(&self, target: NodeRef) -> VfsResult<NodeRef> {
        if !target.is_directory() {
            return Err(VfsError::NotSupported(format!(
                "move target {} is not a directory",
                target.path_string()
            )));
        }
        if !self.same_backend(&target) {
            return Err(VfsError::CrossBackend(format!(
                "cannot move {} to {}",
                self.path_string(),
                target.path_string()
            )));
        }
        if self.state.alias.is_some() {
            return Err(VfsError::NotSupported(format!(
                "cannot move mount point {}",
                self.path_string()
            )));
        }

        let from = self.path_string();
        let record = self
            .state
            .backend
            .move_node(&self.node_id(), &target.id())
            .await?;
        let moved = BackendNode::from_record(
            Arc::clone(&self.state.backend),
            record,
            None,
            Some(Arc::clone(&target)),
        );
        let to = moved.path_string();
        self.notify(&FileEvent::Renamed {
            from: from.clone(),
            to: to.clone(),
        });
        self.state
            .backend
            .listener_table()
            .rekey(&self.node_id(), &moved.node_id());
        target.notify(&FileEvent::Renamed { from, to });
        Ok(Arc::new(moved))
    }

    async fn search(&self, query: &str) -> VfsResult<Vec<NodeRef>> {
        self.ensure_directory()?;
        let hits = self.state.backend.search(&self.node_id(), query).await?;

        Ok(hits
            .into_iter()
            .map(|hit| {
                let mut parent = self.clone();
                for ancestor in hit.ancestors {
                    parent = parent.child_node(ancestor);
                }
                Arc::new(parent.child_node(hit.node)) as NodeRef
            })
            .collect())
    }
}

/// Copy `source` into `target` by reading it and re-creating it through
/// `target`'s own operations
pub fn stream_copy(source: NodeRef, target: NodeRef) -> BoxFuture<'static, VfsResult<NodeRef>> {
    async move {
        let record = source.record();
        if record.directory {
            let dir = target.add_directory(&record.name).await?;
            for child in source.children().await? {
                stream_copy(child, Arc::clone(&dir)).await?;
            }
            Ok(dir)
        } else {
            let data = source.read_all().await?;
            target.add_file(&data, &record.name, &record.mime_type).await
        }
    }
    .boxed()
}
