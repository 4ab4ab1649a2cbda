/*!
 * Directory Operations Implementation
 * Structural mutations: create, rename, delete, copy, move
 */

use time::OffsetDateTime;

use super::node::{MemKind, MemNode};
use super::{data_url, MemoryBackend, ROOT_ID};
use crate::vfs::paths::validate_name;
use crate::vfs::types::*;

impl MemoryBackend {
    pub(super) fn stat_node(&self, id: &str) -> VfsResult<NodeRecord> {
        Ok(self.node(id)?.record.clone())
    }

    pub(super) fn list_children(&self, id: &str) -> VfsResult<Vec<NodeRecord>> {
        let child_ids = {
            let node = self.node(id)?;
            if !node.is_dir() {
                return Err(VfsError::NotSupported(format!(
                    "{} is not a directory",
                    node.record.name
                )));
            }
            node.child_ids()
        };

        Ok(child_ids
            .iter()
            .filter_map(|child| self.nodes.get(child).map(|n| n.record.clone()))
            .collect())
    }

    pub(super) fn create_file(
        &self,
        parent: &str,
        data: &[u8],
        name: &str,
        mime_type: &str,
    ) -> VfsResult<NodeRecord> {
        validate_name(name)?;
        let record = NodeRecord::file(Self::generate_id(), name, mime_type, data.len() as u64)
            .with_url(data_url(mime_type, data));
        self.insert_child(
            parent,
            MemNode::file(record, Some(parent.to_string()), data.to_vec()),
        )
    }

    pub(super) fn create_dir(&self, parent: &str, name: &str) -> VfsResult<NodeRecord> {
        validate_name(name)?;
        let record = NodeRecord::directory(Self::generate_id(), name);
        self.insert_child(parent, MemNode::directory(record, Some(parent.to_string())))
    }

    pub(super) fn rename_node(&self, id: &str, new_name: &str) -> VfsResult<NodeRecord> {
        validate_name(new_name)?;
        let _guard = self.mutation.lock();

        let (old_name, parent) = {
            let node = self.node(id)?;
            (node.record.name.clone(), node.parent.clone())
        };
        if old_name == new_name {
            return self.stat_node(id);
        }

        if let Some(parent) = parent {
            self.link_child(&parent, new_name, id)?;
            self.unlink_child(&parent, &old_name)?;
        }

        let mut node = self.node_mut(id)?;
        node.record.name = new_name.to_string();
        node.record.last_modified = OffsetDateTime::now_utc();
        Ok(node.record.clone())
    }

    pub(super) fn remove_node(&self, id: &str) -> VfsResult<()> {
        if id == ROOT_ID {
            return Err(VfsError::NotSupported("cannot delete the root directory".into()));
        }
        let _guard = self.mutation.lock();

        let (name, parent) = {
            let node = self.node(id)?;
            (node.record.name.clone(), node.parent.clone())
        };
        if let Some(parent) = parent {
            self.unlink_child(&parent, &name)?;
        }

        let mut pending = vec![id.to_string()];
        while let Some(current) = pending.pop() {
            if let Some((_, node)) = self.nodes.remove(&current) {
                pending.extend(node.child_ids());
            }
        }
        Ok(())
    }

    pub(super) fn copy_node(&self, id: &str, target_parent: &str) -> VfsResult<NodeRecord> {
        let _guard = self.mutation.lock();

        let name = self.node(id)?.record.name.clone();
        self.ensure_free(target_parent, &name)?;

        // Clone the whole subtree before linking it, so a copy into the
        // source's own subtree never sees itself
        let copy_id = self.clone_subtree(id, target_parent)?;
        self.link_child(target_parent, &name, &copy_id)?;
        self.stat_node(&copy_id)
    }

    pub(super) fn move_into(&self, id: &str, target_parent: &str) -> VfsResult<NodeRecord> {
        if id == ROOT_ID {
            return Err(VfsError::NotSupported("cannot move the root directory".into()));
        }
        let _guard = self.mutation.lock();

        let (name, parent) = {
            let node = self.node(id)?;
            (node.record.name.clone(), node.parent.clone())
        };
        if parent.as_deref() == Some(target_parent) {
            return self.stat_node(id);
        }
        if self.is_within(target_parent, id)? {
            return Err(VfsError::NotSupported(format!(
                "cannot move {} into its own subtree",
                name
            )));
        }

        self.link_child(target_parent, &name, id)?;
        if let Some(parent) = parent {
            self.unlink_child(&parent, &name)?;
        }

        let mut node = self.node_mut(id)?;
        node.parent = Some(target_parent.to_string());
        Ok(node.record.clone())
    }

    fn insert_child(&self, parent: &str, node: MemNode) -> VfsResult<NodeRecord> {
        let _guard = self.mutation.lock();
        let record = node.record.clone();
        self.link_child(parent, &record.name, &record.id)?;
        self.nodes.insert(record.id.clone(), node);
        Ok(record)
    }

    fn ensure_free(&self, parent: &str, name: &str) -> VfsResult<()> {
        let node = self.node(parent)?;
        match &node.kind {
            MemKind::Directory { children } if children.contains_key(name) => Err(
                VfsError::AlreadyExists(format!("{} in {}", name, node.record.name)),
            ),
            MemKind::Directory { .. } => Ok(()),
            MemKind::File { .. } => Err(VfsError::NotSupported(format!(
                "{} is not a directory",
                node.record.name
            ))),
        }
    }

    fn link_child(&self, parent: &str, name: &str, id: &str) -> VfsResult<()> {
        self.ensure_free(parent, name)?;
        let mut node = self.node_mut(parent)?;
        if let MemKind::Directory { children } = &mut node.kind {
            children.insert(name.to_string(), id.to_string());
        }
        node.record.last_modified = OffsetDateTime::now_utc();
        Ok(())
    }

    fn unlink_child(&self, parent: &str, name: &str) -> VfsResult<()> {
        let mut node = self.node_mut(parent)?;
        if let MemKind::Directory { children } = &mut node.kind {
            children.remove(name);
        }
        node.record.last_modified = OffsetDateTime::now_utc();
        Ok(())
    }

    /// True when `id` is `ancestor` or lies below it
    fn is_within(&self, id: &str, ancestor: &str) -> VfsResult<bool> {
        let mut current = Some(id.to_string());
        while let Some(node_id) = current {
            if node_id == ancestor {
                return Ok(true);
            }
            current = self.node(&node_id)?.parent.clone();
        }
        Ok(false)
    }

    fn clone_subtree(&self, id: &str, new_parent: &str) -> VfsResult<String> {
        let source = self.node(id)?.clone();
        let copy_id = Self::generate_id();

        let mut record = source.record.clone();
        record.id = copy_id.clone();
        record.created = OffsetDateTime::now_utc();
        record.last_modified = record.created;

        let copy = match &source.kind {
            MemKind::File { data } => {
                record.url = data_url(&record.mime_type, data);
                MemNode::file(record, Some(new_parent.to_string()), data.clone())
            }
            MemKind::Directory { children } => {
                let mut copy = MemNode::directory(record, Some(new_parent.to_string()));
                for (name, child) in children {
                    let child_copy = self.clone_subtree(child, &copy_id)?;
                    if let MemKind::Directory { children } = &mut copy.kind {
                        children.insert(name.clone(), child_copy);
                    }
                }
                copy
            }
        };

        self.nodes.insert(copy_id.clone(), copy);
        Ok(copy_id)
    }
}
