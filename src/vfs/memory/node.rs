/*!
 * Filesystem Node Types
 * Internal representation of files and directories
 */

use std::collections::HashMap;

use crate::vfs::types::NodeRecord;

/// Node payload
#[derive(Debug, Clone)]
pub(super) enum MemKind {
    File { data: Vec<u8> },
    /// Child name → child id
    Directory { children: HashMap<String, String> },
}

/// In-memory filesystem node
#[derive(Debug, Clone)]
pub(super) struct MemNode {
    pub record: NodeRecord,
    pub parent: Option<String>,
    pub kind: MemKind,
}

impl MemNode {
    pub fn file(record: NodeRecord, parent: Option<String>, data: Vec<u8>) -> Self {
        Self {
            record,
            parent,
            kind: MemKind::File { data },
        }
    }

    pub fn directory(record: NodeRecord, parent: Option<String>) -> Self {
        Self {
            record,
            parent,
            kind: MemKind::Directory {
                children: HashMap::new(),
            },
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, MemKind::Directory { .. })
    }

    /// Child ids, empty for files
    pub fn child_ids(&self) -> Vec<String> {
        match &self.kind {
            MemKind::Directory { children } => children.values().cloned().collect(),
            MemKind::File { .. } => Vec::new(),
        }
    }
}
