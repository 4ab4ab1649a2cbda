/*!
 * File Operations Implementation
 * Content reads and writes
 */

use super::node::MemKind;
use super::{data_url, MemoryBackend};
use crate::vfs::types::*;

impl MemoryBackend {
    pub(super) fn read_data(&self, id: &str) -> VfsResult<Vec<u8>> {
        let node = self.node(id)?;
        match &node.kind {
            MemKind::File { data } => Ok(data.clone()),
            MemKind::Directory { .. } => Err(VfsError::NotSupported(format!(
                "{} is a directory",
                node.record.name
            ))),
        }
    }

    pub(super) fn write_data(&self, id: &str, bytes: &[u8]) -> VfsResult<Vec<u8>> {
        let mut node = self.node_mut(id)?;
        let node = &mut *node;
        match &mut node.kind {
            MemKind::File { data } => {
                *data = bytes.to_vec();
                node.record.touch(bytes.len() as u64);
                node.record.url = data_url(&node.record.mime_type, bytes);
                Ok(bytes.to_vec())
            }
            MemKind::Directory { .. } => Err(VfsError::NotSupported(format!(
                "cannot write directory {}",
                node.record.name
            ))),
        }
    }
}
