/*!
 * File Descriptor Table
 * Per-process mapping from small integers to open nodes
 */

use std::collections::HashMap;

use crate::core::errors::{ProcessError, ProcessResult};
use crate::core::limits::{FD_START, STDERR_FD, STDOUT_FD};
use crate::core::types::Fd;
use crate::vfs::NodeRef;

/// File descriptor table
///
/// 1 and 2 are bound to the process's stdout and stderr; `open` hands out
/// descriptors from `FD_START` upward and never reuses a closed one.
pub struct FdTable {
    next_fd: Fd,
    open_files: HashMap<Fd, NodeRef>,
}

impl FdTable {
    pub fn new(stdout: NodeRef, stderr: NodeRef) -> Self {
        let mut open_files = HashMap::new();
        open_files.insert(STDOUT_FD, stdout);
        open_files.insert(STDERR_FD, stderr);
        Self {
            next_fd: FD_START,
            open_files,
        }
    }

    pub fn open(&mut self, node: NodeRef) -> Fd {
        let fd = self.next_fd;
        self.next_fd += 1;
        self.open_files.insert(fd, node);
        fd
    }

    pub fn close(&mut self, fd: Fd) -> ProcessResult<()> {
        self.open_files
            .remove(&fd)
            .map(|_| ())
            .ok_or(ProcessError::BadDescriptor(fd))
    }

    pub fn get(&self, fd: Fd) -> ProcessResult<NodeRef> {
        self.open_files
            .get(&fd)
            .cloned()
            .ok_or(ProcessError::BadDescriptor(fd))
    }

    pub fn len(&self) -> usize {
        self.open_files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open_files.is_empty()
    }
}
