/*!
 * Process Registry
 * Live processes by pid
 */

use ahash::RandomState;
use dashmap::DashMap;
use std::sync::Arc;

use super::types::Process;
use crate::core::id::{AtomicGenerator, IdGenerator};
use crate::core::types::Pid;

/// Registry of running processes
///
/// Pids are monotonic and never reused while the registry lives. A process
/// is present from spawn until teardown, and removed exactly then.
pub struct ProcessRegistry {
    processes: DashMap<Pid, Arc<Process>, RandomState>,
    pids: AtomicGenerator<u32>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self {
            processes: DashMap::with_hasher(RandomState::new()),
            pids: AtomicGenerator::default_start(),
        }
    }

    /// Reserve the next pid
    pub fn allocate(&self) -> Pid {
        self.pids.next()
    }

    pub fn insert(&self, process: Arc<Process>) {
        self.processes.insert(process.pid(), process);
    }

    pub fn get(&self, pid: Pid) -> Option<Arc<Process>> {
        self.processes.get(&pid).map(|entry| Arc::clone(entry.value()))
    }

    /// Live processes ordered by pid
    pub fn list(&self) -> Vec<Arc<Process>> {
        let mut processes: Vec<Arc<Process>> = self
            .processes
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        processes.sort_by_key(|p| p.pid());
        processes
    }

    pub fn remove(&self, pid: Pid) -> Option<Arc<Process>> {
        self.processes.remove(&pid).map(|(_, process)| process)
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.processes.contains_key(&pid)
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}
