/*!
 * Observable VFS - Change Notification
 * Per-node listener sets and a filesystem-wide event broadcast
 */

use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::core::limits::EVENT_CHANNEL_CAPACITY;

/// File system events that can be observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// File or directory was created
    Created { path: String },

    /// File contents were modified
    Modified { path: String },

    /// File or directory was deleted
    Deleted { path: String },

    /// File or directory was renamed/moved
    Renamed { from: String, to: String },
}

impl FileEvent {
    /// Get the primary path involved in this event
    pub fn path(&self) -> &str {
        match self {
            FileEvent::Created { path } => path,
            FileEvent::Modified { path } => path,
            FileEvent::Deleted { path } => path,
            FileEvent::Renamed { from, .. } => from,
        }
    }
}

/// Handle returned by [`Listeners::add`], used to remove the callback again
pub type ListenerId = u64;

/// Change callback
pub type Listener = Arc<dyn Fn(&FileEvent) + Send + Sync>;

#[derive(Default)]
struct ListenerSet {
    next_id: AtomicU64,
    callbacks: RwLock<Vec<(ListenerId, Listener)>>,
}

/// Callbacks registered on one node
///
/// Cheap to clone; clones share the same set.
#[derive(Clone, Default)]
pub struct Listeners {
    inner: Arc<ListenerSet>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback
    pub fn add<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&FileEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.callbacks.write().push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback; returns false when the handle was unknown
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut callbacks = self.inner.callbacks.write();
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    /// Invoke every callback with the event
    pub fn emit(&self, event: &FileEvent) {
        // Snapshot so callbacks may add or remove listeners
        let snapshot: Vec<Listener> = self
            .inner
            .callbacks
            .read()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in snapshot {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.callbacks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when both handles refer to the same set
    pub fn same_set(&self, other: &Listeners) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners").field("len", &self.len()).finish()
    }
}

/// Listener sets of every node of one backend, keyed by node id
///
/// Node handles are rebuilt on every lookup; they reach the same set through
/// this table as long as the backend keeps the id.
#[derive(Default)]
pub struct ListenerTable {
    sets: DashMap<String, Listeners, RandomState>,
}

impl ListenerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set for a node, created on first use
    pub fn listeners(&self, id: &str) -> Listeners {
        self.sets.entry(id.to_string()).or_default().clone()
    }

    /// Emit to a node's set without creating one
    pub fn emit(&self, id: &str, event: &FileEvent) {
        let set = self.sets.get(id).map(|entry| entry.value().clone());
        if let Some(set) = set {
            set.emit(event);
        }
    }

    /// Drop the set of a node that no longer exists
    pub fn forget(&self, id: &str) {
        self.sets.remove(id);
    }

    /// Carry a set over to a node's new id
    pub fn rekey(&self, from: &str, to: &str) {
        if from == to {
            return;
        }
        if let Some((_, set)) = self.sets.remove(from) {
            self.sets.insert(to.to_string(), set);
        }
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

impl fmt::Debug for ListenerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerTable").field("nodes", &self.len()).finish()
    }
}

/// Event broadcaster implementation
/// Uses tokio broadcast channel for lock-free MPMC
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: Arc<broadcast::Sender<FileEvent>>,
}

impl EventBroadcaster {
    /// Create new broadcaster with specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<FileEvent> {
        self.sender.subscribe()
    }

    /// Emit event to all subscribers
    pub fn emit(&self, event: FileEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}
