/*!
 * Caching Proxy Layer
 * Lazily cached, change-propagating view over any directory tree
 *
 * Proxy nodes live in a slot arena. Each slot records its parent slot index,
 * its child slots and whether that child list is a valid cache. Handles carry
 * the slot index plus the generation it was issued for, so a handle to a
 * released slot never observes the slot's next occupant.
 *
 * Any mutation through a proxy clears the cache of the proxy and of every
 * ancestor, then fires their listeners. Cache fills record the slot epoch
 * before fetching and only mark the result cached if no invalidation raced
 * the fetch.
 */

use ahash::RandomState;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use super::observable::{FileEvent, Listeners};
use super::paths;
use super::traits::{chain_below, relocate, Node, NodeExt, NodeKey, NodeRef, StorageBackend};
use super::types::*;

type IndexKey = (Option<usize>, NodeKey);

struct Slot {
    generation: u64,
    live: bool,
    inner: Option<NodeRef>,
    key: Option<NodeKey>,
    parent: Option<usize>,
    children: Vec<usize>,
    cached: bool,
    epoch: u64,
    listeners: Listeners,
}

impl Slot {
    fn vacant() -> Self {
        Self {
            generation: 0,
            live: false,
            inner: None,
            key: None,
            parent: None,
            children: Vec::new(),
            cached: false,
            epoch: 0,
            listeners: Listeners::new(),
        }
    }
}

#[derive(Default)]
struct ArenaState {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

/// Slot arena owning every proxy of one tree
pub struct ProxyArena {
    state: RwLock<ArenaState>,
    /// (parent slot, wrapped node key) → slot
    index: DashMap<IndexKey, usize, RandomState>,
}

impl ProxyArena {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(ArenaState::default()),
            index: DashMap::with_hasher(RandomState::new()),
        })
    }

    /// Number of live proxies
    pub fn live_count(&self) -> usize {
        self.state.read().slots.iter().filter(|s| s.live).count()
    }

    /// Number of proxies whose child list is currently cached
    pub fn cached_count(&self) -> usize {
        self.state
            .read()
            .slots
            .iter()
            .filter(|s| s.live && s.cached)
            .count()
    }

    /// Slot for `inner` under `parent`, reusing the existing one for the same key
    fn alloc(
        &self,
        state: &mut ArenaState,
        parent: Option<usize>,
        inner: NodeRef,
        indexed: bool,
    ) -> usize {
        let key = inner.key();
        if indexed {
            if let Some(existing) = self.index.get(&(parent, key.clone())).map(|e| *e) {
                state.slots[existing].inner = Some(inner);
                return existing;
            }
        }

        let slot_index = match state.free.pop() {
            Some(free) => free,
            None => {
                state.slots.push(Slot::vacant());
                state.slots.len() - 1
            }
        };
        let slot = &mut state.slots[slot_index];
        slot.live = true;
        slot.inner = Some(inner);
        slot.key = Some(key.clone());
        slot.parent = parent;
        slot.children.clear();
        slot.cached = false;
        slot.listeners = Listeners::new();

        if indexed {
            self.index.insert((parent, key), slot_index);
        }
        if let Some(p) = parent {
            if !state.slots[p].children.contains(&slot_index) {
                state.slots[p].children.push(slot_index);
            }
        }
        slot_index
    }

    /// Release a slot and everything below it
    fn release(&self, state: &mut ArenaState, slot_index: usize) {
        if let Some(parent) = state.slots[slot_index].parent {
            state.slots[parent].children.retain(|c| *c != slot_index);
        }

        let mut pending = vec![slot_index];
        while let Some(i) = pending.pop() {
            let slot = &mut state.slots[i];
            if !slot.live {
                continue;
            }
            if let Some(key) = slot.key.take() {
                self.index.remove_if(&(slot.parent, key), |_, v| *v == i);
            }
            pending.append(&mut slot.children);
            slot.live = false;
            slot.inner = None;
            slot.parent = None;
            slot.cached = false;
            slot.generation += 1;
            slot.listeners = Listeners::new();
            state.free.push(i);
        }
    }

    fn handle(self: &Arc<Self>, state: &ArenaState, slot_index: usize) -> Option<ProxyNode> {
        let slot = state.slots.get(slot_index)?;
        if !slot.live {
            return None;
        }
        Some(ProxyNode {
            arena: Arc::clone(self),
            index: slot_index,
            generation: slot.generation,
            key: slot.key.clone()?,
            inner: slot.inner.clone()?,
            listeners: slot.listeners.clone(),
        })
    }
}

/// Handle to one proxy slot
#[derive(Clone)]
pub struct ProxyNode {
    arena: Arc<ProxyArena>,
    index: usize,
    generation: u64,
    key: NodeKey,
    /// Wrapped node as of handle creation
    inner: NodeRef,
    listeners: Listeners,
}

impl ProxyNode {
    /// Wrap the root of a tree in a fresh arena
    pub fn root(inner: NodeRef) -> ProxyNode {
        let arena = ProxyArena::new();
        let mut state = arena.state.write();
        let index = arena.alloc(&mut state, None, Arc::clone(&inner), true);
        let generation = state.slots[index].generation;
        let listeners = state.slots[index].listeners.clone();
        drop(state);

        ProxyNode {
            key: inner.key(),
            arena,
            index,
            generation,
            inner,
            listeners,
        }
    }

    /// Arena shared by every proxy of this tree
    pub fn arena(&self) -> Arc<ProxyArena> {
        Arc::clone(&self.arena)
    }

    fn is_current(&self, state: &ArenaState) -> bool {
        state
            .slots
            .get(self.index)
            .map(|slot| slot.live && slot.generation == self.generation)
            .unwrap_or(false)
    }

    /// Latest wrapped node; refills replace it with a fresher snapshot
    fn current_inner(&self) -> NodeRef {
        let state = self.arena.state.read();
        if self.is_current(&state) {
            if let Some(inner) = &state.slots[self.index].inner {
                return Arc::clone(inner);
            }
        }
        Arc::clone(&self.inner)
    }

    fn as_node_ref(&self) -> NodeRef {
        Arc::new(self.clone())
    }

    fn stale(&self) -> VfsError {
        VfsError::NotFound(format!("{} was removed through this tree", self.key))
    }

    /// Clear cached listings of this proxy and its ancestors; returns their
    /// listener sets, nearest first
    fn invalidate_chain(&self) -> Vec<Listeners> {
        let mut state = self.arena.state.write();
        if !self.is_current(&state) {
            return vec![self.listeners.clone()];
        }

        let mut sets = Vec::new();
        let mut current = Some(self.index);
        while let Some(i) = current {
            let slot = &mut state.slots[i];
            slot.cached = false;
            slot.epoch += 1;
            sets.push(slot.listeners.clone());
            current = slot.parent;
        }
        sets
    }

    fn release_self(&self) {
        let mut state = self.arena.state.write();
        if self.is_current(&state) {
            self.arena.release(&mut state, self.index);
        }
    }

    fn child_path(&self, name: &str) -> String {
        let mut segments = self.path();
        segments.push(name.to_string());
        paths::format(&segments)
    }
}

#[async_trait]
impl Node for ProxyNode {
    fn record(&self) -> NodeRecord {
        self.current_inner().record()
    }

    fn key(&self) -> NodeKey {
        self.key.clone()
    }

    fn parent(&self) -> Option<NodeRef> {
        let state = self.arena.state.read();
        if !self.is_current(&state) {
            return None;
        }
        let parent = state.slots[self.index].parent?;
        self.arena
            .handle(&state, parent)
            .map(|handle| Arc::new(handle) as NodeRef)
    }

    fn backend(&self) -> Option<Arc<dyn StorageBackend>> {
        self.current_inner().backend()
    }

    fn listeners(&self) -> Listeners {
        self.listeners.clone()
    }

    fn notify(&self, event: &FileEvent) {
        // Emit outside the arena lock; listeners may call back into the tree
        for listeners in self.invalidate_chain() {
            listeners.emit(event);
        }
    }

    fn invalidate(&self) {
        let cleared = self.invalidate_chain().len();
        debug!(key = %self.key, cleared, "Proxy cache invalidated");
    }

    async fn read(&self, params: &ReadParams) -> VfsResult<Vec<u8>> {
        self.current_inner().read(params).await
    }

    async fn write(&self, data: &[u8]) -> VfsResult<Vec<u8>> {
        let stored = self.current_inner().write(data).await?;
        self.notify(&FileEvent::Modified {
            path: self.path_string(),
        });
        Ok(stored)
    }

    async fn rename(&self, new_name: &str) -> VfsResult<()> {
        let from = self.path_string();
        self.current_inner().rename(new_name).await?;
        self.notify(&FileEvent::Renamed {
            from,
            to: self.path_string(),
        });
        Ok(())
    }

    async fn delete(&self) -> VfsResult<()> {
        let path = self.path_string();
        self.current_inner().delete().await?;
        self.notify(&FileEvent::Deleted { path });
        self.release_self();
        Ok(())
    }

    async fn children(&self) -> VfsResult<Vec<NodeRef>> {
        let epoch = {
            let state = self.arena.state.read();
            if !self.is_current(&state) {
                return Err(self.stale());
            }
            let slot = &state.slots[self.index];
            if slot.cached {
                return Ok(slot
                    .children
                    .iter()
                    .filter_map(|c| self.arena.handle(&state, *c))
                    .map(|handle| Arc::new(handle) as NodeRef)
                    .collect());
            }
            slot.epoch
        };

        let inner = self.current_inner();
        let volatile = inner.backend().map(|b| b.volatile()).unwrap_or(false);
        let fetched = inner.children().await?;

        let mut state = self.arena.state.write();
        if !self.is_current(&state) {
            return Err(self.stale());
        }

        let previous = std::mem::take(&mut state.slots[self.index].children);
        let mut seen = HashSet::new();
        let mut current = Vec::with_capacity(fetched.len());
        for child in fetched {
            let indexed = seen.insert(child.key());
            current.push(self.arena.alloc(&mut state, Some(self.index), child, indexed));
        }
        state.slots[self.index].children = current.clone();
        for gone in previous.into_iter().filter(|p| !current.contains(p)) {
            self.arena.release(&mut state, gone);
        }

        let slot = &mut state.slots[self.index];
        slot.cached = slot.epoch == epoch && !volatile;
        debug!(key = %self.key, children = current.len(), cached = slot.cached, "Proxy cache filled");

        Ok(current
            .iter()
            .filter_map(|c| self.arena.handle(&state, *c))
            .map(|handle| Arc::new(handle) as NodeRef)
            .collect())
    }

    async fn add_file(&self, data: &[u8], name: &str, mime_type: &str) -> VfsResult<NodeRef> {
        let created = self.current_inner().add_file(data, name, mime_type).await?;
        self.notify(&FileEvent::Created {
            path: self.child_path(name),
        });
        relocate(&self.as_node_ref(), &created).await
    }

    async fn add_directory(&self, name: &str) -> VfsResult<NodeRef> {
        let created = self.current_inner().add_directory(name).await?;
        self.notify(&FileEvent::Created {
            path: self.child_path(name),
        });
        relocate(&self.as_node_ref(), &created).await
    }

    async fn copy_to(&self, target: NodeRef) -> VfsResult<NodeRef> {
        let created = self.current_inner().copy_to(Arc::clone(&target)).await?;
        target.invalidate();
        self.invalidate();
        relocate(&target, &created).await
    }

    async fn move_to(&self, target: NodeRef) -> VfsResult<NodeRef> {
        let from = self.path_string();
        let moved = self.current_inner().move_to(Arc::clone(&target)).await?;
        target.invalidate();
        self.notify(&FileEvent::Renamed {
            from,
            to: moved.path_string(),
        });
        self.release_self();
        relocate(&target, &moved).await
    }

    async fn search(&self, query: &str) -> VfsResult<Vec<NodeRef>> {
        let hits = self.current_inner().search(query).await?;

        let mut state = self.arena.state.write();
        if !self.is_current(&state) {
            return Err(self.stale());
        }
        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let mut parent = self.index;
            for node in chain_below(hit, &self.key) {
                parent = self.arena.alloc(&mut state, Some(parent), node, true);
            }
            if let Some(handle) = self.arena.handle(&state, parent) {
                results.push(Arc::new(handle) as NodeRef);
            }
        }
        Ok(results)
    }
}
