//! # Layered Node Database
//!
//! Versioned, path-addressed store for trie nodes over the shared
//! key/value database.
//!
//! ## Problem
//!
//! The sidecar must serve reads at recent roots (reorg recovery, proofs)
//! without writing every block's node set straight to disk.
//!
//! ## Solution: Diff Layers
//!
//! Each block's mutation set becomes an in-memory diff layer keyed by the
//! UBT root it produced, chained to its parent root. Readers resolve
//! through the chain from their root down to the disk layer. `commit`
//! flushes a chain to disk in one atomic batch; the retention window
//! bounds how many layers stay recoverable above disk, flushing the
//! bottom-most layer when a chain grows past it.
//!
//! Alongside the node sets, each layer carries the flat leaf changes of
//! its block, giving point reads an O(1) path that bypasses the trie walk.

use super::errors::TrieError;
use super::keys::TreeKey;
use super::node::LeafValue;
use super::trie::{NodeReader, NodeSet, StateSet};
use crate::ports::database::{BatchOperation, KeyValueStore};
use lru::LruCache;
use shared_types::schema;
use shared_types::Hash;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, RwLock};

/// One block's worth of trie mutations, chained to its parent root.
struct DiffLayer {
    parent: Hash,
    block_num: u64,
    nodes: NodeSet,
    states: StateSet,
}

/// The in-memory layer tree above the disk layer.
struct LayerTree {
    layers: HashMap<Hash, DiffLayer>,
    disk_root: Hash,
}

/// Outcome of a flat leaf lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlatLookup {
    /// The leaf exists with this value at the requested root.
    Value(LeafValue),
    /// The leaf does not exist at the requested root.
    Absent,
    /// The requested root is not covered by the layer tree; callers fall
    /// back to the trie walk.
    NotCovered,
}

/// Layered node database over a shared key/value store.
pub struct NodeDatabase<S: KeyValueStore> {
    store: Arc<S>,
    inner: RwLock<LayerTree>,
    /// Clean disk nodes by path key.
    clean: Mutex<LruCache<Vec<u8>, Vec<u8>>>,
    history_window: usize,
}

impl<S: KeyValueStore> NodeDatabase<S> {
    /// Open the database over `store`. `disk_root` is the root the flat
    /// namespaces currently hold (the zero hash for a fresh database).
    pub fn new(store: Arc<S>, disk_root: Hash, history_window: usize, cache_size: usize) -> Self {
        let cache_size = NonZeroUsize::new(cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            inner: RwLock::new(LayerTree {
                layers: HashMap::new(),
                disk_root,
            }),
            clean: Mutex::new(LruCache::new(cache_size)),
            history_window: history_window.max(1),
        }
    }

    /// The root currently persisted on disk.
    pub fn disk_root(&self) -> Hash {
        self.inner.read().map(|t| t.disk_root).unwrap_or(shared_types::ZERO_HASH)
    }

    /// Number of in-memory diff layers; stats helper.
    pub fn layer_count(&self) -> usize {
        self.inner.read().map(|t| t.layers.len()).unwrap_or(0)
    }

    /// A reader resolving nodes as of `root`.
    pub fn reader(&self, root: Hash) -> Result<NodeDbReader<'_, S>, TrieError> {
        let inner = self.read_tree()?;
        let chain = Self::chain_of(&inner, root)?;
        Ok(NodeDbReader { db: self, chain })
    }

    /// Record one block's mutation set as a new diff layer on top of
    /// `parent_root`. Chains that outgrow the retention window flush
    /// their bottom-most layer to disk.
    pub fn update(
        &self,
        new_root: Hash,
        parent_root: Hash,
        block_num: u64,
        nodes: NodeSet,
        states: StateSet,
    ) -> Result<(), TrieError> {
        if new_root == parent_root {
            // An empty delta produces no new state.
            return Ok(());
        }

        let mut inner = self.write_tree()?;
        if parent_root != inner.disk_root && !inner.layers.contains_key(&parent_root) {
            return Err(unknown_root(&parent_root));
        }

        inner.layers.insert(
            new_root,
            DiffLayer {
                parent: parent_root,
                block_num,
                nodes,
                states,
            },
        );
        tracing::debug!(
            root = %shared_types::short_hash(&new_root),
            block = block_num,
            layers = inner.layers.len(),
            "node database layer added"
        );

        while Self::chain_of(&inner, new_root)?.len() > self.history_window {
            self.flush_bottom(&mut inner, new_root)?;
        }
        Ok(())
    }

    /// Flush the layer chain up to `root` into one atomic disk batch and
    /// discard the flushed layers. Forks left below the new disk layer
    /// are dropped; `recoverable` stops covering them.
    pub fn commit(&self, root: Hash) -> Result<(), TrieError> {
        self.commit_with(root, Vec::new())
    }

    /// Like [`NodeDatabase::commit`], with caller-supplied operations
    /// joined into the same atomic batch. The converter rides its
    /// progress record on the flush so the two can never diverge.
    pub fn commit_with(
        &self,
        root: Hash,
        extra: Vec<BatchOperation>,
    ) -> Result<(), TrieError> {
        let mut inner = self.write_tree()?;
        let chain = Self::chain_of(&inner, root)?;
        if chain.is_empty() {
            if !extra.is_empty() {
                self.store.atomic_batch_write(extra).map_err(TrieError::from)?;
            }
            return Ok(());
        }
        self.flush_chain(&mut inner, &chain, extra)?;
        inner.disk_root = root;
        for hash in &chain {
            inner.layers.remove(hash);
        }
        Self::collect_garbage(&mut inner);
        tracing::info!(
            root = %shared_types::short_hash(&root),
            flushed = chain.len(),
            "node database committed"
        );
        Ok(())
    }

    /// Drop every layer and wipe the node and flat namespaces. A fresh
    /// conversion rebuilds the trie from nothing on top of this.
    pub fn reset(&self) -> Result<(), TrieError> {
        let mut inner = self.write_tree()?;
        let mut batch = Vec::new();
        for (key, _) in self
            .store
            .prefix_scan(schema::TRIE_NODE_PREFIX)
            .map_err(TrieError::from)?
        {
            batch.push(BatchOperation::delete(key));
        }
        for (key, _) in self
            .store
            .prefix_scan(schema::FLAT_LEAF_PREFIX)
            .map_err(TrieError::from)?
        {
            batch.push(BatchOperation::delete(key));
        }
        self.store.atomic_batch_write(batch).map_err(TrieError::from)?;
        inner.layers.clear();
        inner.disk_root = shared_types::ZERO_HASH;
        self.lock_clean()?.clear();
        tracing::info!("node database reset");
        Ok(())
    }

    /// Whether `root` is still restorable: on disk or within the layer
    /// window.
    pub fn recoverable(&self, root: Hash) -> bool {
        self.read_tree()
            .map(|inner| Self::chain_of(&inner, root).is_ok())
            .unwrap_or(false)
    }

    /// Rewind to `root`: every layer that is not an ancestor of `root` is
    /// discarded. Fails when `root` is outside the retention window.
    pub fn recover(&self, root: Hash) -> Result<(), TrieError> {
        let mut inner = self.write_tree()?;
        let keep: HashSet<Hash> = Self::chain_of(&inner, root)?.into_iter().collect();
        let before = inner.layers.len();
        inner.layers.retain(|hash, _| keep.contains(hash));
        tracing::info!(
            root = %shared_types::short_hash(&root),
            dropped = before - inner.layers.len(),
            "node database recovered"
        );
        Ok(())
    }

    /// Read a flat leaf value as of `root`, resolving through the layer
    /// chain before falling back to the disk namespace.
    pub fn flat_get(&self, root: Hash, key: &TreeKey) -> Result<FlatLookup, TrieError> {
        {
            let inner = self.read_tree()?;
            let Ok(chain) = Self::chain_of(&inner, root) else {
                return Ok(FlatLookup::NotCovered);
            };
            for hash in &chain {
                let layer = inner.layers.get(hash).ok_or_else(|| unknown_root(hash))?;
                if let Some(entry) = layer.states.get(key) {
                    return Ok(match entry {
                        Some(value) => FlatLookup::Value(*value),
                        None => FlatLookup::Absent,
                    });
                }
            }
        }
        match self.store.get(&schema::flat_leaf_key(key)).map_err(TrieError::from)? {
            Some(bytes) => {
                let value: LeafValue = bytes.as_slice().try_into().map_err(|_| TrieError::Decode {
                    reason: format!("flat leaf of {} bytes", bytes.len()),
                })?;
                Ok(FlatLookup::Value(value))
            }
            None => Ok(FlatLookup::Absent),
        }
    }

    /// Look up a preimage in the shared preimage table.
    pub fn preimage(&self, hash: &Hash) -> Result<Option<Vec<u8>>, TrieError> {
        self.store.get(&schema::preimage_key(hash)).map_err(TrieError::from)
    }

    /// Record a preimage. The host normally owns this table; the sidecar
    /// writes it only for fixtures and tests.
    pub fn put_preimage(&self, hash: &Hash, preimage: &[u8]) -> Result<(), TrieError> {
        self.store
            .put(&schema::preimage_key(hash), preimage)
            .map_err(TrieError::from)
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    /// The layer chain from `root` (inclusive) down to the disk layer
    /// (exclusive), top first. Empty when `root` is the disk root.
    fn chain_of(inner: &LayerTree, root: Hash) -> Result<Vec<Hash>, TrieError> {
        let mut chain = Vec::new();
        let mut cursor = root;
        while cursor != inner.disk_root {
            let layer = inner.layers.get(&cursor).ok_or_else(|| unknown_root(&cursor))?;
            chain.push(cursor);
            cursor = layer.parent;
            if chain.len() > inner.layers.len() {
                return Err(unknown_root(&root));
            }
        }
        Ok(chain)
    }

    fn flush_bottom(&self, inner: &mut LayerTree, tip: Hash) -> Result<(), TrieError> {
        let chain = Self::chain_of(inner, tip)?;
        let Some(bottom) = chain.last().copied() else {
            return Ok(());
        };
        let block = inner.layers.get(&bottom).map(|l| l.block_num).unwrap_or_default();
        self.flush_chain(inner, &[bottom], Vec::new())?;
        inner.disk_root = bottom;
        inner.layers.remove(&bottom);
        Self::collect_garbage(inner);
        tracing::debug!(
            root = %shared_types::short_hash(&bottom),
            block,
            "retention window exceeded, bottom layer flushed"
        );
        Ok(())
    }

    /// Write the given layers (top first) to disk in one atomic batch,
    /// together with any caller-supplied operations.
    fn flush_chain(
        &self,
        inner: &mut LayerTree,
        chain: &[Hash],
        extra: Vec<BatchOperation>,
    ) -> Result<(), TrieError> {
        let mut merged_nodes: NodeSet = NodeSet::new();
        let mut merged_states: StateSet = StateSet::new();
        for hash in chain.iter().rev() {
            let layer = inner.layers.get(hash).ok_or_else(|| unknown_root(hash))?;
            for (path, entry) in &layer.nodes {
                merged_nodes.insert(path.clone(), entry.clone());
            }
            for (key, entry) in &layer.states {
                merged_states.insert(*key, *entry);
            }
        }

        let mut batch = Vec::with_capacity(merged_nodes.len() + merged_states.len());
        {
            let mut clean = self.lock_clean()?;
            for (path, entry) in merged_nodes {
                let store_key = schema::trie_node_key(&path);
                match entry {
                    Some(bytes) => {
                        clean.put(path, bytes.clone());
                        batch.push(BatchOperation::put(store_key, bytes));
                    }
                    None => {
                        clean.pop(&path);
                        batch.push(BatchOperation::delete(store_key));
                    }
                }
            }
        }
        for (key, entry) in merged_states {
            let store_key = schema::flat_leaf_key(&key);
            match entry {
                Some(value) => batch.push(BatchOperation::put(store_key, value.to_vec())),
                None => batch.push(BatchOperation::delete(store_key)),
            }
        }
        batch.extend(extra);

        self.store.atomic_batch_write(batch).map_err(TrieError::from)
    }

    /// Drop layers that no longer chain down to the disk root.
    fn collect_garbage(inner: &mut LayerTree) {
        let mut reachable: HashSet<Hash> = HashSet::new();
        let roots: Vec<Hash> = inner.layers.keys().copied().collect();
        for root in roots {
            let mut path = Vec::new();
            let mut cursor = root;
            let ok = loop {
                if cursor == inner.disk_root || reachable.contains(&cursor) {
                    break true;
                }
                match inner.layers.get(&cursor) {
                    Some(layer) if !path.contains(&cursor) => {
                        path.push(cursor);
                        cursor = layer.parent;
                    }
                    _ => break false,
                }
            };
            if ok {
                reachable.extend(path);
            }
        }
        inner.layers.retain(|hash, _| reachable.contains(hash));
    }

    fn read_tree(&self) -> Result<std::sync::RwLockReadGuard<'_, LayerTree>, TrieError> {
        self.inner.read().map_err(|_| lock_poisoned())
    }

    fn write_tree(&self) -> Result<std::sync::RwLockWriteGuard<'_, LayerTree>, TrieError> {
        self.inner.write().map_err(|_| lock_poisoned())
    }

    fn lock_clean(&self) -> Result<std::sync::MutexGuard<'_, LruCache<Vec<u8>, Vec<u8>>>, TrieError> {
        self.clean.lock().map_err(|_| lock_poisoned())
    }
}

fn unknown_root(root: &Hash) -> TrieError {
    TrieError::UnknownRoot {
        root: shared_types::full_hash(root),
    }
}

fn lock_poisoned() -> TrieError {
    TrieError::Store(super::errors::KVStoreError::LockPoisoned)
}

/// A point-in-time reader over the database, bound to one root.
pub struct NodeDbReader<'a, S: KeyValueStore> {
    db: &'a NodeDatabase<S>,
    chain: Vec<Hash>,
}

impl<S: KeyValueStore> NodeReader for NodeDbReader<'_, S> {
    fn node(&self, path_key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        {
            let inner = self.db.read_tree()?;
            for hash in &self.chain {
                let layer = inner.layers.get(hash).ok_or_else(|| unknown_root(hash))?;
                if let Some(entry) = layer.nodes.get(path_key) {
                    return Ok(entry.clone());
                }
            }
        }

        if let Some(bytes) = self.db.lock_clean()?.get(path_key) {
            return Ok(Some(bytes.clone()));
        }
        let stored = self
            .db
            .store
            .get(&schema::trie_node_key(path_key))
            .map_err(TrieError::from)?;
        if let Some(bytes) = &stored {
            self.db.lock_clean()?.put(path_key.to_vec(), bytes.clone());
        }
        Ok(stored)
    }
}
