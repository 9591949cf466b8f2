//! # Sidecar Service
//!
//! Orchestrates the trie stack against the host chain: applies per-block
//! deltas while Ready, queues them while Converting, drives the
//! background conversion worker, recovers from reorgs, and serves reads.
//!
//! ## Synchronization
//!
//! One reader/writer lock guards the status and the current pointers; a
//! separate mutex serializes queue mutations. The apply path performs
//! synchronous store I/O and takes the write side only for pointer
//! transitions, never for the duration of a trie walk. A single worker
//! thread drives the converter, signalled through an atomic stop flag.
//!
//! ## Ordering
//!
//! Delta application for a block completes - trie commit, node-database
//! update, durable records - strictly before the in-memory pointers for
//! that block become visible to readers.

use crate::algorithms::converter::{self, ConversionContext, ConversionOutcome};
use crate::algorithms::ordering::{sequence_update, AccountWrite};
use crate::config::SidecarConfig;
use crate::domain::delta::{BlockDelta, StateUpdate};
use crate::domain::errors::{from_store, from_trie};
use crate::domain::queue::UpdateQueue;
use crate::domain::records::{load_block_root, ConversionProgress, RootRecord};
use crate::domain::status::{SidecarState, SidecarStatus};
use crate::ports::inbound::SidecarApi;
use crate::ports::outbound::{CanonicalChain, CodeSource, PreimageSource, SnapshotSource};
use shared_types::{
    full_hash, schema, short_hash, Address, BlockRef, Hash, SidecarError, StorageKey,
    StorageValue, ZERO_HASH,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use ubt_trie::{
    basic_data_key, code_hash_key, storage_slot_key, unpack_account, BatchOperation, BinaryTrie,
    FlatLookup, KeyValueStore, NodeDatabase, NodeDbReader, UbtAccount,
};

/// The UBT sidecar service.
pub struct UbtSidecar<S: KeyValueStore + 'static> {
    store: Arc<S>,
    node_db: NodeDatabase<S>,
    queue: Mutex<UpdateQueue<S>>,
    state: RwLock<SidecarState>,
    chain: Arc<dyn CanonicalChain>,
    preimages: Arc<dyn PreimageSource>,
    codes: Arc<dyn CodeSource>,
    config: SidecarConfig,
    stop_converter: AtomicBool,
    converter_thread: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl<S: KeyValueStore + 'static> UbtSidecar<S> {
    /// Open the sidecar over the shared store, recovering persisted state.
    ///
    /// - A conversion progress record on disk means the sidecar awaits a
    ///   `convert_from_mpt` call to resume; it is never Ready while the
    ///   record exists.
    /// - Otherwise a committed-root record restores Ready at that root;
    ///   diff layers above it did not survive the restart, so the
    ///   current pointer rewinds to the committed state.
    pub fn open(
        store: Arc<S>,
        chain: Arc<dyn CanonicalChain>,
        preimages: Arc<dyn PreimageSource>,
        codes: Arc<dyn CodeSource>,
        config: SidecarConfig,
    ) -> Result<Arc<Self>, SidecarError> {
        let committed = RootRecord::load(&*store, schema::COMMITTED_ROOT_KEY)?;
        let current = RootRecord::load(&*store, schema::CURRENT_ROOT_KEY)?;
        let progress = ConversionProgress::load(&*store)?;

        let disk_root = match (&progress, &committed) {
            (Some(progress), _) => progress.ubt_root,
            (None, Some(committed)) => committed.root,
            (None, None) => ZERO_HASH,
        };
        let node_db = NodeDatabase::new(
            store.clone(),
            disk_root,
            config.history_window,
            config.node_cache_size,
        );

        let mut state = SidecarState::new(config.commit_interval);
        match (&progress, committed) {
            (Some(progress), _) => {
                tracing::info!(
                    accounts = progress.accounts_done,
                    "conversion progress found; awaiting resume"
                );
            }
            (None, Some(committed)) => {
                if let Some(current) = current {
                    if current.root != committed.root {
                        tracing::warn!(
                            current = %short_hash(&current.root),
                            committed = %short_hash(&committed.root),
                            "uncommitted layers lost in restart; rewinding to committed root"
                        );
                    }
                }
                committed.save(&*store, schema::CURRENT_ROOT_KEY)?;
                state.status = SidecarStatus::Ready;
                state.current = Some((committed.root, committed.block));
                state.committed = Some((committed.root, committed.block));
                state.last_committed_block = committed.block.number;
                tracing::info!(
                    root = %short_hash(&committed.root),
                    block = committed.block.number,
                    "sidecar restored from committed root"
                );
            }
            (None, None) => {}
        }

        let queue = UpdateQueue::new(store.clone(), config.queue_limit);
        Ok(Arc::new(Self {
            store,
            node_db,
            queue: Mutex::new(queue),
            state: RwLock::new(state),
            chain,
            preimages,
            codes,
            config,
            stop_converter: AtomicBool::new(false),
            converter_thread: Mutex::new(None),
            closed: AtomicBool::new(false),
        }))
    }

    /// Open a trie view at `root` for proof and witness generation.
    pub fn open_trie(&self, root: Hash) -> Result<BinaryTrie<NodeDbReader<'_, S>>, SidecarError> {
        let reader = self.node_db.reader(root).map_err(from_trie)?;
        Ok(BinaryTrie::open(root, reader))
    }

    /// The persisted conversion progress, for monitoring.
    pub fn conversion_progress(&self) -> Result<Option<ConversionProgress>, SidecarError> {
        ConversionProgress::load(&*self.store)
    }

    /// Why the sidecar went stale, if it did.
    pub fn stale_reason(&self) -> Option<String> {
        self.state.read().ok().and_then(|s| s.stale_reason.clone())
    }

    // =========================================================================
    // CONVERSION
    // =========================================================================

    /// Start (or resume) the MPT-to-UBT conversion on a background worker.
    ///
    /// A fresh start wipes the trie namespaces, the queue, and stale root
    /// records; a resume continues from the persisted progress record.
    /// On completion the worker drains the queue up to the canonical head
    /// and flips the sidecar to Ready.
    pub fn convert_from_mpt(
        self: &Arc<Self>,
        state_root: Hash,
        block_num: u64,
        block_hash: Hash,
        snapshot: Arc<dyn SnapshotSource>,
    ) -> Result<(), SidecarError> {
        if !self.enabled() {
            return Err(SidecarError::NotReady);
        }
        {
            let mut state = self.state_write()?;
            if state.status == SidecarStatus::Converting {
                return Err(SidecarError::Converting);
            }
            state.status = SidecarStatus::Converting;
            state.stale_reason = None;
            state.current = None;
            state.committed = None;
            state.last_committed_block = 0;
        }

        let resuming = matches!(
            ConversionProgress::load(&*self.store)?,
            Some(progress) if progress.stage == crate::domain::records::ConversionStage::Running
        );
        if !resuming {
            self.node_db.reset().map_err(from_trie)?;
            self.queue.lock().map_err(|_| lock_poisoned())?.reset()?;
            self.clear_root_records()?;
        }

        self.stop_converter.store(false, Ordering::SeqCst);
        let sidecar = Arc::clone(self);
        let anchor = BlockRef::new(block_num, block_hash);
        let handle = std::thread::Builder::new()
            .name("ubt-converter".into())
            .spawn(move || sidecar.run_conversion(state_root, anchor, snapshot))
            .map_err(|e| SidecarError::IoError(format!("spawn converter: {e}")))?;
        *self.converter_thread.lock().map_err(|_| lock_poisoned())? = Some(handle);
        Ok(())
    }

    /// Advise the converter to stop after its current batch.
    pub fn stop_conversion(&self) {
        self.stop_converter.store(true, Ordering::SeqCst);
    }

    fn run_conversion(&self, state_root: Hash, anchor: BlockRef, snapshot: Arc<dyn SnapshotSource>) {
        let ctx = ConversionContext {
            store: &*self.store,
            node_db: &self.node_db,
            snapshot: &*snapshot,
            preimages: &*self.preimages,
            codes: &*self.codes,
            config: &self.config,
            stop: &self.stop_converter,
            anchor,
            state_root,
        };

        match converter::run(&ctx) {
            Ok(ConversionOutcome::Completed(root)) => {
                if let Err(err) = self.finalize_conversion(root, anchor) {
                    self.mark_stale(&err.to_string());
                }
            }
            Ok(ConversionOutcome::Stopped) => {
                if let Ok(mut state) = self.state.write() {
                    if state.status == SidecarStatus::Converting {
                        state.status = SidecarStatus::AwaitingConversion;
                    }
                }
            }
            Err(err) => self.mark_stale(&err.to_string()),
        }
    }

    /// Cut over from conversion to live tracking: persist the anchor
    /// records, drop the progress record, drain the queue, go Ready.
    fn finalize_conversion(&self, root: Hash, anchor: BlockRef) -> Result<(), SidecarError> {
        let record = RootRecord::new(root, anchor);
        let record_bytes = bincode::serialize(&record)
            .map_err(|e| SidecarError::DecodeError(format!("root record: {e}")))?;
        self.store
            .atomic_batch_write(vec![
                BatchOperation::put(schema::CURRENT_ROOT_KEY.to_vec(), record_bytes.clone()),
                BatchOperation::put(schema::COMMITTED_ROOT_KEY.to_vec(), record_bytes),
                BatchOperation::put(schema::block_root_key(&anchor.hash), root.to_vec()),
                BatchOperation::delete(schema::CONVERSION_PROGRESS_KEY.to_vec()),
            ])
            .map_err(from_store)?;

        {
            let mut state = self.state_write()?;
            state.current = Some((root, anchor));
            state.committed = Some((root, anchor));
            state.last_committed_block = anchor.number;
        }
        tracing::info!(
            root = %short_hash(&root),
            block = anchor.number,
            "conversion finalized; draining queue"
        );

        // Drain until the queue stays empty, then flip to Ready.
        loop {
            let head = self.chain.head_ref().number;
            let applied = self.replay_queue(head)?;
            let empty = {
                let queue = self.queue.lock().map_err(|_| lock_poisoned())?;
                queue.is_empty()?
            };
            if empty || applied == 0 {
                if !empty {
                    tracing::warn!("queue entries beyond canonical head left pending");
                }
                let mut state = self.state_write()?;
                state.status = SidecarStatus::Ready;
                break;
            }
        }
        tracing::info!("sidecar ready");
        Ok(())
    }

    // =========================================================================
    // UPDATE PIPELINE
    // =========================================================================

    /// Apply one delta on top of the current root. Any failure here means
    /// the UBT can no longer follow the canonical chain, so the caller
    /// marks the sidecar stale.
    fn apply_delta(&self, delta: &BlockDelta) -> Result<(), SidecarError> {
        let (current_root, current_block) = {
            let state = self.state_read()?;
            state.current.ok_or(SidecarError::NotReady)?
        };

        if delta.parent_hash != current_block.hash {
            return Err(SidecarError::QueueGap {
                expected: full_hash(&delta.parent_hash),
                found: full_hash(&current_block.hash),
            });
        }

        let sequence = sequence_update(&delta.update, &*self.preimages)?;

        let reader = self.node_db.reader(current_root).map_err(from_trie)?;
        let mut trie = BinaryTrie::open(current_root, reader);

        for deletion in &sequence.deletions {
            for slot in &deletion.slots {
                trie.delete_storage(&deletion.address, slot).map_err(from_trie)?;
            }
            if let Some(prior) = trie.get_account(&deletion.address).map_err(from_trie)? {
                if prior.code_size > 0 {
                    trie.delete_contract_code(&deletion.address, prior.code_size)
                        .map_err(from_trie)?;
                }
            }
            trie.mark_account_deleted(&deletion.address).map_err(from_trie)?;
        }

        for write in &sequence.writes {
            self.apply_account_write(&mut trie, write)?;
        }

        let commit = trie.commit().map_err(from_trie)?;
        let new_root = commit.root;
        self.node_db
            .update(new_root, current_root, delta.block_num, commit.nodes, commit.leaves)
            .map_err(from_trie)?;

        let block = delta.block_ref();
        let record = RootRecord::new(new_root, block);
        let record_bytes = bincode::serialize(&record)
            .map_err(|e| SidecarError::DecodeError(format!("root record: {e}")))?;
        self.store
            .atomic_batch_write(vec![
                BatchOperation::put(schema::block_root_key(&block.hash), new_root.to_vec()),
                BatchOperation::put(schema::CURRENT_ROOT_KEY.to_vec(), record_bytes),
            ])
            .map_err(from_store)?;

        // Pointers go live only after everything above is durable.
        let should_commit = {
            let mut state = self.state_write()?;
            state.current = Some((new_root, block));
            match state.commit_interval {
                Some(interval) => {
                    block.number.saturating_sub(state.last_committed_block) >= interval
                }
                None => false,
            }
        };
        if should_commit {
            self.commit_to_disk(new_root, block)?;
        }

        tracing::debug!(
            block = block.number,
            root = %short_hash(&new_root),
            "delta applied"
        );
        Ok(())
    }

    fn apply_account_write(
        &self,
        trie: &mut BinaryTrie<NodeDbReader<'_, S>>,
        write: &AccountWrite,
    ) -> Result<(), SidecarError> {
        if let Some(slim) = &write.account {
            let code_size = if slim.has_code() {
                if let Some(code) = &write.new_code {
                    code.len() as u32
                } else {
                    let existing = trie.get_account(&write.address).map_err(from_trie)?;
                    match existing {
                        Some(account) if account.code_hash == slim.code_hash => account.code_size,
                        _ => self
                            .codes
                            .code(&slim.code_hash)
                            .ok_or_else(|| SidecarError::PreimageMissing {
                                hash: full_hash(&slim.code_hash),
                            })?
                            .len() as u32,
                    }
                }
            } else {
                0
            };

            let account = UbtAccount::new(slim.balance, slim.nonce, slim.code_hash, code_size)
                .map_err(from_trie)?;
            trie.update_account(&write.address, &account).map_err(from_trie)?;
            if let Some(code) = &write.new_code {
                trie.update_contract_code(&write.address, slim.code_hash, code)
                    .map_err(from_trie)?;
            }
        }

        for (slot, value) in &write.slots {
            match value {
                Some(value) => trie
                    .update_storage(&write.address, slot, *value)
                    .map_err(from_trie)?,
                None => trie.delete_storage(&write.address, slot).map_err(from_trie)?,
            }
        }
        Ok(())
    }

    fn commit_to_disk(&self, root: Hash, block: BlockRef) -> Result<(), SidecarError> {
        self.node_db.commit(root).map_err(from_trie)?;
        RootRecord::new(root, block).save(&*self.store, schema::COMMITTED_ROOT_KEY)?;
        let mut state = self.state_write()?;
        state.committed = Some((root, block));
        state.last_committed_block = block.number;
        Ok(())
    }

    fn enqueue_delta(&self, delta: &BlockDelta) -> Result<(), SidecarError> {
        let result = {
            let queue = self.queue.lock().map_err(|_| lock_poisoned())?;
            queue.enqueue(delta)
        };
        if let Err(err) = &result {
            if matches!(err, SidecarError::QueueOverflow { .. }) {
                self.mark_stale(&err.to_string());
            }
        }
        result
    }

    /// Replay queued deltas in ascending block order up to `up_to`,
    /// dropping non-canonical and already-applied entries. Returns how
    /// many deltas were applied.
    fn replay_queue(&self, up_to: u64) -> Result<usize, SidecarError> {
        let entries = {
            let queue = self.queue.lock().map_err(|_| lock_poisoned())?;
            queue.iterate()?
        };

        let mut applied = 0usize;
        for (number, hash, delta) in entries {
            if number > up_to {
                break;
            }

            if self.chain.canonical_hash(number) != Some(hash) {
                tracing::debug!(block = number, "dropping non-canonical queued delta");
                self.delete_queued(number, &hash)?;
                continue;
            }

            let current_block = {
                let state = self.state_read()?;
                state.current.ok_or(SidecarError::NotReady)?.1
            };
            if number <= current_block.number {
                self.delete_queued(number, &hash)?;
                continue;
            }
            if delta.parent_hash != current_block.hash {
                let err = SidecarError::QueueGap {
                    expected: full_hash(&delta.parent_hash),
                    found: full_hash(&current_block.hash),
                };
                self.mark_stale(&err.to_string());
                return Err(err);
            }

            self.apply_delta(&delta).map_err(|err| {
                self.mark_stale(&err.to_string());
                err
            })?;
            self.delete_queued(number, &hash)?;
            applied += 1;
        }
        Ok(applied)
    }

    fn delete_queued(&self, number: u64, hash: &Hash) -> Result<(), SidecarError> {
        self.queue
            .lock()
            .map_err(|_| lock_poisoned())?
            .delete(number, hash)
    }

    fn clear_root_records(&self) -> Result<(), SidecarError> {
        let mut batch = vec![
            BatchOperation::delete(schema::CURRENT_ROOT_KEY.to_vec()),
            BatchOperation::delete(schema::COMMITTED_ROOT_KEY.to_vec()),
        ];
        for (key, _) in self
            .store
            .prefix_scan(schema::BLOCK_ROOT_PREFIX)
            .map_err(from_store)?
        {
            batch.push(BatchOperation::delete(key));
        }
        self.store.atomic_batch_write(batch).map_err(from_store)
    }

    // =========================================================================
    // STATE HELPERS
    // =========================================================================

    fn state_read(&self) -> Result<std::sync::RwLockReadGuard<'_, SidecarState>, SidecarError> {
        self.state.read().map_err(|_| lock_poisoned())
    }

    fn state_write(&self) -> Result<std::sync::RwLockWriteGuard<'_, SidecarState>, SidecarError> {
        self.state.write().map_err(|_| lock_poisoned())
    }

    fn ensure_readable(&self) -> Result<(), SidecarError> {
        let state = self.state_read()?;
        match state.status {
            SidecarStatus::Ready => Ok(()),
            SidecarStatus::Converting => Err(SidecarError::Converting),
            SidecarStatus::AwaitingConversion => Err(SidecarError::NotReady),
            SidecarStatus::Stale => Err(SidecarError::Stale(
                state.stale_reason.clone().unwrap_or_default(),
            )),
        }
    }
}

fn lock_poisoned() -> SidecarError {
    SidecarError::IoError("sidecar lock poisoned".into())
}

impl<S: KeyValueStore + 'static> SidecarApi for UbtSidecar<S> {
    fn enabled(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn ready(&self) -> bool {
        self.state
            .read()
            .map(|s| s.status == SidecarStatus::Ready)
            .unwrap_or(false)
    }

    fn converting(&self) -> bool {
        self.state
            .read()
            .map(|s| s.status == SidecarStatus::Converting)
            .unwrap_or(false)
    }

    fn stale(&self) -> bool {
        self.state
            .read()
            .map(|s| s.status == SidecarStatus::Stale)
            .unwrap_or(false)
    }

    fn current_root(&self) -> Option<Hash> {
        self.state.read().ok()?.current.map(|(root, _)| root)
    }

    fn current_info(&self) -> Option<(Hash, BlockRef)> {
        self.state.read().ok()?.current_info()
    }

    fn ubt_root(&self, block_hash: &Hash) -> Result<Option<Hash>, SidecarError> {
        load_block_root(&*self.store, block_hash)
    }

    fn read_account(
        &self,
        root: Hash,
        address: &Address,
    ) -> Result<Option<UbtAccount>, SidecarError> {
        self.ensure_readable()?;
        match self
            .node_db
            .flat_get(root, &basic_data_key(address))
            .map_err(from_trie)?
        {
            FlatLookup::Value(basic) => {
                let code_hash = match self
                    .node_db
                    .flat_get(root, &code_hash_key(address))
                    .map_err(from_trie)?
                {
                    FlatLookup::Value(hash) => Some(hash),
                    _ => None,
                };
                unpack_account(&basic, code_hash).map(Some).map_err(from_trie)
            }
            FlatLookup::Absent => Ok(None),
            FlatLookup::NotCovered => {
                let mut trie = self.open_trie(root)?;
                trie.get_account(address).map_err(from_trie)
            }
        }
    }

    fn read_storage(
        &self,
        root: Hash,
        address: &Address,
        slot: &StorageKey,
    ) -> Result<StorageValue, SidecarError> {
        self.ensure_readable()?;
        match self
            .node_db
            .flat_get(root, &storage_slot_key(address, slot))
            .map_err(from_trie)?
        {
            FlatLookup::Value(value) => Ok(value),
            FlatLookup::Absent => Ok([0u8; 32]),
            FlatLookup::NotCovered => {
                let mut trie = self.open_trie(root)?;
                Ok(trie
                    .get_storage(address, slot)
                    .map_err(from_trie)?
                    .unwrap_or([0u8; 32]))
            }
        }
    }

    fn apply_state_update(
        &self,
        block: BlockRef,
        parent_hash: Hash,
        update: StateUpdate,
    ) -> Result<(), SidecarError> {
        if !self.enabled() {
            return Err(SidecarError::NotReady);
        }
        let delta = BlockDelta::new(block, parent_hash, update);
        let status = self.state_read()?.status;
        match status {
            SidecarStatus::Ready => self.apply_delta(&delta).map_err(|err| {
                self.mark_stale(&err.to_string());
                err
            }),
            SidecarStatus::Converting => self.enqueue_delta(&delta),
            SidecarStatus::AwaitingConversion => Err(SidecarError::NotReady),
            SidecarStatus::Stale => {
                Err(SidecarError::Stale(self.stale_reason().unwrap_or_default()))
            }
        }
    }

    fn enqueue_update(
        &self,
        block: BlockRef,
        parent_hash: Hash,
        update: StateUpdate,
    ) -> Result<(), SidecarError> {
        if !self.enabled() {
            return Err(SidecarError::NotReady);
        }
        let delta = BlockDelta::new(block, parent_hash, update);
        let status = self.state_read()?.status;
        match status {
            SidecarStatus::Converting | SidecarStatus::AwaitingConversion => {
                self.enqueue_delta(&delta)
            }
            // Nothing left to queue behind; apply directly.
            SidecarStatus::Ready => self.apply_delta(&delta).map_err(|err| {
                self.mark_stale(&err.to_string());
                err
            }),
            SidecarStatus::Stale => {
                Err(SidecarError::Stale(self.stale_reason().unwrap_or_default()))
            }
        }
    }

    fn handle_reorg(&self, ancestor_hash: Hash, ancestor_num: u64) -> Result<(), SidecarError> {
        let status = self.state_read()?.status;
        match status {
            SidecarStatus::Converting | SidecarStatus::AwaitingConversion => {
                // Queued deltas for abandoned blocks fall out at replay
                // through the canonical-hash check.
                tracing::debug!(block = ancestor_num, "reorg during conversion; queue will filter");
                return Ok(());
            }
            SidecarStatus::Stale => {
                return Err(SidecarError::Stale(self.stale_reason().unwrap_or_default()))
            }
            SidecarStatus::Ready => {}
        }

        let Some(root) = load_block_root(&*self.store, &ancestor_hash)? else {
            let err = SidecarError::NotRecoverable {
                root: format!("no mapping for block {}", full_hash(&ancestor_hash)),
            };
            self.mark_stale(&err.to_string());
            return Err(err);
        };

        if !self.node_db.recoverable(root) {
            let err = SidecarError::NotRecoverable {
                root: full_hash(&root),
            };
            self.mark_stale(&err.to_string());
            return Err(err);
        }

        self.node_db.recover(root).map_err(from_trie)?;
        let block = BlockRef::new(ancestor_num, ancestor_hash);
        RootRecord::new(root, block).save(&*self.store, schema::CURRENT_ROOT_KEY)?;
        {
            let mut state = self.state_write()?;
            state.current = Some((root, block));
            if state.last_committed_block > ancestor_num {
                state.last_committed_block = ancestor_num;
            }
        }
        tracing::info!(
            block = ancestor_num,
            root = %short_hash(&root),
            "reorg recovered"
        );
        Ok(())
    }

    fn set_commit_interval(&self, blocks: Option<u64>) {
        if let Ok(mut state) = self.state.write() {
            state.commit_interval = blocks;
        }
    }

    fn mark_stale(&self, reason: &str) {
        if let Ok(mut state) = self.state.write() {
            state.mark_stale(reason);
        }
        tracing::error!(reason, "sidecar marked stale");
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_converter.store(true, Ordering::SeqCst);
        if let Ok(mut guard) = self.converter_thread.lock() {
            if let Some(handle) = guard.take() {
                let _ = handle.join();
            }
        }

        let flush = self
            .state
            .read()
            .ok()
            .filter(|state| state.status == SidecarStatus::Ready)
            .and_then(|state| state.current);
        if let Some((root, block)) = flush {
            if let Err(err) = self.commit_to_disk(root, block) {
                tracing::error!(error = %err, "flush on close failed");
            }
        }
        tracing::info!("sidecar closed");
    }
}
