//! # Inbound Port (Driving Port)
//!
//! The service surface the sidecar exposes to the host and the RPC layer.
//! Reads fail with typed errors until the sidecar is Ready; they never
//! silently return empty values.

use crate::domain::delta::StateUpdate;
use shared_types::{Address, BlockRef, Hash, SidecarError, StorageKey, StorageValue};
use ubt_trie::UbtAccount;

/// The sidecar's service API.
pub trait SidecarApi {
    /// Whether the sidecar is accepting work (not closed).
    fn enabled(&self) -> bool;

    /// Whether deltas apply directly and reads are served.
    fn ready(&self) -> bool;

    /// Whether the initial conversion is running.
    fn converting(&self) -> bool;

    /// Whether the sidecar stopped on an unrecoverable inconsistency.
    fn stale(&self) -> bool;

    /// The current UBT root, once one exists.
    fn current_root(&self) -> Option<Hash>;

    /// The current root together with its block.
    fn current_info(&self) -> Option<(Hash, BlockRef)>;

    /// The UBT root recorded for `block_hash`, if any.
    fn ubt_root(&self, block_hash: &Hash) -> Result<Option<Hash>, SidecarError>;

    /// Read an account under `root`.
    fn read_account(&self, root: Hash, address: &Address)
        -> Result<Option<UbtAccount>, SidecarError>;

    /// Read a storage slot under `root`; absent slots read as zero.
    fn read_storage(
        &self,
        root: Hash,
        address: &Address,
        slot: &StorageKey,
    ) -> Result<StorageValue, SidecarError>;

    /// Apply a block's delta when Ready, or enqueue it while Converting.
    fn apply_state_update(
        &self,
        block: BlockRef,
        parent_hash: Hash,
        update: StateUpdate,
    ) -> Result<(), SidecarError>;

    /// Force a delta into the queue regardless of status.
    fn enqueue_update(
        &self,
        block: BlockRef,
        parent_hash: Hash,
        update: StateUpdate,
    ) -> Result<(), SidecarError>;

    /// Rewind to a canonical ancestor after a host-reported reorg.
    fn handle_reorg(&self, ancestor_hash: Hash, ancestor_num: u64) -> Result<(), SidecarError>;

    /// Change the disk-commit cadence.
    fn set_commit_interval(&self, blocks: Option<u64>);

    /// Trip the stale flag; further writes are rejected until a fresh
    /// conversion.
    fn mark_stale(&self, reason: &str);

    /// Stop background work and flush current state to disk.
    fn close(&self);
}
