//! # Persistent Records
//!
//! The sidecar's durable bookkeeping in the shared key/value store: the
//! current and committed root records, the block-to-root map, and the
//! conversion progress record.
//!
//! The progress record and the current-root record are mutually
//! exclusive bookkeepings: while a progress record exists on disk, the
//! sidecar is not Ready.

use crate::domain::errors::from_store;
use serde::{Deserialize, Serialize};
use shared_types::{schema, BlockRef, Hash, SidecarError};
use ubt_trie::KeyValueStore;

/// A root bound to the block that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootRecord {
    pub root: Hash,
    pub block: BlockRef,
}

impl RootRecord {
    pub fn new(root: Hash, block: BlockRef) -> Self {
        Self { root, block }
    }

    /// Load the record stored under `key`, if any.
    pub fn load<S: KeyValueStore>(store: &S, key: &[u8]) -> Result<Option<Self>, SidecarError> {
        match store.get(key).map_err(from_store)? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| SidecarError::DecodeError(format!("root record: {e}"))),
            None => Ok(None),
        }
    }

    /// Persist the record under `key`.
    pub fn save<S: KeyValueStore>(&self, store: &S, key: &[u8]) -> Result<(), SidecarError> {
        let bytes = bincode::serialize(self)
            .map_err(|e| SidecarError::DecodeError(format!("root record: {e}")))?;
        store.put(key, &bytes).map_err(from_store)
    }
}

/// Read the block-to-root mapping for `block_hash`.
pub fn load_block_root<S: KeyValueStore>(
    store: &S,
    block_hash: &Hash,
) -> Result<Option<Hash>, SidecarError> {
    match store.get(&schema::block_root_key(block_hash)).map_err(from_store)? {
        Some(bytes) => {
            let root: Hash = bytes.as_slice().try_into().map_err(|_| {
                SidecarError::DecodeError(format!("block root of {} bytes", bytes.len()))
            })?;
            Ok(Some(root))
        }
        None => Ok(None),
    }
}

// =============================================================================
// CONVERSION PROGRESS
// =============================================================================

/// Stage of the MPT-to-UBT conversion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionStage {
    Idle,
    Running,
    Done,
    Failed,
}

/// Resumable progress of the conversion walk, persisted per batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversionProgress {
    pub stage: ConversionStage,
    /// MPT state root the walk currently iterates.
    pub state_root: Hash,
    /// UBT root as of the last batch commit.
    pub ubt_root: Hash,
    /// First account hash not yet fully processed; the next iterator
    /// seeks here. All-ones wrapping to zero means the walk is complete.
    pub next_account_hash: Hash,
    pub accounts_done: u64,
    pub slots_done: u64,
    /// Account whose storage walk was interrupted, if any.
    pub current_account: Option<Hash>,
    /// First slot hash not yet processed within `current_account`.
    pub next_storage_hash: Option<Hash>,
    /// Unix seconds when the conversion started.
    pub started: u64,
    /// Human-readable failure, kept for diagnostics until a fresh start.
    pub last_error: Option<String>,
}

impl ConversionProgress {
    /// A fresh record at the start of a conversion.
    pub fn begin(state_root: Hash, started: u64) -> Self {
        Self {
            stage: ConversionStage::Running,
            state_root,
            ubt_root: shared_types::ZERO_HASH,
            next_account_hash: shared_types::ZERO_HASH,
            accounts_done: 0,
            slots_done: 0,
            current_account: None,
            next_storage_hash: None,
            started,
            last_error: None,
        }
    }

    /// Load the progress record, if present.
    pub fn load<S: KeyValueStore>(store: &S) -> Result<Option<Self>, SidecarError> {
        match store
            .get(schema::CONVERSION_PROGRESS_KEY)
            .map_err(from_store)?
        {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| SidecarError::DecodeError(format!("conversion progress: {e}"))),
            None => Ok(None),
        }
    }

    /// Persist the record.
    pub fn save<S: KeyValueStore>(&self, store: &S) -> Result<(), SidecarError> {
        let bytes = bincode::serialize(self)
            .map_err(|e| SidecarError::DecodeError(format!("conversion progress: {e}")))?;
        store
            .put(schema::CONVERSION_PROGRESS_KEY, &bytes)
            .map_err(from_store)
    }

    /// Delete the record; conversion is over.
    pub fn clear<S: KeyValueStore>(store: &S) -> Result<(), SidecarError> {
        store
            .delete(schema::CONVERSION_PROGRESS_KEY)
            .map_err(from_store)
    }
}
