//! # Outbound Ports (Driven Ports)
//!
//! Dependencies the sidecar requires from the host chain: flat snapshot
//! iteration over the MPT, preimage and code lookups, and the canonical
//! block-number-to-hash mapping.

use shared_types::{BlockRef, Hash};
use thiserror::Error;

/// Failures surfaced by snapshot iterators.
///
/// Retryable conditions (stale snapshot, evicted layer, still syncing)
/// make the converter re-open at a fresh root with backoff; anything else
/// fails the conversion.
#[derive(Debug, Clone, Error)]
pub enum IteratorError {
    /// The iterator's backing snapshot moved or is unavailable right
    /// now; re-open and continue.
    #[error("retryable snapshot error: {reason}")]
    Retryable { reason: String },

    /// The walk cannot continue.
    #[error("snapshot iteration failed: {reason}")]
    Fatal { reason: String },
}

impl IteratorError {
    pub fn retryable(reason: impl Into<String>) -> Self {
        IteratorError::Retryable {
            reason: reason.into(),
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        IteratorError::Fatal {
            reason: reason.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, IteratorError::Retryable { .. })
    }
}

/// Key-ordered iterator over the account set at one state root.
pub trait AccountIterator {
    /// The next `(account hash, slim-RLP account)` pair, or `None` when
    /// the walk is exhausted.
    fn next_account(&mut self) -> Result<Option<(Hash, Vec<u8>)>, IteratorError>;
}

/// Key-ordered iterator over one account's storage at one state root.
pub trait StorageIterator {
    /// The next `(slot hash, encoded value)` pair, or `None` when the
    /// walk is exhausted.
    fn next_slot(&mut self) -> Result<Option<(Hash, Vec<u8>)>, IteratorError>;
}

/// Flat snapshot access to the host MPT.
pub trait SnapshotSource: Send + Sync {
    /// The state root of the current head; the converter re-reads this
    /// after a retryable failure.
    fn head_state_root(&self) -> Result<Hash, IteratorError>;

    /// Open an account iterator at `state_root`, seeking to `start`.
    fn account_iterator(
        &self,
        state_root: Hash,
        start: Hash,
    ) -> Result<Box<dyn AccountIterator + Send + '_>, IteratorError>;

    /// Open a storage iterator for `account_hash` at `state_root`,
    /// seeking to `start`.
    fn storage_iterator(
        &self,
        state_root: Hash,
        account_hash: Hash,
        start: Hash,
    ) -> Result<Box<dyn StorageIterator + Send + '_>, IteratorError>;
}

/// Read access to the host's preimage table.
pub trait PreimageSource: Send + Sync {
    /// The preimage of a keccak hash (address or raw slot key), if known.
    fn preimage(&self, hash: &Hash) -> Option<Vec<u8>>;
}

/// Read access to the host's contract-code table.
pub trait CodeSource: Send + Sync {
    /// The code blob with this keccak hash, if known.
    fn code(&self, code_hash: &Hash) -> Option<Vec<u8>>;
}

/// The host's view of the canonical chain.
pub trait CanonicalChain: Send + Sync {
    /// Hash of the canonical block at `number`, if any.
    fn canonical_hash(&self, number: u64) -> Option<Hash>;

    /// The current canonical head.
    fn head_ref(&self) -> BlockRef;
}
