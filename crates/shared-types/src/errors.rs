//! # Boundary Error Codes
//!
//! Error set surfaced across the sidecar boundary to the host and the RPC
//! layer. Each error is recoverable from the caller's perspective - no
//! panics occur in production code. Errors that corrupt the current
//! root/block/hash invariant additionally trip the service's stale flag.

use thiserror::Error;

/// Errors surfaced across the sidecar boundary.
#[derive(Debug, Clone, Error)]
pub enum SidecarError {
    /// No UBT state exists yet; conversion has not been started.
    /// Readers must not receive fabricated values before conversion.
    #[error("sidecar not ready: no binary trie state available")]
    NotReady,

    /// Initial conversion is still running; reads are rejected until the
    /// snapshot walk completes and the queue is drained.
    #[error("sidecar converting: initial snapshot walk in progress")]
    Converting,

    /// The sidecar detected an unrecoverable inconsistency and stopped
    /// applying updates. The host must trigger a fresh conversion.
    #[error("sidecar stale: {0}")]
    Stale(String),

    /// A trie node referenced by hash was absent from the node database.
    #[error("node not found at path {path}")]
    NodeNotFound { path: String },

    /// An address or slot-key preimage required to derive a trie key was
    /// absent from the preimage store.
    #[error("preimage missing for hash {hash}")]
    PreimageMissing { hash: String },

    /// A queued delta does not extend the current head.
    #[error("queue gap: entry parent {expected} does not match current head {found}")]
    QueueGap { expected: String, found: String },

    /// The update queue exceeded its configured limit during conversion.
    #[error("queue overflow: limit of {limit} pending deltas exceeded")]
    QueueOverflow { limit: usize },

    /// A reorg target root is outside the node database's retention window.
    #[error("root {root} not recoverable: outside the retention window")]
    NotRecoverable { root: String },

    /// An on-disk record or serialized node failed to decode.
    #[error("decode error: {0}")]
    DecodeError(String),

    /// Underlying key/value store failure.
    #[error("io error: {0}")]
    IoError(String),
}
