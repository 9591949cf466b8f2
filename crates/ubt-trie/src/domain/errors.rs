//! # Trie Stack Error Types
//!
//! Defines all error conditions for trie and node-database operations.
//! Each error is recoverable - no panics occur in production code.

use thiserror::Error;

/// Errors raised by the trie and node database.
#[derive(Debug, Clone, Error)]
pub enum TrieError {
    /// A node referenced through a hashed placeholder was absent from the
    /// node store. Surfaced without retry; the trie stays readable at the
    /// pre-operation root.
    #[error("node not found at path {path}")]
    NodeNotFound { path: String },

    /// A serialized node or record failed to decode. Fatal to the current
    /// operation.
    #[error("decode failed: {reason}")]
    Decode { reason: String },

    /// A resolved node's hash does not match the reference that pointed at
    /// it. Indicates store corruption.
    #[error("corrupt node at path {path}: hash mismatch")]
    CorruptNode { path: String },

    /// A value could not be encoded into its leaf layout.
    #[error("encode failed: {reason}")]
    Encode { reason: String },

    /// The requested root is not present in the layer tree or on disk.
    #[error("unknown root {root}")]
    UnknownRoot { root: String },

    /// Underlying key/value store failure.
    #[error("store error: {0}")]
    Store(#[from] KVStoreError),
}

/// Errors raised by key/value store implementations.
#[derive(Debug, Clone, Error)]
pub enum KVStoreError {
    /// I/O failure in the backing store.
    #[error("io error: {message}")]
    Io { message: String },

    /// Internal error: a lock guarding the store was poisoned.
    /// Indicates a previous thread panicked while holding the lock.
    #[error("store lock poisoned - internal consistency error")]
    LockPoisoned,
}
