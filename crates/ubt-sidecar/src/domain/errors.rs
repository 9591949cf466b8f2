//! # Error Conversions
//!
//! Maps trie-layer errors onto the boundary error codes.

use shared_types::SidecarError;
use ubt_trie::{KVStoreError, TrieError};

/// Map a trie-layer failure onto the boundary error set.
pub fn from_trie(err: TrieError) -> SidecarError {
    match err {
        TrieError::NodeNotFound { path } => SidecarError::NodeNotFound { path },
        TrieError::UnknownRoot { root } => SidecarError::NotRecoverable { root },
        TrieError::Decode { reason } => SidecarError::DecodeError(reason),
        TrieError::CorruptNode { path } => {
            SidecarError::DecodeError(format!("corrupt node at path {path}"))
        }
        TrieError::Encode { reason } => SidecarError::DecodeError(reason),
        TrieError::Store(err) => from_store(err),
    }
}

/// Map a store failure onto the boundary error set.
pub fn from_store(err: KVStoreError) -> SidecarError {
    SidecarError::IoError(err.to_string())
}
