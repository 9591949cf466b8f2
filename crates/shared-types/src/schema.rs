//! # Persistent Key Schema
//!
//! Key layout for every record the sidecar persists in the shared
//! key/value store. All keys live under a dedicated namespace prefix so the
//! sidecar can coexist with the host database without collisions.
//!
//! ## Layout
//!
//! | Record | Key |
//! |--------|-----|
//! | Current root | `ubt:cr` |
//! | Committed root | `ubt:kr` |
//! | Block root map | `ubt:br` ++ block hash |
//! | Conversion progress | `ubt:cp` |
//! | Queue entry | `ubt:q:` ++ u64 BE block number ++ block hash |
//! | Queue meta | `ubt:qm` |
//! | Trie node | `ubt:n:` ++ path key |
//! | Flat leaf | `ubt:f:` ++ tree key |
//! | Preimage | `ubt:p:` ++ keccak hash |
//!
//! The queue entry key sorts by `(block number, block hash)` ascending, so a
//! plain prefix scan yields replay order.

use crate::entities::Hash;

/// Namespace prefix for all sidecar records.
pub const SIDECAR_PREFIX: &[u8] = b"ubt:";

/// Key of the current (possibly uncommitted) root record.
pub const CURRENT_ROOT_KEY: &[u8] = b"ubt:cr";

/// Key of the last disk-committed root record.
pub const COMMITTED_ROOT_KEY: &[u8] = b"ubt:kr";

/// Key of the conversion progress record.
pub const CONVERSION_PROGRESS_KEY: &[u8] = b"ubt:cp";

/// Key of the update-queue meta record.
pub const QUEUE_META_KEY: &[u8] = b"ubt:qm";

/// Prefix of the block hash to UBT root mapping.
pub const BLOCK_ROOT_PREFIX: &[u8] = b"ubt:br";

/// Prefix of queued block deltas.
pub const QUEUE_PREFIX: &[u8] = b"ubt:q:";

/// Prefix of path-keyed trie nodes.
pub const TRIE_NODE_PREFIX: &[u8] = b"ubt:n:";

/// Prefix of the flat leaf view.
pub const FLAT_LEAF_PREFIX: &[u8] = b"ubt:f:";

/// Prefix of the shared preimage table.
pub const PREIMAGE_PREFIX: &[u8] = b"ubt:p:";

/// Key of the block root mapping for `block_hash`.
pub fn block_root_key(block_hash: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(BLOCK_ROOT_PREFIX.len() + 32);
    key.extend_from_slice(BLOCK_ROOT_PREFIX);
    key.extend_from_slice(block_hash);
    key
}

/// Key of the queued delta for `(block_num, block_hash)`.
///
/// Big-endian block number first, so lexicographic key order equals
/// ascending `(block_num, block_hash)` order.
pub fn queue_entry_key(block_num: u64, block_hash: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(QUEUE_PREFIX.len() + 8 + 32);
    key.extend_from_slice(QUEUE_PREFIX);
    key.extend_from_slice(&block_num.to_be_bytes());
    key.extend_from_slice(block_hash);
    key
}

/// Key of a path-keyed trie node.
pub fn trie_node_key(path_key: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(TRIE_NODE_PREFIX.len() + path_key.len());
    key.extend_from_slice(TRIE_NODE_PREFIX);
    key.extend_from_slice(path_key);
    key
}

/// Key of a flat leaf value.
pub fn flat_leaf_key(tree_key: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(FLAT_LEAF_PREFIX.len() + 32);
    key.extend_from_slice(FLAT_LEAF_PREFIX);
    key.extend_from_slice(tree_key);
    key
}

/// Key of a preimage table entry.
pub fn preimage_key(hash: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(PREIMAGE_PREFIX.len() + 32);
    key.extend_from_slice(PREIMAGE_PREFIX);
    key.extend_from_slice(hash);
    key
}
