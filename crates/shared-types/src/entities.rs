//! # Shared Primitive Types
//!
//! Core byte-array primitives and constants used across the trie stack and
//! the sidecar service.

use serde::{Deserialize, Serialize};

pub type Hash = [u8; 32];
pub type Address = [u8; 20];
pub type StorageKey = [u8; 32];
pub type StorageValue = [u8; 32];

/// The all-zero hash. Root of a UBT that contains no live entries, and the
/// hash of the `Empty` node variant.
pub const ZERO_HASH: Hash = [0u8; 32];

/// Root of an empty unified binary trie.
pub const EMPTY_UBT_ROOT: Hash = ZERO_HASH;

/// Keccak256 of the empty byte string. Code hash of every account without
/// contract code.
/// Value: keccak256("") = 0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470
pub const EMPTY_CODE_HASH: Hash = [
    0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c, 0x92, 0x7e, 0x7d, 0xb2, 0xdc, 0xc7, 0x03, 0xc0,
    0xe5, 0x00, 0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b, 0x7b, 0xfa, 0xd8, 0x04, 0x5d, 0x85, 0xa4, 0x70,
];

/// Keccak256 hash of an empty RLP-encoded trie.
/// Storage root of every MPT account without storage, per the Ethereum
/// specification.
/// Value: keccak256(RLP("")) = 0x56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421
pub const EMPTY_MPT_ROOT: Hash = [
    0x56, 0xe8, 0x1f, 0x17, 0x1b, 0xcc, 0x55, 0xa6, 0xff, 0x83, 0x45, 0xe6, 0x92, 0xc0, 0xf8, 0x6e,
    0x5b, 0x48, 0xe0, 0x1b, 0x99, 0x6c, 0xad, 0xc0, 0x01, 0x62, 0x2f, 0xb5, 0xe3, 0x63, 0xb4, 0x21,
];

/// A `(number, hash)` reference to a canonical block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    /// Block height on the canonical chain.
    pub number: u64,
    /// Hash of the block header.
    pub hash: Hash,
}

impl BlockRef {
    pub fn new(number: u64, hash: Hash) -> Self {
        Self { number, hash }
    }
}

/// Abbreviated hex rendering of a hash for log lines: first four bytes.
pub fn short_hash(hash: &Hash) -> String {
    hex::encode(&hash[..4])
}

/// Full hex rendering of a hash.
pub fn full_hash(hash: &Hash) -> String {
    hex::encode(hash)
}

/// Byte-wise big-endian increment. Returns `None` on wrap past `0xff…ff`,
/// which iteration code treats as "walk complete".
pub fn increment_hash(hash: &Hash) -> Option<Hash> {
    let mut next = *hash;
    for byte in next.iter_mut().rev() {
        let (value, overflow) = byte.overflowing_add(1);
        *byte = value;
        if !overflow {
            return Some(next);
        }
    }
    None
}
