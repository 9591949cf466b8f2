//! # Tree Key Codec
//!
//! Derives 32-byte binary-trie keys from `(address, attribute)` and
//! `(address, storage slot)` pairs.
//!
//! ## Key Layout
//!
//! A tree key is `stem (31 bytes) || sub-index (1 byte)`. The stem is a
//! domain-separated hash of the address and the *tree index* of the item;
//! the sub-index selects one of 256 leaf slots inside a stem node.
//!
//! Account data is co-located to minimise distinct stems: the *header stem*
//! (tree index zero) of an address holds
//!
//! | Sub-index | Content |
//! |-----------|---------|
//! | 0 | basic data (version, code size, nonce, balance) |
//! | 1 | code hash |
//! | 2-63 | reserved |
//! | 64-127 | storage slots 0-63 |
//! | 128-255 | code chunks 0-127 |
//!
//! Storage slots at or above 64 are displaced by a `2^248` main-storage
//! offset into overflow stems; code chunks at or above 128 continue into
//! overflow stems grouped 256 per stem.
//!
//! ## Domain Separation
//!
//! Stems are derived with BLAKE3 over the zero-padded address and the tree
//! index, keeping the UBT key space disjoint from the keccak-derived MPT
//! key space.

use shared_types::Address;

/// First 31 bytes of a tree key. Groups up to 256 leaves.
pub type Stem = [u8; 31];

/// Full 32-byte trie key: `stem || sub-index`.
pub type TreeKey = [u8; 32];

/// Position of an item in the abstract 2^256-entry tree, before stem
/// hashing: high 31 bytes select the stem, the low byte the leaf slot.
pub type TreeIndex = [u8; 32];

/// Sub-index of the basic-data leaf inside the header stem.
pub const BASIC_DATA_LEAF_KEY: u8 = 0;

/// Sub-index of the code-hash leaf inside the header stem.
pub const CODE_HASH_LEAF_KEY: u8 = 1;

/// First sub-index used for storage slots inside the header stem.
pub const HEADER_STORAGE_OFFSET: u8 = 64;

/// Number of storage slots co-located in the header stem.
pub const HEADER_STORAGE_SLOTS: u8 = 64;

/// First sub-index used for code chunks inside the header stem.
pub const CODE_OFFSET: u64 = 128;

/// Leaf slots per stem.
pub const STEM_SUBTREE_WIDTH: u64 = 256;

/// Tree-index offset of main storage: `2^248`, i.e. one followed by 31
/// zero bytes. Slots at or above [`HEADER_STORAGE_SLOTS`] land here.
pub const MAIN_STORAGE_OFFSET: TreeIndex = {
    let mut bytes = [0u8; 32];
    bytes[0] = 1;
    bytes
};

/// Derive the stem for `(address, tree_index)`.
///
/// `stem = blake3(pad32(address) || tree_index[..31])[..31]`. The low byte
/// of the tree index does not participate: all 256 leaves of a stem share
/// the same hash input.
pub fn stem(address: &Address, tree_index: &TreeIndex) -> Stem {
    let mut input = [0u8; 63];
    input[12..32].copy_from_slice(address);
    input[32..63].copy_from_slice(&tree_index[..31]);

    let digest = blake3::hash(&input);
    let mut stem = [0u8; 31];
    stem.copy_from_slice(&digest.as_bytes()[..31]);
    stem
}

/// Compose a full tree key from a stem and a sub-index.
pub fn tree_key_from_stem(stem: &Stem, sub_index: u8) -> TreeKey {
    let mut key = [0u8; 32];
    key[..31].copy_from_slice(stem);
    key[31] = sub_index;
    key
}

/// The header stem of an address: tree index zero.
pub fn header_stem(address: &Address) -> Stem {
    stem(address, &[0u8; 32])
}

/// Key of the basic-data leaf for `address`.
pub fn basic_data_key(address: &Address) -> TreeKey {
    tree_key_from_stem(&header_stem(address), BASIC_DATA_LEAF_KEY)
}

/// Key of the code-hash leaf for `address`.
pub fn code_hash_key(address: &Address) -> TreeKey {
    tree_key_from_stem(&header_stem(address), CODE_HASH_LEAF_KEY)
}

/// Key of the leaf holding storage slot `slot` of `address`.
///
/// Slots below [`HEADER_STORAGE_SLOTS`] share the account's header stem;
/// larger slots are offset into main storage.
pub fn storage_slot_key(address: &Address, slot: &[u8; 32]) -> TreeKey {
    let tree_index = storage_tree_index(slot);
    tree_key_from_stem(&stem(address, &tree_index), tree_index[31])
}

/// Key of the leaf holding code chunk `chunk_id` of `address`.
pub fn code_chunk_key(address: &Address, chunk_id: u32) -> TreeKey {
    let tree_index = code_chunk_tree_index(chunk_id);
    tree_key_from_stem(&stem(address, &tree_index), tree_index[31])
}

/// Tree index of a storage slot.
pub fn storage_tree_index(slot: &[u8; 32]) -> TreeIndex {
    let in_header = slot[..31].iter().all(|&b| b == 0) && slot[31] < HEADER_STORAGE_SLOTS;
    if in_header {
        let mut index = [0u8; 32];
        index[31] = HEADER_STORAGE_OFFSET + slot[31];
        index
    } else {
        add_tree_indices(slot, &MAIN_STORAGE_OFFSET)
    }
}

/// Tree index of a code chunk.
pub fn code_chunk_tree_index(chunk_id: u32) -> TreeIndex {
    let position = CODE_OFFSET + chunk_id as u64;
    let mut index = [0u8; 32];
    index[23..31].copy_from_slice(&(position / STEM_SUBTREE_WIDTH).to_be_bytes());
    index[31] = (position % STEM_SUBTREE_WIDTH) as u8;
    index
}

/// 256-bit big-endian addition of two tree indices. The main-storage
/// offset plus any 32-byte slot cannot carry past 256 bits.
fn add_tree_indices(a: &[u8; 32], b: &[u8; 32]) -> TreeIndex {
    let mut result = [0u8; 32];
    let mut carry = 0u16;
    for i in (0..32).rev() {
        let sum = a[i] as u16 + b[i] as u16 + carry;
        result[i] = sum as u8;
        carry = sum >> 8;
    }
    result
}
