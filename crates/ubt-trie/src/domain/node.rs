//! # Binary Trie Nodes
//!
//! The four node variants of the unified binary trie, their serialized
//! form, and their hashing rules.
//!
//! ## Node Types
//!
//! - **Empty**: the absent subtree; hash is the all-zero hash
//! - **Internal**: interior branch on the next key bit
//! - **Stem**: 31-byte stem plus up to 256 optional 32-byte leaf values
//! - **Hashed**: lazy placeholder for a subtree that is not loaded
//!
//! ## Serialized Form
//!
//! A single-byte discriminant followed by the variant payload. `Empty`
//! serializes to the empty byte string; internal nodes store only their
//! children's hashes (children live at their own paths in the store).
//!
//! ## Hashing
//!
//! Hash inputs are domain-separated by the discriminant byte, so an
//! internal node can never masquerade as a stem:
//!
//! - `Empty` -> zero hash
//! - `Internal` -> blake3(0x01 || left hash || right hash)
//! - `Stem` -> blake3(0x02 || stem || presence bitmap || values)
//! - `Hashed(h)` -> h
//!
//! Hashing is pure and independent of traversal order; sibling subtrees
//! are hashed in parallel.

use super::errors::TrieError;
use super::keys::Stem;
use shared_types::{Hash, ZERO_HASH};

/// Discriminant byte of serialized internal nodes.
pub const INTERNAL_NODE_TAG: u8 = 0x01;

/// Discriminant byte of serialized stem nodes.
pub const STEM_NODE_TAG: u8 = 0x02;

/// Discriminant byte of serialized hashed placeholders.
pub const HASHED_NODE_TAG: u8 = 0x03;

/// Leaf slots per stem node.
pub const STEM_WIDTH: usize = 256;

/// A leaf value: one 32-byte word.
pub type LeafValue = [u8; 32];

/// A node of the unified binary trie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BinaryNode {
    /// The absent subtree.
    Empty,

    /// Interior branch: `left` covers the 0 bit, `right` the 1 bit.
    Internal {
        left: Box<BinaryNode>,
        right: Box<BinaryNode>,
    },

    /// Terminal group of up to 256 leaves sharing a 31-byte stem.
    Stem {
        stem: Stem,
        values: Box<[Option<LeafValue>; STEM_WIDTH]>,
    },

    /// A subtree that is not loaded; owns only its hash.
    Hashed(Hash),
}

impl BinaryNode {
    /// A stem node holding a single value.
    pub fn single_stem(stem: Stem, sub_index: u8, value: LeafValue) -> Self {
        let mut values = Box::new([None; STEM_WIDTH]);
        values[sub_index as usize] = Some(value);
        BinaryNode::Stem { stem, values }
    }

    /// Whether this node is the empty subtree.
    pub fn is_empty(&self) -> bool {
        matches!(self, BinaryNode::Empty)
    }

    /// Compute this node's hash.
    ///
    /// Loaded sibling subtrees of an internal node hash in parallel;
    /// hashed placeholders return their stored hash without resolution.
    pub fn hash(&self) -> Hash {
        match self {
            BinaryNode::Empty => ZERO_HASH,
            BinaryNode::Hashed(hash) => *hash,
            BinaryNode::Internal { left, right } => {
                let (left_hash, right_hash) = rayon::join(|| left.hash(), || right.hash());
                hash_internal(&left_hash, &right_hash)
            }
            BinaryNode::Stem { stem, values } => hash_stem(stem, values),
        }
    }

    /// Serialize this node for the node store.
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            BinaryNode::Empty => Vec::new(),
            BinaryNode::Internal { left, right } => {
                serialize_internal(&left.hash(), &right.hash())
            }
            BinaryNode::Stem { stem, values } => serialize_stem(stem, values),
            BinaryNode::Hashed(hash) => {
                let mut bytes = Vec::with_capacity(33);
                bytes.push(HASHED_NODE_TAG);
                bytes.extend_from_slice(hash);
                bytes
            }
        }
    }

    /// Deserialize a node. Zero-length input is the empty node.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, TrieError> {
        let Some((&tag, payload)) = bytes.split_first() else {
            return Ok(BinaryNode::Empty);
        };

        match tag {
            INTERNAL_NODE_TAG => {
                if payload.len() != 64 {
                    return Err(decode_error(format!(
                        "internal node payload of {} bytes",
                        payload.len()
                    )));
                }
                let left: Hash = payload[..32].try_into().expect("fixed slice");
                let right: Hash = payload[32..].try_into().expect("fixed slice");
                Ok(BinaryNode::Internal {
                    left: Box::new(child_from_hash(left)),
                    right: Box::new(child_from_hash(right)),
                })
            }
            STEM_NODE_TAG => deserialize_stem(payload),
            HASHED_NODE_TAG => {
                if payload.len() != 32 {
                    return Err(decode_error(format!(
                        "hashed node payload of {} bytes",
                        payload.len()
                    )));
                }
                Ok(BinaryNode::Hashed(payload.try_into().expect("fixed slice")))
            }
            other => Err(decode_error(format!("unknown node tag {other:#04x}"))),
        }
    }
}

/// Hash of an internal node from its children's hashes.
pub fn hash_internal(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[INTERNAL_NODE_TAG]);
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}

/// Hash of a stem node over `(stem, bitmap, values)`.
pub fn hash_stem(stem: &Stem, values: &[Option<LeafValue>; STEM_WIDTH]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[STEM_NODE_TAG]);
    hasher.update(stem);
    hasher.update(&presence_bitmap(values));
    for value in values.iter().flatten() {
        hasher.update(value);
    }
    *hasher.finalize().as_bytes()
}

/// Serialize an internal node from its children's hashes. An empty child
/// is stored as the zero hash.
pub fn serialize_internal(left: &Hash, right: &Hash) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(65);
    bytes.push(INTERNAL_NODE_TAG);
    bytes.extend_from_slice(left);
    bytes.extend_from_slice(right);
    bytes
}

fn serialize_stem(stem: &Stem, values: &[Option<LeafValue>; STEM_WIDTH]) -> Vec<u8> {
    let present = values.iter().flatten().count();
    let mut bytes = Vec::with_capacity(1 + 31 + 32 + present * 32);
    bytes.push(STEM_NODE_TAG);
    bytes.extend_from_slice(stem);
    bytes.extend_from_slice(&presence_bitmap(values));
    for value in values.iter().flatten() {
        bytes.extend_from_slice(value);
    }
    bytes
}

fn deserialize_stem(payload: &[u8]) -> Result<BinaryNode, TrieError> {
    if payload.len() < 63 {
        return Err(decode_error(format!(
            "stem node payload of {} bytes",
            payload.len()
        )));
    }

    let stem: Stem = payload[..31].try_into().expect("fixed slice");
    let bitmap = &payload[31..63];
    let mut rest = &payload[63..];

    let mut values = Box::new([None; STEM_WIDTH]);
    for index in 0..STEM_WIDTH {
        if bitmap[index / 8] & (0x80 >> (index % 8)) != 0 {
            if rest.len() < 32 {
                return Err(decode_error("stem node values truncated".into()));
            }
            values[index] = Some(rest[..32].try_into().expect("fixed slice"));
            rest = &rest[32..];
        }
    }
    if !rest.is_empty() {
        return Err(decode_error("trailing bytes after stem values".into()));
    }

    Ok(BinaryNode::Stem { stem, values })
}

/// Bitmap of present leaf slots, one bit per sub-index, MSB first.
fn presence_bitmap(values: &[Option<LeafValue>; STEM_WIDTH]) -> [u8; 32] {
    let mut bitmap = [0u8; 32];
    for (index, value) in values.iter().enumerate() {
        if value.is_some() {
            bitmap[index / 8] |= 0x80 >> (index % 8);
        }
    }
    bitmap
}

fn child_from_hash(hash: Hash) -> BinaryNode {
    if hash == ZERO_HASH {
        BinaryNode::Empty
    } else {
        BinaryNode::Hashed(hash)
    }
}

fn decode_error(reason: String) -> TrieError {
    TrieError::Decode { reason }
}
