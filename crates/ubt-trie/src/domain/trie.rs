//! # Persistent Binary Trie
//!
//! A path-keyed binary radix trie over the node store, with account,
//! storage and code operations layered on the raw leaf interface.
//!
//! ## Structure
//!
//! Interior nodes branch on successive bits of the 31-byte stem; a stem
//! node holding up to 256 leaves terminates each occupied path. The
//! structure is canonical for the set of live stems: every stem sits at
//! the shallowest depth that distinguishes it from all other live stems.
//! Insertion splits at the first differing bit; deletion collapses empty
//! stems and pulls a lone surviving stem back up, so inserting a value and
//! deleting it again restores the previous root exactly.
//!
//! ## Persistence
//!
//! Unloaded subtrees are `Hashed` placeholders resolved on demand through
//! a [`NodeReader`]. Mutations track the set of dirtied and vacated paths;
//! [`BinaryTrie::commit`] materializes exactly those nodes and returns the
//! new root together with the full mutation set for the node database.
//!
//! ## Invariants
//!
//! - Deterministic root: the same set of leaves yields the same root
//!   regardless of write order
//! - Empty stem nodes never persist; commit collapses them
//! - The root is the zero hash iff the trie holds no live entries
//! - Commit on an untouched trie returns the existing root and an empty
//!   mutation set

use super::encoding::{
    code_chunk_count, pack_basic_data, pack_code_chunk, unpack_account, UbtAccount,
};
use super::errors::TrieError;
use super::keys::{
    basic_data_key, code_chunk_key, code_hash_key, storage_slot_key, Stem, TreeKey,
};
use super::node::{hash_internal, hash_stem, serialize_internal, BinaryNode, LeafValue};
use shared_types::{Address, Hash, StorageValue, ZERO_HASH};
use std::collections::{BTreeMap, BTreeSet};

/// Bit length of a stem, and therefore the maximum interior depth.
pub const MAX_DEPTH: usize = 248;

/// Mutation set produced by a commit: path key to serialized node, or
/// `None` for a vacated path.
pub type NodeSet = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

/// Flat leaf changes produced by a commit: tree key to value, or `None`
/// for a deleted leaf.
pub type StateSet = BTreeMap<TreeKey, Option<LeafValue>>;

/// Result of [`BinaryTrie::commit`].
#[derive(Clone, Debug, Default)]
pub struct TrieCommit {
    /// The new root hash.
    pub root: Hash,
    /// Serialized nodes by path, plus deletions of vacated paths.
    pub nodes: NodeSet,
    /// Leaf-level changes since the previous commit.
    pub leaves: StateSet,
}

/// Resolves path-keyed nodes out of the node store.
pub trait NodeReader {
    /// Fetch the serialized node stored at `path_key`, if any.
    fn node(&self, path_key: &[u8]) -> Result<Option<Vec<u8>>, TrieError>;
}

/// A reader over nothing; backs fresh in-memory tries.
#[derive(Default)]
pub struct EmptyNodeReader;

impl NodeReader for EmptyNodeReader {
    fn node(&self, _path_key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        Ok(None)
    }
}

// =============================================================================
// BIT PATHS
// =============================================================================

/// Position of a node: the bit string from the root to it, at most
/// [`MAX_DEPTH`] bits. Bits beyond the length are kept zero so the encoded
/// key is canonical.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitPath {
    len: u16,
    bytes: [u8; 31],
}

impl BitPath {
    /// The distinguished nil path of the root node.
    pub fn root() -> Self {
        Self {
            len: 0,
            bytes: [0u8; 31],
        }
    }

    /// Path of the first `len` bits of `stem`.
    pub fn from_stem_prefix(stem: &Stem, len: usize) -> Self {
        debug_assert!(len <= MAX_DEPTH);
        let mut bytes = [0u8; 31];
        let full = len / 8;
        bytes[..full].copy_from_slice(&stem[..full]);
        if len % 8 != 0 {
            bytes[full] = stem[full] & (0xff << (8 - len % 8));
        }
        Self {
            len: len as u16,
            bytes,
        }
    }

    /// Number of bits in the path.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The child path extended by `bit`.
    pub fn child(&self, bit: u8) -> Self {
        debug_assert!(self.len() < MAX_DEPTH);
        let mut next = *self;
        if bit != 0 {
            next.bytes[self.len() / 8] |= 0x80 >> (self.len() % 8);
        }
        next.len += 1;
        next
    }

    /// Encode as a store key: length byte followed by the packed bits.
    pub fn to_key(&self) -> Vec<u8> {
        let byte_len = (self.len() + 7) / 8;
        let mut key = Vec::with_capacity(1 + byte_len);
        key.push(self.len as u8);
        key.extend_from_slice(&self.bytes[..byte_len]);
        key
    }
}

/// Bit `index` of a stem, most significant bit first.
fn stem_bit(stem: &Stem, index: usize) -> u8 {
    (stem[index / 8] >> (7 - index % 8)) & 1
}

/// First bit position at which two stems differ. Stems are unique, so a
/// difference always exists.
fn first_diff_bit(a: &Stem, b: &Stem) -> usize {
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        if x != y {
            return i * 8 + (x ^ y).leading_zeros() as usize;
        }
    }
    debug_assert!(false, "identical stems have no differing bit");
    MAX_DEPTH
}

// =============================================================================
// DIRTY TRACKING
// =============================================================================

/// Paths touched since the last commit: writes and vacated positions.
#[derive(Default)]
struct DirtyTracker {
    written: BTreeSet<Vec<u8>>,
    vacated: BTreeSet<Vec<u8>>,
}

impl DirtyTracker {
    fn mark_written(&mut self, path: &BitPath) {
        let key = path.to_key();
        self.vacated.remove(&key);
        self.written.insert(key);
    }

    fn mark_vacated(&mut self, path: &BitPath) {
        let key = path.to_key();
        self.written.remove(&key);
        self.vacated.insert(key);
    }

    fn is_clean(&self) -> bool {
        self.written.is_empty() && self.vacated.is_empty()
    }

    fn clear(&mut self) {
        self.written.clear();
        self.vacated.clear();
    }
}

// =============================================================================
// THE TRIE
// =============================================================================

/// Persistent unified binary trie over a node reader.
pub struct BinaryTrie<R: NodeReader> {
    root_node: BinaryNode,
    root_hash: Hash,
    reader: R,
    dirty: DirtyTracker,
    leaves: StateSet,
}

impl<R: NodeReader> BinaryTrie<R> {
    /// Open the trie at `root`. A zero root is the empty trie; any other
    /// root resolves lazily on first access.
    pub fn open(root: Hash, reader: R) -> Self {
        let root_node = if root == ZERO_HASH {
            BinaryNode::Empty
        } else {
            BinaryNode::Hashed(root)
        };
        Self {
            root_node,
            root_hash: root,
            reader,
            dirty: DirtyTracker::default(),
            leaves: StateSet::new(),
        }
    }

    /// The root hash as of the last commit (or open).
    pub fn root(&self) -> Hash {
        self.root_hash
    }

    // =========================================================================
    // RAW LEAF OPERATIONS
    // =========================================================================

    /// Read the leaf at `key`.
    pub fn get(&mut self, key: &TreeKey) -> Result<Option<LeafValue>, TrieError> {
        let stem: Stem = key[..31].try_into().expect("fixed slice");
        Self::get_at(&mut self.root_node, &self.reader, BitPath::root(), &stem, key[31])
    }

    /// Write the leaf at `key`.
    pub fn insert(&mut self, key: &TreeKey, value: LeafValue) -> Result<(), TrieError> {
        let stem: Stem = key[..31].try_into().expect("fixed slice");
        let changed = Self::insert_at(
            &mut self.root_node,
            &self.reader,
            BitPath::root(),
            &stem,
            key[31],
            value,
            &mut self.dirty,
        )?;
        if changed {
            self.leaves.insert(*key, Some(value));
        }
        Ok(())
    }

    /// Delete the leaf at `key`. Absent keys are a no-op.
    pub fn delete(&mut self, key: &TreeKey) -> Result<(), TrieError> {
        let stem: Stem = key[..31].try_into().expect("fixed slice");
        let changed = Self::delete_at(
            &mut self.root_node,
            &self.reader,
            BitPath::root(),
            &stem,
            key[31],
            &mut self.dirty,
        )?;
        if changed {
            self.leaves.insert(*key, None);
        }
        Ok(())
    }

    // =========================================================================
    // ACCOUNT OPERATIONS
    // =========================================================================

    /// Read the account record of `address`.
    pub fn get_account(&mut self, address: &Address) -> Result<Option<UbtAccount>, TrieError> {
        let Some(basic) = self.get(&basic_data_key(address))? else {
            return Ok(None);
        };
        let code_hash = self.get(&code_hash_key(address))?;
        unpack_account(&basic, code_hash).map(Some)
    }

    /// Write the basic-data and code-hash leaves of `address`.
    pub fn update_account(&mut self, address: &Address, account: &UbtAccount) -> Result<(), TrieError> {
        let basic = pack_basic_data(account)?;
        self.insert(&basic_data_key(address), basic)?;
        self.insert(&code_hash_key(address), account.code_hash)
    }

    /// Clear the basic-data and code-hash leaves of `address`.
    pub fn mark_account_deleted(&mut self, address: &Address) -> Result<(), TrieError> {
        self.delete(&basic_data_key(address))?;
        self.delete(&code_hash_key(address))
    }

    // =========================================================================
    // STORAGE OPERATIONS
    // =========================================================================

    /// Read storage slot `slot` of `address`.
    pub fn get_storage(
        &mut self,
        address: &Address,
        slot: &[u8; 32],
    ) -> Result<Option<StorageValue>, TrieError> {
        self.get(&storage_slot_key(address, slot))
    }

    /// Write storage slot `slot`. The all-zero value is a delete.
    pub fn update_storage(
        &mut self,
        address: &Address,
        slot: &[u8; 32],
        value: StorageValue,
    ) -> Result<(), TrieError> {
        if value == [0u8; 32] {
            self.delete_storage(address, slot)
        } else {
            self.insert(&storage_slot_key(address, slot), value)
        }
    }

    /// Delete storage slot `slot`.
    pub fn delete_storage(&mut self, address: &Address, slot: &[u8; 32]) -> Result<(), TrieError> {
        self.delete(&storage_slot_key(address, slot))
    }

    // =========================================================================
    // CODE OPERATIONS
    // =========================================================================

    /// Write the code-hash leaf and the chunk leaves covering `code`.
    pub fn update_contract_code(
        &mut self,
        address: &Address,
        code_hash: Hash,
        code: &[u8],
    ) -> Result<(), TrieError> {
        self.insert(&code_hash_key(address), code_hash)?;
        for chunk_id in 0..code_chunk_count(code.len()) {
            if let Some(value) = pack_code_chunk(code, chunk_id) {
                self.insert(&code_chunk_key(address, chunk_id), value)?;
            }
        }
        Ok(())
    }

    /// Remove the chunk leaves covering `prior_size` bytes of code.
    pub fn delete_contract_code(
        &mut self,
        address: &Address,
        prior_size: u32,
    ) -> Result<(), TrieError> {
        for chunk_id in 0..code_chunk_count(prior_size as usize) {
            self.delete(&code_chunk_key(address, chunk_id))?;
        }
        Ok(())
    }

    // =========================================================================
    // PROOFS
    // =========================================================================

    /// Collect the serialized nodes along the path from the root to the
    /// stem of `key` - the witness for one leaf. For absent keys the walk
    /// stops where the trie ends, producing an exclusion proof.
    pub fn prove(&mut self, key: &TreeKey) -> Result<Vec<Vec<u8>>, TrieError> {
        let stem: Stem = key[..31].try_into().expect("fixed slice");
        let mut proof = Vec::new();
        Self::prove_at(&mut self.root_node, &self.reader, BitPath::root(), &stem, &mut proof)?;
        Ok(proof)
    }

    fn prove_at(
        node: &mut BinaryNode,
        reader: &R,
        path: BitPath,
        stem: &Stem,
        out: &mut Vec<Vec<u8>>,
    ) -> Result<(), TrieError> {
        match node {
            BinaryNode::Empty => Ok(()),
            BinaryNode::Hashed(_) => {
                Self::resolve(node, reader, &path)?;
                Self::prove_at(node, reader, path, stem, out)
            }
            BinaryNode::Stem { .. } => {
                out.push(node.serialize());
                Ok(())
            }
            BinaryNode::Internal { left, right } => {
                out.push(serialize_internal(&left.hash(), &right.hash()));
                let bit = stem_bit(stem, path.len());
                let child = if bit == 0 { left } else { right };
                Self::prove_at(child, reader, path.child(bit), stem, out)
            }
        }
    }

    // =========================================================================
    // COMMIT
    // =========================================================================

    /// Materialize all dirtied nodes, returning the new root and the full
    /// mutation set. An untouched trie returns the existing root with
    /// empty sets.
    pub fn commit(&mut self) -> Result<TrieCommit, TrieError> {
        if self.dirty.is_clean() {
            return Ok(TrieCommit {
                root: self.root_hash,
                nodes: NodeSet::new(),
                leaves: StateSet::new(),
            });
        }

        let mut nodes = NodeSet::new();
        let root = Self::commit_node(&self.root_node, BitPath::root(), &self.dirty.written, &mut nodes);
        for path in std::mem::take(&mut self.dirty.vacated) {
            nodes.insert(path, None);
        }
        self.dirty.clear();
        self.root_hash = root;

        tracing::debug!(
            root = %shared_types::short_hash(&root),
            nodes = nodes.len(),
            "trie commit"
        );

        Ok(TrieCommit {
            root,
            nodes,
            leaves: std::mem::take(&mut self.leaves),
        })
    }

    fn commit_node(
        node: &BinaryNode,
        path: BitPath,
        written: &BTreeSet<Vec<u8>>,
        out: &mut NodeSet,
    ) -> Hash {
        match node {
            BinaryNode::Empty => ZERO_HASH,
            BinaryNode::Hashed(hash) => *hash,
            BinaryNode::Stem { stem, values } => {
                let hash = hash_stem(stem, values);
                let key = path.to_key();
                if written.contains(&key) {
                    out.insert(key, Some(node.serialize()));
                }
                hash
            }
            BinaryNode::Internal { left, right } => {
                let left_hash = Self::commit_node(left, path.child(0), written, out);
                let right_hash = Self::commit_node(right, path.child(1), written, out);
                let hash = hash_internal(&left_hash, &right_hash);
                let key = path.to_key();
                if written.contains(&key) {
                    out.insert(key, Some(serialize_internal(&left_hash, &right_hash)));
                }
                hash
            }
        }
    }

    // =========================================================================
    // WALKS
    // =========================================================================

    fn resolve(node: &mut BinaryNode, reader: &R, path: &BitPath) -> Result<(), TrieError> {
        let BinaryNode::Hashed(expected) = *node else {
            return Ok(());
        };
        let key = path.to_key();
        let bytes = reader.node(&key)?.ok_or_else(|| TrieError::NodeNotFound {
            path: hex::encode(&key),
        })?;
        let resolved = BinaryNode::deserialize(&bytes)?;
        if resolved.hash() != expected {
            return Err(TrieError::CorruptNode {
                path: hex::encode(&key),
            });
        }
        *node = resolved;
        Ok(())
    }

    fn get_at(
        node: &mut BinaryNode,
        reader: &R,
        path: BitPath,
        stem: &Stem,
        sub_index: u8,
    ) -> Result<Option<LeafValue>, TrieError> {
        match node {
            BinaryNode::Empty => Ok(None),
            BinaryNode::Hashed(_) => {
                Self::resolve(node, reader, &path)?;
                Self::get_at(node, reader, path, stem, sub_index)
            }
            BinaryNode::Stem { stem: existing, values } => Ok(if *existing == *stem {
                values[sub_index as usize]
            } else {
                None
            }),
            BinaryNode::Internal { left, right } => {
                let bit = stem_bit(stem, path.len());
                let child = if bit == 0 { left } else { right };
                Self::get_at(child, reader, path.child(bit), stem, sub_index)
            }
        }
    }

    fn insert_at(
        node: &mut BinaryNode,
        reader: &R,
        path: BitPath,
        stem: &Stem,
        sub_index: u8,
        value: LeafValue,
        dirty: &mut DirtyTracker,
    ) -> Result<bool, TrieError> {
        match node {
            BinaryNode::Empty => {
                *node = BinaryNode::single_stem(*stem, sub_index, value);
                dirty.mark_written(&path);
                Ok(true)
            }
            BinaryNode::Hashed(_) => {
                Self::resolve(node, reader, &path)?;
                Self::insert_at(node, reader, path, stem, sub_index, value, dirty)
            }
            BinaryNode::Stem { stem: existing, values } if *existing == *stem => {
                if values[sub_index as usize] == Some(value) {
                    return Ok(false);
                }
                values[sub_index as usize] = Some(value);
                dirty.mark_written(&path);
                Ok(true)
            }
            BinaryNode::Stem { stem: existing, .. } => {
                // Split: push the resident stem down to the first bit that
                // distinguishes it from the incoming one.
                let resident_stem = *existing;
                let resident = std::mem::replace(node, BinaryNode::Empty);
                let diff = first_diff_bit(&resident_stem, stem);
                debug_assert!(diff >= path.len());

                let incoming = BinaryNode::single_stem(*stem, sub_index, value);
                dirty.mark_written(&BitPath::from_stem_prefix(&resident_stem, diff + 1));
                dirty.mark_written(&BitPath::from_stem_prefix(stem, diff + 1));

                let mut subtree = if stem_bit(&resident_stem, diff) == 0 {
                    BinaryNode::Internal {
                        left: Box::new(resident),
                        right: Box::new(incoming),
                    }
                } else {
                    BinaryNode::Internal {
                        left: Box::new(incoming),
                        right: Box::new(resident),
                    }
                };

                for depth in (path.len()..diff).rev() {
                    dirty.mark_written(&BitPath::from_stem_prefix(stem, depth + 1));
                    subtree = if stem_bit(stem, depth) == 0 {
                        BinaryNode::Internal {
                            left: Box::new(subtree),
                            right: Box::new(BinaryNode::Empty),
                        }
                    } else {
                        BinaryNode::Internal {
                            left: Box::new(BinaryNode::Empty),
                            right: Box::new(subtree),
                        }
                    };
                }

                *node = subtree;
                dirty.mark_written(&path);
                Ok(true)
            }
            BinaryNode::Internal { left, right } => {
                let bit = stem_bit(stem, path.len());
                let child = if bit == 0 { left } else { right };
                let changed =
                    Self::insert_at(child, reader, path.child(bit), stem, sub_index, value, dirty)?;
                if changed {
                    dirty.mark_written(&path);
                }
                Ok(changed)
            }
        }
    }

    fn delete_at(
        node: &mut BinaryNode,
        reader: &R,
        path: BitPath,
        stem: &Stem,
        sub_index: u8,
        dirty: &mut DirtyTracker,
    ) -> Result<bool, TrieError> {
        match node {
            BinaryNode::Empty => Ok(false),
            BinaryNode::Hashed(_) => {
                Self::resolve(node, reader, &path)?;
                Self::delete_at(node, reader, path, stem, sub_index, dirty)
            }
            BinaryNode::Stem { stem: existing, values } => {
                if *existing != *stem || values[sub_index as usize].is_none() {
                    return Ok(false);
                }
                values[sub_index as usize] = None;
                if values.iter().all(Option::is_none) {
                    *node = BinaryNode::Empty;
                    dirty.mark_vacated(&path);
                } else {
                    dirty.mark_written(&path);
                }
                Ok(true)
            }
            BinaryNode::Internal { left, right } => {
                let bit = stem_bit(stem, path.len());
                let (child, sibling) = if bit == 0 { (left, right) } else { (right, left) };
                let changed =
                    Self::delete_at(child, reader, path.child(bit), stem, sub_index, dirty)?;
                if !changed {
                    return Ok(false);
                }

                if child.is_empty() {
                    if sibling.is_empty() {
                        *node = BinaryNode::Empty;
                        dirty.mark_vacated(&path);
                        return Ok(true);
                    }
                    // A lone surviving stem moves back up one level.
                    Self::resolve(sibling, reader, &path.child(1 - bit))?;
                    if matches!(**sibling, BinaryNode::Stem { .. }) {
                        let pulled = std::mem::replace(&mut **sibling, BinaryNode::Empty);
                        dirty.mark_vacated(&path.child(1 - bit));
                        *node = pulled;
                        dirty.mark_written(&path);
                        return Ok(true);
                    }
                } else if matches!(**child, BinaryNode::Stem { .. }) && sibling.is_empty() {
                    let pulled = std::mem::replace(&mut **child, BinaryNode::Empty);
                    dirty.mark_vacated(&path.child(bit));
                    *node = pulled;
                    dirty.mark_written(&path);
                    return Ok(true);
                }

                dirty.mark_written(&path);
                Ok(true)
            }
        }
    }
}

/// Verify a leaf witness produced by [`BinaryTrie::prove`] against a
/// root: recompute each node's hash, follow the key's bits downward, and
/// check the terminal stem (or the absent subtree) against `value`.
///
/// Verification needs only the proof and the root, never the store.
pub fn verify_leaf_proof(
    root: &Hash,
    key: &TreeKey,
    value: Option<&LeafValue>,
    proof: &[Vec<u8>],
) -> bool {
    let stem: Stem = match key[..31].try_into() {
        Ok(stem) => stem,
        Err(_) => return false,
    };

    let mut expected = *root;
    let mut depth = 0usize;
    for (index, bytes) in proof.iter().enumerate() {
        if expected == ZERO_HASH {
            // Nothing may follow an absent subtree.
            return false;
        }
        let Ok(node) = BinaryNode::deserialize(bytes) else {
            return false;
        };
        if node.hash() != expected {
            return false;
        }
        match node {
            BinaryNode::Internal { left, right } => {
                expected = if stem_bit(&stem, depth) == 0 {
                    left.hash()
                } else {
                    right.hash()
                };
                depth += 1;
            }
            BinaryNode::Stem { stem: resident, values } => {
                if index + 1 != proof.len() {
                    return false;
                }
                return if resident == stem {
                    values[key[31] as usize].as_ref() == value
                } else {
                    // A diverging stem proves the key absent.
                    value.is_none()
                };
            }
            BinaryNode::Empty | BinaryNode::Hashed(_) => return false,
        }
    }
    expected == ZERO_HASH && value.is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use primitive_types::U256;
    use shared_types::EMPTY_CODE_HASH;

    fn trie() -> BinaryTrie<EmptyNodeReader> {
        BinaryTrie::open(ZERO_HASH, EmptyNodeReader)
    }

    fn key(stem_byte: u8, sub_index: u8) -> TreeKey {
        let mut key = [stem_byte; 32];
        key[31] = sub_index;
        key
    }

    #[test]
    fn test_empty_trie_root_is_zero() {
        let mut t = trie();
        let commit = t.commit().unwrap();
        assert_eq!(commit.root, ZERO_HASH);
        assert!(commit.nodes.is_empty());
    }

    #[test]
    fn test_insert_get_round_trip() {
        let mut t = trie();
        let k = key(0xab, 7);
        t.insert(&k, [0x11; 32]).unwrap();
        assert_eq!(t.get(&k).unwrap(), Some([0x11; 32]));
        assert_eq!(t.get(&key(0xab, 8)).unwrap(), None);
        assert_eq!(t.get(&key(0xac, 7)).unwrap(), None);
    }

    #[test]
    fn test_same_stem_shares_one_node() {
        let mut t = trie();
        t.insert(&key(0xab, 0), [0x01; 32]).unwrap();
        t.insert(&key(0xab, 255), [0x02; 32]).unwrap();
        let commit = t.commit().unwrap();
        // One stem at the root path, nothing else.
        assert_eq!(commit.nodes.len(), 1);
        assert!(commit.nodes.contains_key(&BitPath::root().to_key()));
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let keys: Vec<TreeKey> = (0u8..8).map(|i| key(i * 31 + 1, i)).collect();

        let mut forward = trie();
        for k in &keys {
            forward.insert(k, [0x42; 32]).unwrap();
        }
        let mut backward = trie();
        for k in keys.iter().rev() {
            backward.insert(k, [0x42; 32]).unwrap();
        }

        assert_eq!(forward.commit().unwrap().root, backward.commit().unwrap().root);
    }

    #[test]
    fn test_commit_is_idempotent_when_unchanged() {
        let mut t = trie();
        t.insert(&key(0x10, 1), [0x01; 32]).unwrap();
        let first = t.commit().unwrap();
        assert!(!first.nodes.is_empty());

        let second = t.commit().unwrap();
        assert_eq!(second.root, first.root);
        assert!(second.nodes.is_empty());
        assert!(second.leaves.is_empty());

        // Overwriting with the identical value is also a no-op.
        t.insert(&key(0x10, 1), [0x01; 32]).unwrap();
        let third = t.commit().unwrap();
        assert_eq!(third.root, first.root);
        assert!(third.nodes.is_empty());
    }

    #[test]
    fn test_insert_then_delete_restores_root() {
        let mut t = trie();
        t.insert(&key(0x11, 0), [0x01; 32]).unwrap();
        t.insert(&key(0x77, 0), [0x02; 32]).unwrap();
        let before = t.commit().unwrap().root;

        t.insert(&key(0xee, 5), [0x03; 32]).unwrap();
        assert_ne!(t.commit().unwrap().root, before);

        t.delete(&key(0xee, 5)).unwrap();
        assert_eq!(t.commit().unwrap().root, before);
    }

    #[test]
    fn test_delete_last_leaf_empties_trie() {
        let mut t = trie();
        let k = key(0x99, 3);
        t.insert(&k, [0xff; 32]).unwrap();
        t.delete(&k).unwrap();
        let commit = t.commit().unwrap();
        assert_eq!(commit.root, ZERO_HASH);
        assert_eq!(t.get(&k).unwrap(), None);
    }

    #[test]
    fn test_stem_split_at_first_bit() {
        // Stems 0x00… and 0x80… differ at bit 0.
        let mut t = trie();
        let mut a = [0u8; 32];
        a[0] = 0x00;
        let mut b = [0u8; 32];
        b[0] = 0x80;
        t.insert(&a, [0x01; 32]).unwrap();
        t.insert(&b, [0x02; 32]).unwrap();

        assert_eq!(t.get(&a).unwrap(), Some([0x01; 32]));
        assert_eq!(t.get(&b).unwrap(), Some([0x02; 32]));

        let commit = t.commit().unwrap();
        // Root internal plus two stems at depth 1.
        assert_eq!(commit.nodes.len(), 3);
    }

    #[test]
    fn test_stem_split_at_second_bit() {
        let mut t = trie();
        let mut a = [0u8; 32];
        a[0] = 0x00; // bits 00…
        let mut b = [0u8; 32];
        b[0] = 0x40; // bits 01…
        t.insert(&a, [0x01; 32]).unwrap();
        t.insert(&b, [0x02; 32]).unwrap();

        let commit = t.commit().unwrap();
        // Chain: internal at root, internal at depth 1, stems at depth 2.
        assert_eq!(commit.nodes.len(), 4);
        assert_eq!(t.get(&a).unwrap(), Some([0x01; 32]));
        assert_eq!(t.get(&b).unwrap(), Some([0x02; 32]));
    }

    #[test]
    fn test_stem_split_at_last_bit() {
        // Stems differing only at bit 247: maximum depth split.
        let mut t = trie();
        let a = [0u8; 32];
        let mut b = [0u8; 32];
        b[30] = 0x01; // last stem bit
        t.insert(&a, [0x01; 32]).unwrap();
        t.insert(&b, [0x02; 32]).unwrap();

        assert_eq!(t.get(&a).unwrap(), Some([0x01; 32]));
        assert_eq!(t.get(&b).unwrap(), Some([0x02; 32]));

        let commit = t.commit().unwrap();
        // 248 internals plus two stems.
        assert_eq!(commit.nodes.len(), 250);
    }

    #[test]
    fn test_max_depth_key_round_trip() {
        // All-ones key: stem of 248 one bits, sub-index 0xff.
        let mut t = trie();
        let k = [0xff; 32];
        t.insert(&k, [0xaa; 32]).unwrap();
        t.insert(&key(0x00, 0), [0xbb; 32]).unwrap();
        assert_eq!(t.get(&k).unwrap(), Some([0xaa; 32]));
        let root = t.commit().unwrap().root;
        assert_ne!(root, ZERO_HASH);
    }

    #[test]
    fn test_stem_collapse_pulls_sibling_up() {
        let mut t = trie();
        let mut a = [0u8; 32];
        a[0] = 0x00;
        let mut b = [0u8; 32];
        b[0] = 0x80;
        t.insert(&a, [0x01; 32]).unwrap();
        let lone_root = t.commit().unwrap().root;

        t.insert(&b, [0x02; 32]).unwrap();
        t.commit().unwrap();

        t.delete(&b).unwrap();
        let commit = t.commit().unwrap();
        assert_eq!(commit.root, lone_root);
        // The vacated depth-1 paths are cleared from the store.
        let vacated = commit.nodes.values().filter(|v| v.is_none()).count();
        assert!(vacated >= 1, "expected vacated paths, got {:?}", commit.nodes);
    }

    #[test]
    fn test_deep_collapse_cascades() {
        // Stems sharing 15 leading bits: deleting one must pull the other
        // all the way back to the root.
        let mut t = trie();
        let mut a = [0u8; 32];
        a[0] = 0xaa;
        a[1] = 0xaa; // bits 1010…
        let mut b = a;
        b[1] = 0xab; // differs at bit 15
        t.insert(&a, [0x01; 32]).unwrap();
        let lone_root = t.commit().unwrap().root;

        t.insert(&b, [0x02; 32]).unwrap();
        t.delete(&b).unwrap();
        assert_eq!(t.commit().unwrap().root, lone_root);
    }

    #[test]
    fn test_persistence_through_reader() {
        // Commit into a map, reopen through it, and read back.
        #[derive(Default)]
        struct MapReader(std::collections::HashMap<Vec<u8>, Vec<u8>>);
        impl NodeReader for MapReader {
            fn node(&self, path_key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
                Ok(self.0.get(path_key).cloned())
            }
        }

        let mut t = trie();
        let keys: Vec<TreeKey> = (1u8..30).map(|i| key(i.wrapping_mul(37), i)).collect();
        for (i, k) in keys.iter().enumerate() {
            t.insert(k, [i as u8 + 1; 32]).unwrap();
        }
        let commit = t.commit().unwrap();

        let mut store = MapReader::default();
        for (path, node) in commit.nodes {
            if let Some(bytes) = node {
                store.0.insert(path, bytes);
            }
        }

        let mut reopened = BinaryTrie::open(commit.root, store);
        for (i, k) in keys.iter().enumerate() {
            assert_eq!(reopened.get(k).unwrap(), Some([i as u8 + 1; 32]));
        }
        // Unknown stems read as absent.
        assert_eq!(reopened.get(&key(0xfe, 0)).unwrap(), None);
    }

    #[test]
    fn test_missing_node_is_reported() {
        let mut t: BinaryTrie<EmptyNodeReader> = BinaryTrie::open([0x12; 32], EmptyNodeReader);
        let err = t.get(&key(0x01, 0)).unwrap_err();
        assert!(matches!(err, TrieError::NodeNotFound { .. }));
    }

    #[test]
    fn test_account_round_trip() {
        let mut t = trie();
        let address = [0xaa; 20];
        let account = UbtAccount::basic(U256::from(1000u64), 5);
        t.update_account(&address, &account).unwrap();

        let read = t.get_account(&address).unwrap().unwrap();
        assert_eq!(read.balance, U256::from(1000u64));
        assert_eq!(read.nonce, 5);
        assert_eq!(read.code_hash, EMPTY_CODE_HASH);
        assert_eq!(read.code_size, 0);

        assert_eq!(t.get_account(&[0xbb; 20]).unwrap(), None);
    }

    #[test]
    fn test_account_deletion_clears_header_leaves() {
        let mut t = trie();
        let address = [0xaa; 20];
        t.update_account(&address, &UbtAccount::basic(U256::one(), 1)).unwrap();
        t.commit().unwrap();

        t.mark_account_deleted(&address).unwrap();
        t.commit().unwrap();
        assert_eq!(t.get_account(&address).unwrap(), None);
    }

    #[test]
    fn test_storage_write_zero_is_delete() {
        let mut t = trie();
        let address = [0x42; 20];
        let slot = [0x01; 32];

        t.update_storage(&address, &slot, [0xff; 32]).unwrap();
        let with_value = t.commit().unwrap().root;

        t.update_storage(&address, &slot, [0x00; 32]).unwrap();
        let after_zero = t.commit().unwrap().root;

        assert_ne!(with_value, after_zero);
        assert_eq!(t.get_storage(&address, &slot).unwrap(), None);
    }

    #[test]
    fn test_contract_code_chunks() {
        let mut t = trie();
        let address = [0x42; 20];
        let code: Vec<u8> = (0..100u8).collect();
        let code_hash = crate::domain::rlp::keccak256(&code);

        let account = UbtAccount::new(U256::zero(), 1, code_hash, code.len() as u32).unwrap();
        t.update_account(&address, &account).unwrap();
        t.update_contract_code(&address, code_hash, &code).unwrap();

        let read = t.get_account(&address).unwrap().unwrap();
        assert_eq!(read.code_hash, code_hash);
        assert_eq!(read.code_size, 100);

        // 100 bytes -> 4 chunks; the first chunk leaf holds the prefix.
        let chunk0 = t.get(&code_chunk_key(&address, 0)).unwrap().unwrap();
        assert_eq!(chunk0[1..32], (0..31u8).collect::<Vec<_>>()[..]);

        let with_code = t.commit().unwrap().root;
        t.delete_contract_code(&address, 100).unwrap();
        t.update_account(&address, &UbtAccount::new(U256::zero(), 1, EMPTY_CODE_HASH, 0).unwrap())
            .unwrap();
        assert_ne!(t.commit().unwrap().root, with_code);
        assert_eq!(t.get(&code_chunk_key(&address, 0)).unwrap(), None);
    }

    #[test]
    fn test_leaf_journal_tracks_changes() {
        let mut t = trie();
        let k1 = key(0x01, 0);
        let k2 = key(0x02, 0);
        t.insert(&k1, [0x01; 32]).unwrap();
        t.insert(&k2, [0x02; 32]).unwrap();
        t.delete(&k2).unwrap();

        let commit = t.commit().unwrap();
        assert_eq!(commit.leaves.get(&k1), Some(&Some([0x01; 32])));
        assert_eq!(commit.leaves.get(&k2), Some(&None));
    }

    #[test]
    fn test_proof_verifies_present_leaf() {
        let mut t = trie();
        let keys: Vec<TreeKey> = (1u8..10).map(|i| key(i * 27, i)).collect();
        for (i, k) in keys.iter().enumerate() {
            t.insert(k, [i as u8 + 1; 32]).unwrap();
        }
        let root = t.commit().unwrap().root;

        for (i, k) in keys.iter().enumerate() {
            let proof = t.prove(k).unwrap();
            assert!(verify_leaf_proof(&root, k, Some(&[i as u8 + 1; 32]), &proof));
            // The right proof with the wrong value must not verify.
            assert!(!verify_leaf_proof(&root, k, Some(&[0xde; 32]), &proof));
            assert!(!verify_leaf_proof(&root, k, None, &proof));
        }
    }

    #[test]
    fn test_proof_excludes_absent_leaf() {
        let mut t = trie();
        t.insert(&key(0x11, 0), [0x01; 32]).unwrap();
        t.insert(&key(0x77, 0), [0x02; 32]).unwrap();
        let root = t.commit().unwrap().root;

        // Absent sub-index inside a live stem.
        let absent_slot = key(0x11, 9);
        let proof = t.prove(&absent_slot).unwrap();
        assert!(verify_leaf_proof(&root, &absent_slot, None, &proof));

        // Absent stem entirely.
        let absent_stem = key(0x42, 0);
        let proof = t.prove(&absent_stem).unwrap();
        assert!(verify_leaf_proof(&root, &absent_stem, None, &proof));
        assert!(!verify_leaf_proof(&root, &absent_stem, Some(&[0x01; 32]), &proof));
    }

    #[test]
    fn test_tampered_proof_fails() {
        let mut t = trie();
        let k = key(0x33, 3);
        t.insert(&k, [0xcc; 32]).unwrap();
        t.insert(&key(0x55, 5), [0x55; 32]).unwrap();
        let root = t.commit().unwrap().root;

        let mut proof = t.prove(&k).unwrap();
        let last = proof.len() - 1;
        let bytes = proof[last].len() - 1;
        proof[last][bytes] ^= 0x01;
        assert!(!verify_leaf_proof(&root, &k, Some(&[0xcc; 32]), &proof));

        // Against a different root it fails as well.
        let proof = t.prove(&k).unwrap();
        assert!(!verify_leaf_proof(&[0x09; 32], &k, Some(&[0xcc; 32]), &proof));
    }

    #[test]
    fn test_empty_trie_exclusion_proof() {
        let mut t = trie();
        let proof = t.prove(&key(0x01, 0)).unwrap();
        assert!(proof.is_empty());
        assert!(verify_leaf_proof(&ZERO_HASH, &key(0x01, 0), None, &proof));
    }

    #[test]
    fn test_bit_path_keys_are_canonical() {
        let stem = [0xff; 31];
        let path = BitPath::from_stem_prefix(&stem, 3);
        assert_eq!(path.to_key(), vec![3, 0xe0]);

        let grown = BitPath::root().child(1).child(1).child(1);
        assert_eq!(grown.to_key(), path.to_key());
    }

    #[test]
    fn test_first_diff_bit() {
        let a = [0x00u8; 31];
        let mut b = [0x00u8; 31];
        b[0] = 0x80;
        assert_eq!(first_diff_bit(&a, &b), 0);

        let mut c = [0x00u8; 31];
        c[0] = 0x01;
        assert_eq!(first_diff_bit(&a, &c), 7);

        let mut d = [0x00u8; 31];
        d[30] = 0x01;
        assert_eq!(first_diff_bit(&a, &d), 247);
    }
}
