//! # Block Deltas
//!
//! The per-block mutation set the host chain hands over on every commit,
//! and its durable queued form.
//!
//! Account and storage maps arrive keyed by keccak hashes (the MPT's view
//! of the world); the origin maps carry the plain addresses and - when
//! `raw_storage_keys` is set - the raw slot keys needed to re-derive the
//! binary trie keys.

use serde::{Deserialize, Serialize};
use shared_types::{Address, BlockRef, Hash, StorageKey};
use std::collections::HashMap;
use ubt_trie::{encode_slim_account, keccak256, strip_storage_value, SlimAccount};

/// The state mutations of one executed block.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    /// Whether `storages_origin` is keyed by raw slot keys rather than
    /// their keccak hashes.
    pub raw_storage_keys: bool,
    /// Post-state accounts by address hash; `None` deletes the account.
    pub accounts: HashMap<Hash, Option<Vec<u8>>>,
    /// Prior account values by address.
    pub accounts_origin: HashMap<Address, Option<Vec<u8>>>,
    /// Post-state storage by address hash, then slot hash; empty or
    /// absent values delete the slot.
    pub storages: HashMap<Hash, HashMap<Hash, Option<Vec<u8>>>>,
    /// Prior storage values by address, keyed per `raw_storage_keys`.
    pub storages_origin: HashMap<Address, HashMap<StorageKey, Option<Vec<u8>>>>,
    /// Newly deployed code by address.
    pub codes: HashMap<Address, Vec<u8>>,
}

impl StateUpdate {
    /// Record an account write (`Some`) or deletion (`None`).
    pub fn set_account(&mut self, address: Address, account: Option<&SlimAccount>) {
        self.accounts
            .insert(keccak256(&address), account.map(encode_slim_account));
        self.accounts_origin.entry(address).or_insert(None);
    }

    /// Record a storage write (`Some`) or deletion (`None`) under the raw
    /// slot key. The origin map is keyed per `raw_storage_keys`.
    pub fn set_storage(&mut self, address: Address, raw_key: StorageKey, value: Option<&[u8; 32]>) {
        let encoded = value.map(strip_storage_value).filter(|v| !v.is_empty());
        self.storages
            .entry(keccak256(&address))
            .or_default()
            .insert(keccak256(&raw_key), encoded);

        let origin_key = if self.raw_storage_keys {
            raw_key
        } else {
            keccak256(&raw_key)
        };
        self.storages_origin
            .entry(address)
            .or_default()
            .entry(origin_key)
            .or_insert(None);
    }

    /// Record newly deployed code.
    pub fn set_code(&mut self, address: Address, code: Vec<u8>) {
        self.codes.insert(address, code);
    }

    /// Whether the update carries no mutations.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.storages.is_empty() && self.codes.is_empty()
    }
}

/// A [`StateUpdate`] bound to its block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockDelta {
    pub block_num: u64,
    pub block_hash: Hash,
    pub parent_hash: Hash,
    pub update: StateUpdate,
}

impl BlockDelta {
    pub fn new(block: BlockRef, parent_hash: Hash, update: StateUpdate) -> Self {
        Self {
            block_num: block.number,
            block_hash: block.hash,
            parent_hash,
            update,
        }
    }

    /// The block this delta belongs to.
    pub fn block_ref(&self) -> BlockRef {
        BlockRef::new(self.block_num, self.block_hash)
    }
}
