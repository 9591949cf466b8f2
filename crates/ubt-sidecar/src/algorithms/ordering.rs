//! # Deterministic Delta Sequencing
//!
//! Reorders a block delta into the canonical application sequence:
//! deletions before writes, addresses in ascending byte order, slot keys
//! ascending within each address. Two equivalent deltas - same logical
//! multiset of mutations, any host-map iteration order - therefore apply
//! to identical roots.

use crate::domain::delta::StateUpdate;
use crate::ports::outbound::PreimageSource;
use shared_types::{Address, Hash, SidecarError, StorageKey, StorageValue};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use ubt_trie::{decode_slim_account, extend_storage_value, keccak256, SlimAccount};

/// An account removal with the slots to clear first.
#[derive(Clone, Debug, PartialEq)]
pub struct AccountDeletion {
    pub address: Address,
    /// Raw slot keys, ascending.
    pub slots: Vec<StorageKey>,
}

/// An account write with its storage and code changes.
#[derive(Clone, Debug, PartialEq)]
pub struct AccountWrite {
    pub address: Address,
    /// The post-state account; `None` when only storage changed.
    pub account: Option<SlimAccount>,
    /// Newly deployed code, when the delta carries it.
    pub new_code: Option<Vec<u8>>,
    /// Raw slot key to new value, ascending; `None` deletes the slot.
    pub slots: Vec<(StorageKey, Option<StorageValue>)>,
}

/// The canonical application order of one delta.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeltaSequence {
    pub deletions: Vec<AccountDeletion>,
    pub writes: Vec<AccountWrite>,
}

/// Sequence `update` into its canonical order, resolving hashed keys back
/// to addresses and raw slot keys through the origin maps and the
/// preimage store.
pub fn sequence_update(
    update: &StateUpdate,
    preimages: &dyn PreimageSource,
) -> Result<DeltaSequence, SidecarError> {
    // Addresses the delta touches, with their hashes.
    let mut by_hash: HashMap<Hash, Address> = HashMap::new();
    let mut addresses: BTreeSet<Address> = BTreeSet::new();
    for address in update
        .accounts_origin
        .keys()
        .chain(update.storages_origin.keys())
        .chain(update.codes.keys())
    {
        by_hash.insert(keccak256(address), *address);
        addresses.insert(*address);
    }
    for hash in update.accounts.keys().chain(update.storages.keys()) {
        if !by_hash.contains_key(hash) {
            let address = resolve_address(hash, preimages)?;
            by_hash.insert(*hash, address);
            addresses.insert(address);
        }
    }

    let mut sequence = DeltaSequence::default();
    for address in addresses {
        let address_hash = keccak256(&address);
        match update.accounts.get(&address_hash) {
            Some(None) => {
                sequence.deletions.push(AccountDeletion {
                    address,
                    slots: prior_slots(update, &address, preimages)?,
                });
            }
            Some(Some(bytes)) => {
                let account = decode_slim_account(bytes).map_err(crate::domain::errors::from_trie)?;
                sequence.writes.push(AccountWrite {
                    address,
                    account: Some(account),
                    new_code: update.codes.get(&address).cloned(),
                    slots: new_slots(update, &address, &address_hash, preimages)?,
                });
            }
            None => {
                let slots = new_slots(update, &address, &address_hash, preimages)?;
                let new_code = update.codes.get(&address).cloned();
                if slots.is_empty() && new_code.is_none() {
                    continue;
                }
                sequence.writes.push(AccountWrite {
                    address,
                    account: None,
                    new_code,
                    slots,
                });
            }
        }
    }
    Ok(sequence)
}

/// Raw keys of the slots an account held before deletion, ascending.
fn prior_slots(
    update: &StateUpdate,
    address: &Address,
    preimages: &dyn PreimageSource,
) -> Result<Vec<StorageKey>, SidecarError> {
    let Some(origin) = update.storages_origin.get(address) else {
        return Ok(Vec::new());
    };
    let mut slots: BTreeSet<StorageKey> = BTreeSet::new();
    for key in origin.keys() {
        let raw = if update.raw_storage_keys {
            *key
        } else {
            resolve_slot_key(key, preimages)?
        };
        slots.insert(raw);
    }
    Ok(slots.into_iter().collect())
}

/// Raw key and decoded value of each changed slot, ascending by key.
fn new_slots(
    update: &StateUpdate,
    address: &Address,
    address_hash: &Hash,
    preimages: &dyn PreimageSource,
) -> Result<Vec<(StorageKey, Option<StorageValue>)>, SidecarError> {
    let Some(changes) = update.storages.get(address_hash) else {
        return Ok(Vec::new());
    };

    // With raw origin keys the reverse mapping is local to the delta.
    let mut raw_by_hash: HashMap<Hash, StorageKey> = HashMap::new();
    if update.raw_storage_keys {
        if let Some(origin) = update.storages_origin.get(address) {
            for raw in origin.keys() {
                raw_by_hash.insert(keccak256(raw), *raw);
            }
        }
    }

    let mut slots: BTreeMap<StorageKey, Option<StorageValue>> = BTreeMap::new();
    for (slot_hash, encoded) in changes {
        let raw = if update.raw_storage_keys {
            match raw_by_hash.get(slot_hash) {
                Some(raw) => *raw,
                None => resolve_slot_key(slot_hash, preimages)?,
            }
        } else {
            resolve_slot_key(slot_hash, preimages)?
        };

        let value = match encoded {
            Some(bytes) if !bytes.is_empty() => Some(
                extend_storage_value(bytes).map_err(crate::domain::errors::from_trie)?,
            ),
            _ => None,
        };
        slots.insert(raw, value);
    }
    Ok(slots.into_iter().collect())
}

fn resolve_address(hash: &Hash, preimages: &dyn PreimageSource) -> Result<Address, SidecarError> {
    let bytes = preimages.preimage(hash).ok_or_else(|| missing(hash))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| SidecarError::DecodeError(format!("address preimage of {} bytes", bytes.len())))
}

fn resolve_slot_key(hash: &Hash, preimages: &dyn PreimageSource) -> Result<StorageKey, SidecarError> {
    let bytes = preimages.preimage(hash).ok_or_else(|| missing(hash))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| SidecarError::DecodeError(format!("slot preimage of {} bytes", bytes.len())))
}

fn missing(hash: &Hash) -> SidecarError {
    SidecarError::PreimageMissing {
        hash: shared_types::full_hash(hash),
    }
}
