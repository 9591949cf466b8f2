//! # Mock Host Chain
//!
//! Controllable implementation of the outbound ports: account and storage
//! fixtures behind flat snapshot iterators, a preimage and code table, a
//! canonical-hash table, and injectable retryable iterator faults for
//! converter resilience tests.

use crate::ports::outbound::{
    AccountIterator, CanonicalChain, CodeSource, IteratorError, PreimageSource, SnapshotSource,
    StorageIterator,
};
use primitive_types::U256;
use shared_types::{
    Address, BlockRef, Hash, StorageKey, StorageValue, EMPTY_CODE_HASH, EMPTY_MPT_ROOT, ZERO_HASH,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::RwLock;
use ubt_trie::{encode_slim_account, keccak256, strip_storage_value, SlimAccount};

struct StoredAccount {
    slim: Vec<u8>,
    /// Slot hash to stripped value, in iteration order.
    storage: BTreeMap<Hash, Vec<u8>>,
}

struct ChainFixtures {
    state_root: Hash,
    accounts: BTreeMap<Hash, StoredAccount>,
    preimages: HashMap<Hash, Vec<u8>>,
    codes: HashMap<Hash, Vec<u8>>,
    canonical: HashMap<u64, Hash>,
    head: BlockRef,
    /// Pending account-iterator faults: each newly opened iterator takes
    /// the next threshold and fails retryably after serving that many.
    account_faults: VecDeque<u64>,
    storage_faults: VecDeque<u64>,
}

/// Scriptable host chain for tests.
pub struct MockChain {
    inner: RwLock<ChainFixtures>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(ChainFixtures {
                state_root: [0x5a; 32],
                accounts: BTreeMap::new(),
                preimages: HashMap::new(),
                codes: HashMap::new(),
                canonical: HashMap::new(),
                head: BlockRef::new(0, ZERO_HASH),
                account_faults: VecDeque::new(),
                storage_faults: VecDeque::new(),
            }),
        }
    }

    /// The fixture's MPT state root.
    pub fn state_root(&self) -> Hash {
        self.inner.read().map(|i| i.state_root).unwrap_or(ZERO_HASH)
    }

    /// Install an account with optional code and storage, recording every
    /// preimage the sidecar will need.
    pub fn add_account(
        &self,
        address: Address,
        balance: U256,
        nonce: u64,
        code: Option<Vec<u8>>,
        storage: &[(StorageKey, StorageValue)],
    ) {
        let Ok(mut inner) = self.inner.write() else {
            return;
        };

        let code_hash = match &code {
            Some(code) => keccak256(code),
            None => EMPTY_CODE_HASH,
        };
        if let Some(code) = code {
            inner.codes.insert(code_hash, code);
        }

        let mut slots = BTreeMap::new();
        for (raw_key, value) in storage {
            if *value == [0u8; 32] {
                continue;
            }
            let slot_hash = keccak256(raw_key);
            inner.preimages.insert(slot_hash, raw_key.to_vec());
            slots.insert(slot_hash, strip_storage_value(value));
        }

        let storage_root = if slots.is_empty() {
            EMPTY_MPT_ROOT
        } else {
            // Any non-empty marker; the sidecar only tests for emptiness.
            keccak256(&address)
        };

        let slim = SlimAccount {
            nonce,
            balance,
            storage_root,
            code_hash,
        };
        let account_hash = keccak256(&address);
        inner.preimages.insert(account_hash, address.to_vec());
        inner.accounts.insert(
            account_hash,
            StoredAccount {
                slim: encode_slim_account(&slim),
                storage: slots,
            },
        );
    }

    /// Drop an account from the fixture (it changed on the host side).
    pub fn remove_account(&self, address: &Address) {
        if let Ok(mut inner) = self.inner.write() {
            inner.accounts.remove(&keccak256(address));
        }
    }

    pub fn account_count(&self) -> usize {
        self.inner.read().map(|i| i.accounts.len()).unwrap_or(0)
    }

    /// Record the canonical hash at a height.
    pub fn set_canonical(&self, number: u64, hash: Hash) {
        if let Ok(mut inner) = self.inner.write() {
            inner.canonical.insert(number, hash);
        }
    }

    /// Move the canonical head.
    pub fn set_head(&self, head: BlockRef) {
        if let Ok(mut inner) = self.inner.write() {
            inner.canonical.insert(head.number, head.hash);
            inner.head = head;
        }
    }

    /// Make the next account iterator fail retryably after serving
    /// `accounts` entries.
    pub fn schedule_account_fault(&self, accounts: u64) {
        if let Ok(mut inner) = self.inner.write() {
            inner.account_faults.push_back(accounts);
        }
    }

    /// Make the next storage iterator fail retryably after serving
    /// `slots` entries.
    pub fn schedule_storage_fault(&self, slots: u64) {
        if let Ok(mut inner) = self.inner.write() {
            inner.storage_faults.push_back(slots);
        }
    }

    /// Record an extra preimage (e.g. a slot key used only in deltas).
    pub fn learn_preimage(&self, data: &[u8]) {
        if let Ok(mut inner) = self.inner.write() {
            inner.preimages.insert(keccak256(data), data.to_vec());
        }
    }
}

struct MockAccountIter {
    entries: Vec<(Hash, Vec<u8>)>,
    pos: usize,
    served: u64,
    fault_after: Option<u64>,
}

impl AccountIterator for MockAccountIter {
    fn next_account(&mut self) -> Result<Option<(Hash, Vec<u8>)>, IteratorError> {
        if let Some(threshold) = self.fault_after {
            if self.served >= threshold {
                self.fault_after = None;
                return Err(IteratorError::retryable("snapshot layer evicted"));
            }
        }
        let Some((hash, slim)) = self.entries.get(self.pos) else {
            return Ok(None);
        };
        self.pos += 1;
        self.served += 1;
        Ok(Some((*hash, slim.clone())))
    }
}

struct MockStorageIter {
    entries: Vec<(Hash, Vec<u8>)>,
    pos: usize,
    served: u64,
    fault_after: Option<u64>,
}

impl StorageIterator for MockStorageIter {
    fn next_slot(&mut self) -> Result<Option<(Hash, Vec<u8>)>, IteratorError> {
        if let Some(threshold) = self.fault_after {
            if self.served >= threshold {
                self.fault_after = None;
                return Err(IteratorError::retryable("storage layer evicted"));
            }
        }
        let Some((hash, value)) = self.entries.get(self.pos) else {
            return Ok(None);
        };
        self.pos += 1;
        self.served += 1;
        Ok(Some((*hash, value.clone())))
    }
}

impl SnapshotSource for MockChain {
    fn head_state_root(&self) -> Result<Hash, IteratorError> {
        self.inner
            .read()
            .map(|i| i.state_root)
            .map_err(|_| IteratorError::fatal("mock chain lock poisoned"))
    }

    fn account_iterator(
        &self,
        state_root: Hash,
        start: Hash,
    ) -> Result<Box<dyn AccountIterator + Send + '_>, IteratorError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| IteratorError::fatal("mock chain lock poisoned"))?;
        if state_root != inner.state_root {
            return Err(IteratorError::retryable("snapshot stale"));
        }
        let fault_after = inner.account_faults.pop_front();
        let entries = inner
            .accounts
            .range(start..)
            .map(|(hash, account)| (*hash, account.slim.clone()))
            .collect();
        Ok(Box::new(MockAccountIter {
            entries,
            pos: 0,
            served: 0,
            fault_after,
        }))
    }

    fn storage_iterator(
        &self,
        state_root: Hash,
        account_hash: Hash,
        start: Hash,
    ) -> Result<Box<dyn StorageIterator + Send + '_>, IteratorError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| IteratorError::fatal("mock chain lock poisoned"))?;
        if state_root != inner.state_root {
            return Err(IteratorError::retryable("snapshot stale"));
        }
        let fault_after = inner.storage_faults.pop_front();
        let entries = inner
            .accounts
            .get(&account_hash)
            .map(|account| {
                account
                    .storage
                    .range(start..)
                    .map(|(hash, value)| (*hash, value.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(Box::new(MockStorageIter {
            entries,
            pos: 0,
            served: 0,
            fault_after,
        }))
    }
}

impl PreimageSource for MockChain {
    fn preimage(&self, hash: &Hash) -> Option<Vec<u8>> {
        self.inner.read().ok()?.preimages.get(hash).cloned()
    }
}

impl CodeSource for MockChain {
    fn code(&self, code_hash: &Hash) -> Option<Vec<u8>> {
        self.inner.read().ok()?.codes.get(code_hash).cloned()
    }
}

impl CanonicalChain for MockChain {
    fn canonical_hash(&self, number: u64) -> Option<Hash> {
        self.inner.read().ok()?.canonical.get(&number).copied()
    }

    fn head_ref(&self) -> BlockRef {
        self.inner
            .read()
            .map(|i| i.head)
            .unwrap_or(BlockRef::new(0, ZERO_HASH))
    }
}
