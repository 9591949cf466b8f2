//! # Test Fixtures
//!
//! A sidecar harness over the in-memory store and the mock host chain,
//! plus helpers for building accounts, deltas, and stop-controlled
//! snapshot sources.

use primitive_types::U256;
use shared_types::{BlockRef, Hash, StorageKey, StorageValue, EMPTY_CODE_HASH, EMPTY_MPT_ROOT};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};
use ubt_sidecar::{
    AccountIterator, IteratorError, MockChain, SidecarApi, SidecarConfig, SnapshotSource,
    StorageIterator, UbtSidecar,
};
use ubt_trie::{keccak256, InMemoryKVStore, SlimAccount};

/// A sidecar wired to an in-memory store and a mock chain.
pub struct Harness {
    pub store: Arc<InMemoryKVStore>,
    pub chain: Arc<MockChain>,
    pub sidecar: Arc<UbtSidecar<InMemoryKVStore>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SidecarConfig::for_testing())
    }

    pub fn with_config(config: SidecarConfig) -> Self {
        let store = Arc::new(InMemoryKVStore::new());
        let chain = Arc::new(MockChain::new());
        Self::over(store, chain, config)
    }

    /// Build a sidecar over existing fixtures (for restart tests).
    pub fn over(store: Arc<InMemoryKVStore>, chain: Arc<MockChain>, config: SidecarConfig) -> Self {
        init_tracing();
        let sidecar = UbtSidecar::open(
            store.clone(),
            chain.clone(),
            chain.clone(),
            chain.clone(),
            config,
        )
        .expect("open sidecar");
        Self {
            store,
            chain,
            sidecar,
        }
    }

    /// Run a full conversion anchored at `anchor` and wait for Ready.
    pub fn convert(&self, anchor: BlockRef) {
        self.chain.set_head(anchor);
        self.sidecar
            .convert_from_mpt(
                self.chain.state_root(),
                anchor.number,
                anchor.hash,
                self.chain.clone(),
            )
            .expect("start conversion");
        self.wait_ready();
    }

    /// Block until the sidecar reports Ready.
    pub fn wait_ready(&self) {
        wait_until(|| self.sidecar.ready(), Duration::from_secs(10));
        assert!(self.sidecar.ready(), "sidecar did not become ready");
    }

    /// Block until the background conversion worker settles in any
    /// non-converting state.
    pub fn wait_settled(&self) {
        wait_until(|| !self.sidecar.converting(), Duration::from_secs(10));
    }

    /// The current root, asserting one exists.
    pub fn root(&self) -> Hash {
        self.sidecar.current_root().expect("no current root")
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

static TRACING: Once = Once::new();

/// Install a fmt subscriber once per process; `RUST_LOG` filters it.
fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Spin until `condition` holds or `timeout` elapses.
pub fn wait_until(condition: impl Fn() -> bool, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while !condition() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// A plain account without code or storage.
pub fn slim(nonce: u64, balance: u64) -> SlimAccount {
    SlimAccount {
        nonce,
        balance: U256::from(balance),
        storage_root: EMPTY_MPT_ROOT,
        code_hash: EMPTY_CODE_HASH,
    }
}

/// A contract account for the given code, marking storage as present.
pub fn slim_contract(nonce: u64, balance: u64, code: &[u8], has_storage: bool) -> SlimAccount {
    SlimAccount {
        nonce,
        balance: U256::from(balance),
        storage_root: if has_storage {
            [0x77; 32]
        } else {
            EMPTY_MPT_ROOT
        },
        code_hash: keccak256(code),
    }
}

/// A block reference with a recognizable hash.
pub fn block(number: u64) -> BlockRef {
    let mut hash = [0xB0; 32];
    hash[31] = number as u8;
    BlockRef::new(number, hash)
}

/// A 32-byte storage key with the given low byte.
pub fn slot(low: u8) -> StorageKey {
    let mut key = [0u8; 32];
    key[31] = low;
    key
}

/// A 32-byte storage value with the given low byte.
pub fn value(low: u8) -> StorageValue {
    let mut value = [0u8; 32];
    value[31] = low;
    value
}

/// A snapshot source that delegates to the mock chain and invokes a
/// callback after serving a fixed number of accounts - used to stop the
/// converter at a deterministic point.
pub struct StopAfterAccounts {
    inner: Arc<MockChain>,
    remaining: AtomicU64,
    on_trigger: Box<dyn Fn() + Send + Sync>,
}

impl StopAfterAccounts {
    pub fn new(inner: Arc<MockChain>, accounts: u64, on_trigger: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            inner,
            remaining: AtomicU64::new(accounts),
            on_trigger: Box::new(on_trigger),
        }
    }

    fn count_one(&self) {
        let before = self.remaining.fetch_sub(1, Ordering::SeqCst);
        if before == 1 {
            (self.on_trigger)();
        }
    }
}

struct CountingIter<'a> {
    inner: Box<dyn AccountIterator + Send + 'a>,
    owner: &'a StopAfterAccounts,
}

impl AccountIterator for CountingIter<'_> {
    fn next_account(&mut self) -> Result<Option<(Hash, Vec<u8>)>, IteratorError> {
        let item = self.inner.next_account()?;
        if item.is_some() {
            self.owner.count_one();
        }
        Ok(item)
    }
}

impl SnapshotSource for StopAfterAccounts {
    fn head_state_root(&self) -> Result<Hash, IteratorError> {
        self.inner.head_state_root()
    }

    fn account_iterator(
        &self,
        state_root: Hash,
        start: Hash,
    ) -> Result<Box<dyn AccountIterator + Send + '_>, IteratorError> {
        let inner = self.inner.account_iterator(state_root, start)?;
        Ok(Box::new(CountingIter { inner, owner: self }))
    }

    fn storage_iterator(
        &self,
        state_root: Hash,
        account_hash: Hash,
        start: Hash,
    ) -> Result<Box<dyn StorageIterator + Send + '_>, IteratorError> {
        self.inner.storage_iterator(state_root, account_hash, start)
    }
}
