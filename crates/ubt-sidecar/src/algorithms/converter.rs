//! # MPT-to-UBT Converter
//!
//! The resumable snapshot walk that builds the initial binary trie while
//! the host keeps importing blocks.
//!
//! ## Algorithm
//!
//! Walk the flat account snapshot in hash order, writing each account,
//! its code chunks, and its storage into the UBT. Every batch of accounts
//! commits the trie delta to the node database and persists the progress
//! record, so a crash or stop resumes from `next_account_hash` instead of
//! starting over.
//!
//! ## Retry Model
//!
//! Snapshot iterators are resilient to layer eviction only at open time:
//! a retryable failure releases the iterator, re-reads the head state
//! root, backs off exponentially (capped, with uniform jitter), and
//! re-opens at the successor of the last fully processed account.
//! Account writes are idempotent, so partial re-processing is safe.

use crate::config::SidecarConfig;
use crate::domain::errors::from_trie;
use crate::domain::records::{ConversionProgress, ConversionStage};
use crate::ports::outbound::{CodeSource, IteratorError, PreimageSource, SnapshotSource};
use rand::Rng;
use shared_types::{increment_hash, Address, BlockRef, Hash, SidecarError, StorageKey, ZERO_HASH};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use ubt_trie::{
    decode_slim_account, extend_storage_value, BinaryTrie, KeyValueStore, NodeDatabase,
    NodeDbReader, UbtAccount,
};

/// Everything the conversion worker needs, borrowed from the service.
pub struct ConversionContext<'a, S: KeyValueStore> {
    pub store: &'a S,
    pub node_db: &'a NodeDatabase<S>,
    pub snapshot: &'a dyn SnapshotSource,
    pub preimages: &'a dyn PreimageSource,
    pub codes: &'a dyn CodeSource,
    pub config: &'a SidecarConfig,
    pub stop: &'a AtomicBool,
    /// Canonical block the conversion anchors to; its number keys every
    /// node-database update the walk makes.
    pub anchor: BlockRef,
    /// MPT state root the walk starts from.
    pub state_root: Hash,
}

/// How a conversion run ended.
#[derive(Debug)]
pub enum ConversionOutcome {
    /// Every account is converted; this root is committed to disk.
    Completed(Hash),
    /// Stop was requested; progress is persisted for resumption.
    Stopped,
}

enum ConvertError {
    /// Re-open the snapshot and resume.
    Retry(String),
    /// Abort the conversion.
    Fatal(SidecarError),
}

/// Drive a conversion to completion, stop, or failure.
pub fn run<S: KeyValueStore>(
    ctx: &ConversionContext<'_, S>,
) -> Result<ConversionOutcome, SidecarError> {
    let mut progress = match ConversionProgress::load(ctx.store)? {
        Some(mut resumed) if resumed.stage == ConversionStage::Running => {
            tracing::info!(
                accounts = resumed.accounts_done,
                slots = resumed.slots_done,
                "resuming conversion from persisted progress"
            );
            resumed.state_root = ctx.state_root;
            resumed.last_error = None;
            resumed
        }
        _ => {
            tracing::info!(
                state_root = %shared_types::short_hash(&ctx.state_root),
                block = ctx.anchor.number,
                "starting conversion"
            );
            ConversionProgress::begin(ctx.state_root, unix_now())
        }
    };
    progress.save(ctx.store)?;

    let mut state_root = progress.state_root;
    let mut retries: u32 = 0;

    'reopen: loop {
        if retries > ctx.config.max_open_retries {
            return Err(fail(
                ctx,
                &mut progress,
                SidecarError::IoError("snapshot open retries exhausted".into()),
            ));
        }

        let mut accounts =
            match ctx.snapshot.account_iterator(state_root, progress.next_account_hash) {
                Ok(iter) => iter,
                Err(err) if err.is_retryable() => {
                    state_root = backoff_and_refresh(ctx, state_root, retries, &err);
                    retries += 1;
                    continue 'reopen;
                }
                Err(err) => {
                    return Err(fail(ctx, &mut progress, SidecarError::IoError(err.to_string())))
                }
            };

        let reader = ctx.node_db.reader(progress.ubt_root).map_err(from_trie)?;
        let mut trie = BinaryTrie::open(progress.ubt_root, reader);
        let mut batched: usize = 0;

        loop {
            if ctx.stop.load(Ordering::Relaxed) {
                commit_batch(ctx, &mut trie, &mut progress)?;
                tracing::info!(accounts = progress.accounts_done, "conversion stopped");
                return Ok(ConversionOutcome::Stopped);
            }

            match accounts.next_account() {
                Ok(Some((account_hash, slim_bytes))) => {
                    match convert_account(ctx, &mut trie, state_root, account_hash, &slim_bytes, &mut progress)
                    {
                        Ok(slots) => {
                            progress.accounts_done += 1;
                            progress.slots_done += slots;
                            progress.current_account = None;
                            progress.next_storage_hash = None;
                            retries = 0;
                            batched += 1;

                            let Some(next) = increment_hash(&account_hash) else {
                                // The last possible account hash wrapped:
                                // the walk is complete.
                                let root = commit_batch(ctx, &mut trie, &mut progress)?;
                                return finish(ctx, &mut progress, root);
                            };
                            progress.next_account_hash = next;

                            if batched >= ctx.config.conversion_batch {
                                let root = commit_batch(ctx, &mut trie, &mut progress)?;
                                let reader = ctx.node_db.reader(root).map_err(from_trie)?;
                                trie = BinaryTrie::open(root, reader);
                                batched = 0;
                            }
                        }
                        Err(ConvertError::Retry(reason)) => {
                            commit_batch(ctx, &mut trie, &mut progress)?;
                            let err = IteratorError::retryable(reason);
                            state_root = backoff_and_refresh(ctx, state_root, retries, &err);
                            retries += 1;
                            continue 'reopen;
                        }
                        Err(ConvertError::Fatal(err)) => return Err(fail(ctx, &mut progress, err)),
                    }
                }
                Ok(None) => {
                    let root = commit_batch(ctx, &mut trie, &mut progress)?;
                    return finish(ctx, &mut progress, root);
                }
                Err(err) if err.is_retryable() => {
                    commit_batch(ctx, &mut trie, &mut progress)?;
                    state_root = backoff_and_refresh(ctx, state_root, retries, &err);
                    retries += 1;
                    continue 'reopen;
                }
                Err(err) => {
                    return Err(fail(ctx, &mut progress, SidecarError::IoError(err.to_string())))
                }
            }
        }
    }
}

/// Convert one account: record, code chunks, and the storage walk.
/// Returns the number of slots written.
fn convert_account<'a, S: KeyValueStore>(
    ctx: &ConversionContext<'a, S>,
    trie: &mut BinaryTrie<NodeDbReader<'a, S>>,
    state_root: Hash,
    account_hash: Hash,
    slim_bytes: &[u8],
    progress: &mut ConversionProgress,
) -> Result<u64, ConvertError> {
    let address = resolve_address(ctx, &account_hash)?;
    let slim = decode_slim_account(slim_bytes)
        .map_err(|e| ConvertError::Fatal(from_trie(e)))?;

    let (code, code_size) = if slim.has_code() {
        let code = ctx.codes.code(&slim.code_hash).ok_or_else(|| {
            ConvertError::Fatal(SidecarError::PreimageMissing {
                hash: shared_types::full_hash(&slim.code_hash),
            })
        })?;
        let size = code.len() as u32;
        (Some(code), size)
    } else {
        (None, 0)
    };

    let account = UbtAccount::new(slim.balance, slim.nonce, slim.code_hash, code_size)
        .map_err(|e| ConvertError::Fatal(from_trie(e)))?;
    trie.update_account(&address, &account)
        .map_err(|e| ConvertError::Fatal(from_trie(e)))?;
    if let Some(code) = &code {
        trie.update_contract_code(&address, slim.code_hash, code)
            .map_err(|e| ConvertError::Fatal(from_trie(e)))?;
    }

    let mut slots = 0u64;
    if slim.has_storage() {
        let start = if progress.current_account == Some(account_hash) {
            progress.next_storage_hash.unwrap_or(ZERO_HASH)
        } else {
            ZERO_HASH
        };

        let mut iter = ctx
            .snapshot
            .storage_iterator(state_root, account_hash, start)
            .map_err(|err| {
                if err.is_retryable() {
                    progress.current_account = Some(account_hash);
                    ConvertError::Retry(err.to_string())
                } else {
                    ConvertError::Fatal(SidecarError::IoError(err.to_string()))
                }
            })?;

        loop {
            match iter.next_slot() {
                Ok(Some((slot_hash, encoded))) => {
                    let raw = resolve_slot(ctx, &slot_hash)?;
                    let value = extend_storage_value(&encoded)
                        .map_err(|e| ConvertError::Fatal(from_trie(e)))?;
                    trie.update_storage(&address, &raw, value)
                        .map_err(|e| ConvertError::Fatal(from_trie(e)))?;
                    slots += 1;
                    progress.current_account = Some(account_hash);
                    progress.next_storage_hash = increment_hash(&slot_hash);
                }
                Ok(None) => break,
                Err(err) if err.is_retryable() => {
                    progress.current_account = Some(account_hash);
                    return Err(ConvertError::Retry(err.to_string()));
                }
                Err(err) => {
                    return Err(ConvertError::Fatal(SidecarError::IoError(err.to_string())))
                }
            }
        }
    }
    Ok(slots)
}

/// Commit the in-memory trie delta, chain it into the node database under
/// the anchor block number, and flush to disk. The progress record rides
/// in the same atomic batch, so a crash can never separate the two.
fn commit_batch<'a, S: KeyValueStore>(
    ctx: &ConversionContext<'a, S>,
    trie: &mut BinaryTrie<NodeDbReader<'a, S>>,
    progress: &mut ConversionProgress,
) -> Result<Hash, SidecarError> {
    let commit = trie.commit().map_err(from_trie)?;
    if commit.root == progress.ubt_root {
        progress.save(ctx.store)?;
        return Ok(progress.ubt_root);
    }

    let parent = progress.ubt_root;
    progress.ubt_root = commit.root;
    let record = bincode::serialize(progress)
        .map_err(|e| SidecarError::DecodeError(format!("conversion progress: {e}")))?;

    ctx.node_db
        .update(commit.root, parent, ctx.anchor.number, commit.nodes, commit.leaves)
        .map_err(from_trie)?;
    ctx.node_db
        .commit_with(
            commit.root,
            vec![ubt_trie::BatchOperation::put(
                shared_types::schema::CONVERSION_PROGRESS_KEY.to_vec(),
                record,
            )],
        )
        .map_err(from_trie)?;

    tracing::debug!(
        root = %shared_types::short_hash(&commit.root),
        accounts = progress.accounts_done,
        slots = progress.slots_done,
        "conversion batch committed"
    );
    Ok(progress.ubt_root)
}

fn finish<S: KeyValueStore>(
    ctx: &ConversionContext<'_, S>,
    progress: &mut ConversionProgress,
    root: Hash,
) -> Result<ConversionOutcome, SidecarError> {
    progress.stage = ConversionStage::Done;
    progress.save(ctx.store)?;
    tracing::info!(
        root = %shared_types::short_hash(&root),
        accounts = progress.accounts_done,
        slots = progress.slots_done,
        "conversion walk complete"
    );
    Ok(ConversionOutcome::Completed(root))
}

fn fail<S: KeyValueStore>(
    ctx: &ConversionContext<'_, S>,
    progress: &mut ConversionProgress,
    error: SidecarError,
) -> SidecarError {
    progress.stage = ConversionStage::Failed;
    progress.last_error = Some(error.to_string());
    if let Err(save_err) = progress.save(ctx.store) {
        tracing::error!(error = %save_err, "could not persist conversion failure");
    }
    tracing::error!(error = %error, "conversion failed");
    error
}

fn resolve_address<S: KeyValueStore>(
    ctx: &ConversionContext<'_, S>,
    account_hash: &Hash,
) -> Result<Address, ConvertError> {
    let bytes = ctx.preimages.preimage(account_hash).ok_or_else(|| {
        ConvertError::Fatal(SidecarError::PreimageMissing {
            hash: shared_types::full_hash(account_hash),
        })
    })?;
    bytes.as_slice().try_into().map_err(|_| {
        ConvertError::Fatal(SidecarError::DecodeError(format!(
            "address preimage of {} bytes",
            bytes.len()
        )))
    })
}

fn resolve_slot<S: KeyValueStore>(
    ctx: &ConversionContext<'_, S>,
    slot_hash: &Hash,
) -> Result<StorageKey, ConvertError> {
    let bytes = ctx.preimages.preimage(slot_hash).ok_or_else(|| {
        ConvertError::Fatal(SidecarError::PreimageMissing {
            hash: shared_types::full_hash(slot_hash),
        })
    })?;
    bytes.as_slice().try_into().map_err(|_| {
        ConvertError::Fatal(SidecarError::DecodeError(format!(
            "slot preimage of {} bytes",
            bytes.len()
        )))
    })
}

/// Sleep out the backoff for `attempt`, then re-read the head state root.
fn backoff_and_refresh<S: KeyValueStore>(
    ctx: &ConversionContext<'_, S>,
    current: Hash,
    attempt: u32,
    err: &IteratorError,
) -> Hash {
    let delay = backoff_delay(ctx.config, attempt);
    tracing::warn!(
        error = %err,
        attempt,
        delay_ms = delay.as_millis() as u64,
        "snapshot iterator released, backing off"
    );
    std::thread::sleep(delay);
    match ctx.snapshot.head_state_root() {
        Ok(root) => root,
        Err(head_err) => {
            tracing::warn!(error = %head_err, "head state unavailable, keeping previous root");
            current
        }
    }
}

/// Exponential backoff capped at the configured ceiling, plus a uniform
/// jitter of up to half the capped delay.
fn backoff_delay(config: &SidecarConfig, attempt: u32) -> Duration {
    let base = config
        .backoff_base_ms
        .saturating_mul(1u64 << attempt.min(16));
    let capped = base.min(config.backoff_cap_ms).max(1);
    let jitter = rand::thread_rng().gen_range(0..=capped / 2);
    Duration::from_millis(capped + jitter)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
