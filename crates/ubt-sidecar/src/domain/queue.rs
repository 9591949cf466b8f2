//! # Durable Update Queue
//!
//! FIFO of block deltas arriving while the conversion runs, persisted in
//! the shared store under keys that sort by `(block number, block hash)`.
//!
//! Entries carry a CRC32 checksum computed at enqueue time and verified
//! on every read; a mismatch surfaces as a decode error and stales the
//! sidecar rather than replaying a corrupt delta.

use crate::domain::delta::BlockDelta;
use crate::domain::errors::from_store;
use serde::{Deserialize, Serialize};
use shared_types::{schema, Hash, SidecarError};
use std::sync::Arc;
use ubt_trie::{BatchOperation, KeyValueStore};

/// On-disk bounds of the queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMeta {
    /// Lowest block number ever enqueued since the last reset.
    pub start: u64,
    /// Highest block number enqueued.
    pub end: u64,
    /// Live entries.
    pub count: u64,
}

/// A queued delta with its integrity checksum.
#[derive(Serialize, Deserialize)]
struct QueueRecord {
    checksum: u32,
    payload: Vec<u8>,
}

/// Durable FIFO of pending block deltas.
pub struct UpdateQueue<S: KeyValueStore> {
    store: Arc<S>,
    limit: usize,
}

impl<S: KeyValueStore> UpdateQueue<S> {
    pub fn new(store: Arc<S>, limit: usize) -> Self {
        Self { store, limit }
    }

    /// The on-disk meta record; defaults when the queue is empty.
    pub fn meta(&self) -> Result<QueueMeta, SidecarError> {
        match self.store.get(schema::QUEUE_META_KEY).map_err(from_store)? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map_err(|e| SidecarError::DecodeError(format!("queue meta: {e}"))),
            None => Ok(QueueMeta::default()),
        }
    }

    /// Number of pending deltas.
    pub fn len(&self) -> Result<usize, SidecarError> {
        Ok(self.meta()?.count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, SidecarError> {
        Ok(self.len()? == 0)
    }

    /// Append a delta. Fails with `QueueOverflow` once the configured
    /// limit is reached.
    pub fn enqueue(&self, delta: &BlockDelta) -> Result<(), SidecarError> {
        let mut meta = self.meta()?;
        if meta.count as usize >= self.limit {
            return Err(SidecarError::QueueOverflow { limit: self.limit });
        }

        let payload = bincode::serialize(delta)
            .map_err(|e| SidecarError::DecodeError(format!("queued delta: {e}")))?;
        let record = QueueRecord {
            checksum: crc32fast::hash(&payload),
            payload,
        };
        let bytes = bincode::serialize(&record)
            .map_err(|e| SidecarError::DecodeError(format!("queued delta: {e}")))?;

        if meta.count == 0 {
            meta.start = delta.block_num;
            meta.end = delta.block_num;
        } else {
            meta.start = meta.start.min(delta.block_num);
            meta.end = meta.end.max(delta.block_num);
        }
        meta.count += 1;

        self.store
            .atomic_batch_write(vec![
                BatchOperation::put(
                    schema::queue_entry_key(delta.block_num, &delta.block_hash),
                    bytes,
                ),
                BatchOperation::put(schema::QUEUE_META_KEY, encode_meta(&meta)?),
            ])
            .map_err(from_store)?;

        tracing::debug!(
            block = delta.block_num,
            hash = %shared_types::short_hash(&delta.block_hash),
            pending = meta.count,
            "delta enqueued"
        );
        Ok(())
    }

    /// All pending deltas in ascending `(block number, block hash)`
    /// order, as guaranteed by the key format.
    pub fn iterate(&self) -> Result<Vec<(u64, Hash, BlockDelta)>, SidecarError> {
        let entries = self
            .store
            .prefix_scan(schema::QUEUE_PREFIX)
            .map_err(from_store)?;

        let mut deltas = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let (block_num, block_hash) = decode_entry_key(&key)?;
            let record: QueueRecord = bincode::deserialize(&value)
                .map_err(|e| SidecarError::DecodeError(format!("queued delta: {e}")))?;
            if crc32fast::hash(&record.payload) != record.checksum {
                return Err(SidecarError::DecodeError(format!(
                    "queued delta for block {block_num} failed its checksum"
                )));
            }
            let delta: BlockDelta = bincode::deserialize(&record.payload)
                .map_err(|e| SidecarError::DecodeError(format!("queued delta: {e}")))?;
            deltas.push((block_num, block_hash, delta));
        }
        Ok(deltas)
    }

    /// Remove one entry, maintaining the meta record.
    pub fn delete(&self, block_num: u64, block_hash: &Hash) -> Result<(), SidecarError> {
        let key = schema::queue_entry_key(block_num, block_hash);
        if !self.store.exists(&key).map_err(from_store)? {
            return Ok(());
        }

        let mut meta = self.meta()?;
        meta.count = meta.count.saturating_sub(1);
        let meta_op = if meta.count == 0 {
            BatchOperation::delete(schema::QUEUE_META_KEY.to_vec())
        } else {
            if block_num == meta.start {
                meta.start = block_num + 1;
            }
            BatchOperation::put(schema::QUEUE_META_KEY, encode_meta(&meta)?)
        };

        self.store
            .atomic_batch_write(vec![BatchOperation::delete(key), meta_op])
            .map_err(from_store)
    }

    /// Drop every entry and the meta record.
    pub fn reset(&self) -> Result<(), SidecarError> {
        let entries = self
            .store
            .prefix_scan(schema::QUEUE_PREFIX)
            .map_err(from_store)?;
        let mut batch: Vec<BatchOperation> = entries
            .into_iter()
            .map(|(key, _)| BatchOperation::delete(key))
            .collect();
        batch.push(BatchOperation::delete(schema::QUEUE_META_KEY.to_vec()));
        self.store.atomic_batch_write(batch).map_err(from_store)
    }
}

fn encode_meta(meta: &QueueMeta) -> Result<Vec<u8>, SidecarError> {
    bincode::serialize(meta).map_err(|e| SidecarError::DecodeError(format!("queue meta: {e}")))
}

fn decode_entry_key(key: &[u8]) -> Result<(u64, Hash), SidecarError> {
    let body = key
        .strip_prefix(schema::QUEUE_PREFIX)
        .filter(|body| body.len() == 40)
        .ok_or_else(|| SidecarError::DecodeError(format!("queue entry key of {} bytes", key.len())))?;
    let block_num = u64::from_be_bytes(body[..8].try_into().expect("fixed slice"));
    let block_hash: Hash = body[8..].try_into().expect("fixed slice");
    Ok((block_num, block_hash))
}
