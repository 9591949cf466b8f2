//! # Sidecar Configuration
//!
//! Tunables for the converter, the update queue, and the node database's
//! retention behavior.

use serde::{Deserialize, Serialize};

/// Sidecar configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SidecarConfig {
    /// Flush the node database to disk every this many blocks. `None`
    /// commits only at conversion cutover and on close.
    pub commit_interval: Option<u64>,

    /// Maximum pending deltas in the update queue during conversion.
    /// Exceeding it marks the sidecar stale.
    pub queue_limit: usize,

    /// Accounts converted between batch commits and progress writes.
    pub conversion_batch: usize,

    /// Diff layers kept recoverable above the disk layer.
    pub history_window: usize,

    /// Consecutive snapshot re-opens without progress before the
    /// conversion fails.
    pub max_open_retries: u32,

    /// Base delay of the converter's exponential backoff.
    pub backoff_base_ms: u64,

    /// Backoff ceiling; jitter is added on top.
    pub backoff_cap_ms: u64,

    /// Clean-node cache entries in the node database.
    pub node_cache_size: usize,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            commit_interval: None,
            queue_limit: 4096,
            conversion_batch: 1024,
            history_window: 128,
            max_open_retries: 10,
            backoff_base_ms: 100,
            backoff_cap_ms: 30_000,
            node_cache_size: 16_384,
        }
    }
}

impl SidecarConfig {
    /// Create a config for testing (small batches, fast backoff).
    pub fn for_testing() -> Self {
        Self {
            commit_interval: None,
            queue_limit: 64,
            conversion_batch: 4,
            history_window: 8,
            max_open_retries: 5,
            backoff_base_ms: 1,
            backoff_cap_ms: 10,
            node_cache_size: 128,
        }
    }
}
