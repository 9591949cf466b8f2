//! # Sidecar Status
//!
//! The lifecycle states and the guarded mutable pointers of the service.
//! Everything here lives inside the service's single reader/writer lock;
//! no other global mutable state exists.

use shared_types::{BlockRef, Hash};

/// Lifecycle state of the sidecar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SidecarStatus {
    /// No UBT state exists and no conversion is running.
    AwaitingConversion,
    /// The initial snapshot walk is running; deltas queue up.
    Converting,
    /// The UBT tracks the canonical chain; deltas apply directly.
    Ready,
    /// An unrecoverable inconsistency stopped the pipeline; a fresh
    /// conversion is required.
    Stale,
}

/// Mutable service state behind the status lock.
#[derive(Clone, Debug)]
pub struct SidecarState {
    pub status: SidecarStatus,
    /// Current UBT root and the block it corresponds to.
    pub current: Option<(Hash, BlockRef)>,
    /// Last root flushed to disk and its block.
    pub committed: Option<(Hash, BlockRef)>,
    /// Block number of the last disk commit, for the commit interval.
    pub last_committed_block: u64,
    /// Disk-commit cadence in blocks; `None` disables interval commits.
    pub commit_interval: Option<u64>,
    /// Why the sidecar went stale, if it did.
    pub stale_reason: Option<String>,
}

impl SidecarState {
    pub fn new(commit_interval: Option<u64>) -> Self {
        Self {
            status: SidecarStatus::AwaitingConversion,
            current: None,
            committed: None,
            last_committed_block: 0,
            commit_interval,
            stale_reason: None,
        }
    }

    /// Current root and block, if the sidecar has state.
    pub fn current_info(&self) -> Option<(Hash, BlockRef)> {
        self.current
    }

    /// Record the stale condition. The first reason wins; later failures
    /// while already stale keep the original diagnosis.
    pub fn mark_stale(&mut self, reason: &str) {
        if self.status != SidecarStatus::Stale {
            self.status = SidecarStatus::Stale;
            self.stale_reason = Some(reason.to_string());
        }
    }
}
