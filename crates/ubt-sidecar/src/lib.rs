//! # ubt-sidecar
//!
//! Shadow state engine maintaining a unified binary trie (UBT) in lockstep
//! with the host chain's Merkle-Patricia state.
//!
//! ## Role in System
//!
//! - **Converter**: a resumable background walk over a live MPT snapshot
//!   builds the initial UBT while the node keeps importing blocks
//! - **Update Pipeline**: per-block state deltas apply to the UBT in
//!   canonical order once conversion completes
//! - **Queue & Journal**: deltas arriving during conversion persist in a
//!   durable FIFO and replay at cutover
//!
//! ## Lifecycle
//!
//! ```text
//! AwaitingConversion ──convert_from_mpt──→ Converting
//!        ↑                                     │ (walk + queue drain)
//!        │                                     ↓
//!        └──────── fresh conversion ←─ Stale ← Ready ─→ apply blocks
//! ```
//!
//! Reads fail with typed errors until the sidecar is Ready; they never
//! return fabricated values during the pre-conversion window.
//!
//! ## Layers
//!
//! - `domain`: deltas, durable queue, progress records, status
//! - `ports`: host-chain boundary (snapshots, preimages, code, canonical
//!   chain) and the service API
//! - `algorithms`: deterministic delta sequencing and the converter
//! - `application`: the `UbtSidecar` service orchestrator
//! - `adapters`: scriptable mock host chain for tests

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use adapters::*;
pub use application::*;
pub use config::*;
pub use domain::*;
pub use ports::*;
