//! # Application Layer
//!
//! The `UbtSidecar` service: status and pointer management, the update
//! pipeline, reorg recovery, queue replay, and the conversion worker.

pub mod service;

pub use service::*;
