//! # Integration Tests
//!
//! Cross-crate scenarios driving the sidecar end to end over the
//! in-memory store and the mock host chain.

pub mod conversion;
pub mod reorg;
pub mod scenarios;
