//! # Adapters for the Sidecar
//!
//! Scriptable in-memory implementation of the host-chain ports, used by
//! unit and integration tests. Production binds the real node.

pub mod mock_chain;

pub use mock_chain::*;
