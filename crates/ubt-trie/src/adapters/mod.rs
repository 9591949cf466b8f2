//! # Adapters for the Trie Stack
//!
//! In-memory implementation of the key/value store port, used by unit
//! tests and light deployments. Production binds the host database.

pub mod memory_db;

pub use memory_db::*;
