//! # ubt-trie
//!
//! Unified Binary Trie stack: key derivation, node model and codec, leaf
//! encodings, the persistent trie itself, and the layered node database it
//! commits into.
//!
//! ## Role in System
//!
//! - **Shadow State Representation**: a path-keyed binary radix trie over a
//!   flat key/value store, maintained in lockstep with the host's MPT.
//! - **Deterministic Roots**: identical logical state always produces an
//!   identical root, independent of insertion order.
//! - **Versioned Persistence**: commits produce diff layers keyed by root,
//!   kept recoverable for a bounded history window.
//!
//! ## Layers
//!
//! - `domain`: key codec, node model, encodings, trie, node database
//! - `ports`: the key/value store boundary required from the host
//! - `adapters`: in-memory store implementation for tests and light use

pub mod adapters;
pub mod domain;
pub mod ports;

pub use adapters::*;
pub use domain::*;
pub use ports::*;
