//! # Domain Layer for the Trie Stack
//!
//! Pure trie logic, independent of any concrete store.
//!
//! ## Modules
//!
//! - `keys`: tree-key derivation from addresses, slots, and code chunks
//! - `rlp`: minimal RLP encode/decode helpers
//! - `encoding`: leaf-value layouts (basic data, code chunks, slim accounts)
//! - `node`: the four node variants with codec and hashing
//! - `trie`: the persistent binary trie
//! - `node_db`: layered, path-addressed node store
//! - `errors`: domain error types

pub mod encoding;
pub mod errors;
pub mod keys;
pub mod node;
pub mod node_db;
pub mod rlp;
pub mod trie;

pub use encoding::*;
pub use errors::*;
pub use keys::*;
pub use node::*;
pub use node_db::*;
pub use rlp::keccak256;
pub use trie::*;
