//! # Ports for the Trie Stack
//!
//! The key/value store boundary this library requires the host application
//! to implement.

pub mod database;

pub use database::*;
