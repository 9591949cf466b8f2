//! # UBT Sidecar Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs       # Harness: sidecar over in-memory store + mock chain
//! └── integration/      # Cross-crate scenarios
//!     ├── scenarios.rs  # Per-block pipeline end to end
//!     ├── conversion.rs # Converter runs, resume, queue replay
//!     └── reorg.rs      # Reorg recovery and restart behavior
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p ubt-tests
//!
//! # By category
//! cargo test -p ubt-tests integration::scenarios::
//! cargo test -p ubt-tests integration::conversion::
//! ```

pub mod fixtures;
pub mod integration;

pub use fixtures::*;
