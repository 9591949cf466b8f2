//! # Ports for the Sidecar
//!
//! Trait boundaries in both directions: what the host must provide
//! (outbound / driven) and what the sidecar exposes (inbound / driving).

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
