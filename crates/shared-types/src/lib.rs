//! # Shared Types Crate
//!
//! Entities passed between the replication engine and its collaborators.
//!
//! ## Design Principles
//!
//! - **Opaque payloads**: the engine never looks inside a `Transaction` or a
//!   `Block`; it only moves them between the inbox, consensus and the executor.
//! - **Fixed-size digests**: every state root is a 32-byte `StateDigest`.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
