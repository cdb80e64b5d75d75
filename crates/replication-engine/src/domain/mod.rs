//! Domain layer: commits, acknowledgment capability, error taxonomy and
//! engine policy.

pub mod commit;
pub mod config;
pub mod errors;

pub use commit::*;
pub use config::*;
pub use errors::*;
