//! Ports: the contracts between the engine and its collaborators.
//!
//! - `inbound`: the transaction inbox fed by the application service
//! - `outbound`: consensus proxy, state executor, application service

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
