//! # Node Runtime Library
//!
//! This library exposes the internal modules of the node runtime for testing.
//! The main entry point is the `main.rs` binary.
//!
//! ## Layout
//!
//! - `adapters/` - Port implementations (state, consensus socket, HTTP intake)
//! - `container/` - Node configuration
//! - `wiring/` - Assembly of a runnable node

pub mod adapters;
pub mod container;
pub mod wiring;

pub use wiring::{NodeEngine, NodeRuntime};
