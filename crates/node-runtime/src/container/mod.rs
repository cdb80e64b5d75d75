//! # Node Container
//!
//! Configuration for every collaborator the node wires into the replication
//! engine.

pub mod config;

pub use config::{
    ConfigError, ConsensusProxyConfig, NodeConfig, ServiceConfig, StateConfig,
};
