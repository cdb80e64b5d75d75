//! # Node Configuration
//!
//! Unified configuration for the state executor, the consensus proxy, the
//! application service and the replication loop.
//!
//! Defaults are suitable for a single local node. Every field can be
//! overridden from the environment (see [`NodeConfig::apply_env`]).

use std::path::PathBuf;

use replication_engine::EngineConfig;
use thiserror::Error;
use tracing::{info, warn};

/// Environment variable names.
pub const ENV_DATA_DIR: &str = "CP_DATA_DIR";
pub const ENV_PROXY_ADDR: &str = "CP_PROXY_ADDR";
pub const ENV_CLIENT_ADDR: &str = "CP_CLIENT_ADDR";
pub const ENV_TCP_TIMEOUT_MS: &str = "CP_TCP_TIMEOUT_MS";
pub const ENV_API_ADDR: &str = "CP_API_ADDR";
pub const ENV_MAX_EXEC_FAILURES: &str = "CP_MAX_EXEC_FAILURES";

/// Complete node configuration.
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    /// State executor configuration.
    pub state: StateConfig,
    /// Consensus proxy configuration.
    pub consensus: ConsensusProxyConfig,
    /// Application service configuration.
    pub service: ServiceConfig,
    /// Replication loop policy.
    pub engine: EngineConfig,
}

impl NodeConfig {
    /// Reject configurations that cannot possibly wire up.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.consensus.tcp_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.consensus.proxy_addr.trim().is_empty() {
            return Err(ConfigError::EmptyAddress("consensus.proxy_addr"));
        }
        if self.consensus.client_addr.trim().is_empty() {
            return Err(ConfigError::EmptyAddress("consensus.client_addr"));
        }
        if self.service.api_addr.trim().is_empty() {
            return Err(ConfigError::EmptyAddress("service.api_addr"));
        }
        if self.consensus.proxy_addr == self.consensus.client_addr {
            return Err(ConfigError::AddressClash(self.consensus.proxy_addr.clone()));
        }
        Ok(())
    }

    /// Apply overrides from a key lookup (normally `std::env::var`).
    ///
    /// Unparseable numeric values are ignored with a warning.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.state.data_dir = PathBuf::from(dir);
        }
        if let Some(addr) = lookup(ENV_PROXY_ADDR) {
            self.consensus.proxy_addr = addr;
        }
        if let Some(addr) = lookup(ENV_CLIENT_ADDR) {
            self.consensus.client_addr = addr;
        }
        if let Some(addr) = lookup(ENV_API_ADDR) {
            self.service.api_addr = addr;
        }
        if let Some(raw) = lookup(ENV_TCP_TIMEOUT_MS) {
            match raw.parse() {
                Ok(ms) => self.consensus.tcp_timeout_ms = ms,
                Err(_) => warn!("{} must be an integer (milliseconds)", ENV_TCP_TIMEOUT_MS),
            }
        }
        if let Some(raw) = lookup(ENV_MAX_EXEC_FAILURES) {
            match raw.parse() {
                Ok(limit) => {
                    self.engine.max_consecutive_execution_failures = Some(limit);
                    info!(limit, "Execution failures will stop the node");
                }
                Err(_) => warn!("{} must be a positive integer", ENV_MAX_EXEC_FAILURES),
            }
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("consensus.tcp_timeout_ms must be greater than zero")]
    ZeroTimeout,

    #[error("{0} must not be empty")]
    EmptyAddress(&'static str),

    #[error("consensus proxy and client addresses are both {0}")]
    AddressClash(String),
}

/// State executor configuration.
#[derive(Debug, Clone)]
pub struct StateConfig {
    /// Directory holding the state journal and its lock file.
    pub data_dir: PathBuf,
    /// fsync the journal after every applied block.
    pub sync_writes: bool,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/state"),
            sync_writes: true,
        }
    }
}

/// Consensus proxy configuration.
#[derive(Debug, Clone)]
pub struct ConsensusProxyConfig {
    /// Address where consensus accepts submitted transactions.
    pub proxy_addr: String,
    /// Address this node listens on for committed blocks.
    pub client_addr: String,
    /// Connect/round-trip timeout for transaction submission.
    pub tcp_timeout_ms: u64,
    /// Commits buffered between the listener and the engine.
    pub commit_capacity: usize,
}

impl Default for ConsensusProxyConfig {
    fn default() -> Self {
        Self {
            proxy_addr: "127.0.0.1:1338".to_string(),
            client_addr: "127.0.0.1:1339".to_string(),
            tcp_timeout_ms: 1000,
            commit_capacity: replication_engine::DEFAULT_COMMIT_CAPACITY,
        }
    }
}

/// Application service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// HTTP listen address for transaction intake.
    pub api_addr: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_addr: "127.0.0.1:8080".to_string(),
        }
    }
}
