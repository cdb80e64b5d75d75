//! Error types for the replication engine.
//!
//! Only `ConstructionError` may prevent startup. Submission and execution
//! failures are steady-state events: they are logged and, for execution,
//! reported back to consensus through the commit acknowledgment.

use thiserror::Error;

/// Forwarding a transaction to consensus failed.
///
/// Recovered locally: the transaction is dropped from the engine's
/// responsibility and the loop continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("Consensus transport error: {0}")]
    Transport(String),

    #[error("Consensus did not answer within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Consensus rejected transaction: {0}")]
    Rejected(String),

    #[error("Consensus proxy is closed")]
    Closed,
}

/// The state executor failed to apply a committed block.
///
/// Always surfaced to consensus through the commit acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("Block out of order: expected index {expected}, got {actual}")]
    OutOfOrder { expected: u64, actual: u64 },

    #[error("State storage error: {0}")]
    Storage(String),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),
}

/// A collaborator could not be initialized. Fatal: the loop never starts.
#[derive(Debug, Error)]
pub enum ConstructionError {
    #[error("Failed to open state storage: {0}")]
    StateStorage(String),

    #[error("Failed to set up consensus transport on {addr}: {reason}")]
    ConsensusTransport { addr: String, reason: String },

    #[error("Failed to bind application service on {addr}: {reason}")]
    ServiceBind { addr: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Consensus proxy has no commit stream to hand out")]
    CommitStreamUnavailable,
}

/// The application service stopped with an error.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Service I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Service stopped: {0}")]
    Stopped(String),
}

/// Terminal outcome of a running engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Execution diverged after {consecutive_failures} consecutive failures, last: {last}")]
    ExecutionDiverged {
        consecutive_failures: u32,
        last: ExecutionError,
    },
}

/// A commit responder was dropped without being fulfilled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Commit {index} was dropped without acknowledgment")]
pub struct ResponderDropped {
    pub index: u64,
}
