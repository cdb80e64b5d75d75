//! Driven ports (outbound dependencies).

use async_trait::async_trait;
use shared_types::{Block, StateDigest, Transaction};

use crate::domain::{CommitReceiver, ExecutionError, ServiceError, SubmissionError};

/// Proxy to the external consensus engine.
#[async_trait]
pub trait ConsensusProxy: Send + Sync {
    /// Hand a transaction to consensus.
    ///
    /// Best effort: an error does not prove the transaction was lost, and the
    /// engine never retries.
    async fn submit_tx(&self, tx: Transaction) -> Result<(), SubmissionError>;

    /// Take the stream of committed blocks.
    ///
    /// Yields `Some` once; later calls return `None`.
    fn commit_receiver(&mut self) -> Option<CommitReceiver>;
}

/// Deterministic state machine that applies committed blocks.
///
/// `&mut self` is the mutual-exclusion contract: only the engine's loop holds
/// the executor, and it never calls `process_block` while another call is
/// outstanding.
pub trait StateExecutor: Send {
    /// Apply `block` and return the digest of the resulting state.
    fn process_block(&mut self, block: &Block) -> Result<StateDigest, ExecutionError>;
}

/// Application-facing service that produces transactions.
///
/// Started by the engine as an independent task. It talks to the engine only
/// through the inbox sender it was built with.
#[async_trait]
pub trait ApplicationService: Send + Sized + 'static {
    async fn run(self) -> Result<(), ServiceError>;
}

/// Service that does nothing. For engines fed directly through the inbox.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopService;

#[async_trait]
impl ApplicationService for NoopService {
    async fn run(self) -> Result<(), ServiceError> {
        Ok(())
    }
}
