//! Committed blocks and their one-shot acknowledgment capability.
//!
//! A `Commit` pairs a `Block` with a `CommitResponder`. The responder is
//! consumed by `respond`, so it cannot be fulfilled twice. Dropping it
//! unfulfilled is a liveness bug: consensus would wait forever. The drop is
//! logged and the waiting `CommitReceipt` resolves to `ResponderDropped`.

use shared_types::{Block, StateDigest};
use tokio::sync::{mpsc, oneshot};
use tracing::error;

use super::errors::{ExecutionError, ResponderDropped};

/// Result reported back to consensus for one committed block.
pub type CommitOutcome = Result<StateDigest, ExecutionError>;

/// Producer side of the commit stream (held by a consensus proxy).
pub type CommitSender = mpsc::Sender<Commit>;

/// Consumer side of the commit stream (held by the engine).
pub type CommitReceiver = mpsc::Receiver<Commit>;

/// Create a bounded, FIFO commit stream.
pub fn commit_channel(capacity: usize) -> (CommitSender, CommitReceiver) {
    mpsc::channel(capacity.max(1))
}

/// A committed block awaiting application.
#[derive(Debug)]
pub struct Commit {
    block: Block,
    responder: CommitResponder,
}

impl Commit {
    /// Wrap a block, returning the commit and the receipt consensus waits on.
    pub fn new(block: Block) -> (Self, CommitReceipt) {
        let index = block.index();
        let (tx, rx) = oneshot::channel();
        let commit = Self {
            block,
            responder: CommitResponder {
                index,
                sender: Some(tx),
            },
        };
        (commit, CommitReceipt { index, receiver: rx })
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn index(&self) -> u64 {
        self.block.index()
    }

    /// Acknowledge this commit. See [`CommitResponder::respond`].
    pub fn respond(self, outcome: CommitOutcome) -> bool {
        self.responder.respond(outcome)
    }

    pub fn into_parts(self) -> (Block, CommitResponder) {
        (self.block, self.responder)
    }
}

/// Single-use acknowledgment capability for one commit.
#[derive(Debug)]
pub struct CommitResponder {
    index: u64,
    sender: Option<oneshot::Sender<CommitOutcome>>,
}

impl CommitResponder {
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Deliver the outcome to consensus.
    ///
    /// Returns `false` if the consensus side stopped waiting. The commit still
    /// counts as acknowledged from the engine's point of view.
    pub fn respond(mut self, outcome: CommitOutcome) -> bool {
        match self.sender.take() {
            Some(sender) => sender.send(outcome).is_ok(),
            None => false,
        }
    }
}

impl Drop for CommitResponder {
    fn drop(&mut self) {
        if self.sender.is_some() {
            error!(
                block_index = self.index,
                "Commit responder dropped without acknowledgment, consensus will stall"
            );
        }
    }
}

/// Consensus-side handle resolving to the commit's outcome.
#[derive(Debug)]
pub struct CommitReceipt {
    index: u64,
    receiver: oneshot::Receiver<CommitOutcome>,
}

impl CommitReceipt {
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Wait for the acknowledgment.
    pub async fn wait(self) -> Result<CommitOutcome, ResponderDropped> {
        let index = self.index;
        self.receiver.await.map_err(|_| ResponderDropped { index })
    }

    /// Non-blocking check. `Ok(None)` means not yet acknowledged.
    pub fn try_outcome(&mut self) -> Result<Option<CommitOutcome>, ResponderDropped> {
        match self.receiver.try_recv() {
            Ok(outcome) => Ok(Some(outcome)),
            Err(oneshot::error::TryRecvError::Empty) => Ok(None),
            Err(oneshot::error::TryRecvError::Closed) => {
                Err(ResponderDropped { index: self.index })
            }
        }
    }
}
