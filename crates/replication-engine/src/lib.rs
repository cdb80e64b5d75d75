//! # replication-engine
//!
//! State machine replication through a commit proxy.
//!
//! ## Role in System
//!
//! The engine owns one control loop and two inputs:
//!
//! ```text
//!   Application service ──tx──→ [Inbox] ──→ ReplicationEngine ──submit_tx──→ ConsensusProxy
//!                                                  ↑                               │
//!                                                  └──────── Commit(Block) ────────┘
//!                                                  │
//!                                                  ├──process_block──→ StateExecutor
//!                                                  │
//!                                                  └──respond(digest | error)──→ consensus
//! ```
//!
//! ## Invariants
//!
//! - At most one `StateExecutor::process_block` call is in flight, enforced by
//!   the loop itself: a commit is applied and acknowledged inside the select
//!   handler, before the next event is polled.
//! - Every commit taken from the stream is acknowledged exactly once, with the
//!   digest on success or the execution error on failure.
//! - Transactions and commits are each handled in FIFO order. There is no
//!   ordering between the two sources.
//! - A failed submission drops that transaction and nothing else.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use replication_engine::{EngineDependencies, ReplicationEngine, tx_inbox};
//!
//! let (tx_sender, inbox) = tx_inbox();
//! let engine = ReplicationEngine::new(EngineDependencies {
//!     proxy,
//!     executor,
//!     service: Some(service_using(tx_sender)),
//!     inbox,
//!     config: EngineConfig::default(),
//!     span: tracing::info_span!("engine"),
//! })?;
//! engine.run().await?;
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod domain;
pub mod metrics;
pub mod ports;
pub mod service;

pub use domain::{
    commit_channel, Commit, CommitOutcome, CommitReceipt, CommitReceiver, CommitResponder,
    CommitSender, ConstructionError, EngineConfig, EngineError, ExecutionError, ResponderDropped,
    ServiceError, SubmissionError,
};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use ports::{
    tx_inbox, ApplicationService, ConsensusProxy, NoopService, StateExecutor, TxReceiver,
    TxSender,
};
pub use service::{EngineDependencies, EngineHandle, ReplicationEngine};

/// Default capacity of the commit stream between a proxy and the engine.
///
/// Consensus waits for each acknowledgment anyway, so this only needs to
/// absorb commits arriving on several connections at once.
pub const DEFAULT_COMMIT_CAPACITY: usize = 64;
