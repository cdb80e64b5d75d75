//! # Node Wiring
//!
//! Connects the adapters to the replication engine.
//!
//! ```text
//!   HTTP client ──POST /tx──→ HttpTxService ──inbox──┐
//!                                                    ▼
//!                                          ReplicationEngine ──process_block──→ LedgerState
//!                                            ▲            │
//!                                   commits  │            │ submit_tx
//!                                            │            ▼
//!   consensus ──State.CommitBlock──→ SocketConsensusProxy ──Babble.SubmitTx──→ consensus
//! ```

pub mod node;

pub use node::*;
