//! # Adapter Implementations
//!
//! Concrete implementations of the replication engine's ports.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     OUTER LAYER (Adapters)                   │
//! │  HttpTxService    SocketConsensusProxy    LedgerState        │
//! │                         ↑ implements ↑                       │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │                  MIDDLE LAYER (Ports)                  │  │
//! │  │  ApplicationService   ConsensusProxy   StateExecutor   │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │                           ↑ uses ↑                           │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │               INNER LAYER (ReplicationEngine)          │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod http_service;
pub mod ledger_state;
pub mod lock;
pub mod socket_proxy;

pub use http_service::HttpTxService;
pub use ledger_state::{chain_root, JournalRecord, LedgerState};
pub use lock::{DataDirLock, LockError};
pub use socket_proxy::{
    CommitResult, RpcRequest, RpcResponse, SocketConsensusProxy, COMMIT_BLOCK_METHOD,
    SUBMIT_TX_METHOD,
};
