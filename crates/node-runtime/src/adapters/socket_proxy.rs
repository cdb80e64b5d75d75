//! # Socket Consensus Proxy
//!
//! Implements the `ConsensusProxy` port over TCP, speaking newline-delimited
//! JSON-RPC with the consensus engine.
//!
//! ```text
//!  node ──{"method":"Babble.SubmitTx","params":["<hex>"]}──→ proxy_addr   (consensus)
//!  node ←─{"result":true} | {"error":"..."}─────────────────
//!
//!  consensus ──{"method":"State.CommitBlock","params":[<Block>]}──→ client_addr   (node)
//!  consensus ←─{"result":{"state_hash":"<hex>"}} | {"error":"..."}──
//! ```
//!
//! Commits read from one connection are handed to the engine one at a time:
//! the next request on that connection is only read after the previous commit
//! has been acknowledged.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use replication_engine::{
    commit_channel, Commit, CommitReceiver, CommitSender, ConsensusProxy, ConstructionError,
    ExecutionError, SubmissionError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{Block, StateDigest, Transaction};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::container::ConsensusProxyConfig;

/// Method consensus exposes for transaction submission.
pub const SUBMIT_TX_METHOD: &str = "Babble.SubmitTx";

/// Method the node exposes for committed blocks.
pub const COMMIT_BLOCK_METHOD: &str = "State.CommitBlock";

// =============================================================================
// Wire Types
// =============================================================================

/// A JSON-RPC request line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

/// A JSON-RPC response line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RpcResponse {
    pub fn ok(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(message.into()),
        }
    }
}

/// Result payload of a successful `State.CommitBlock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResult {
    pub state_hash: StateDigest,
}

// =============================================================================
// Proxy
// =============================================================================

/// TCP proxy to the consensus engine.
pub struct SocketConsensusProxy {
    proxy_addr: String,
    timeout: Duration,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    commit_capacity: usize,
    next_id: AtomicU64,
}

impl SocketConsensusProxy {
    /// Bind the commit listener on `client_addr`.
    ///
    /// Nothing is accepted until the commit stream is taken.
    pub async fn bind(config: &ConsensusProxyConfig) -> Result<Self, ConstructionError> {
        let transport_err = |reason: String| ConstructionError::ConsensusTransport {
            addr: config.client_addr.clone(),
            reason,
        };

        let listener = TcpListener::bind(&config.client_addr)
            .await
            .map_err(|e| transport_err(e.to_string()))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| transport_err(e.to_string()))?;

        info!(
            client_addr = %local_addr,
            proxy_addr = %config.proxy_addr,
            "Consensus proxy bound"
        );

        Ok(Self {
            proxy_addr: config.proxy_addr.clone(),
            timeout: Duration::from_millis(config.tcp_timeout_ms),
            listener: Some(listener),
            local_addr,
            commit_capacity: config.commit_capacity,
            next_id: AtomicU64::new(1),
        })
    }

    /// Address consensus should deliver commits to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn round_trip(&self, request: &RpcRequest) -> Result<RpcResponse, SubmissionError> {
        let transport = |e: std::io::Error| SubmissionError::Transport(e.to_string());

        let stream = TcpStream::connect(&self.proxy_addr)
            .await
            .map_err(transport)?;
        let (read_half, mut write_half) = stream.into_split();

        let mut line =
            serde_json::to_string(request).map_err(|e| SubmissionError::Transport(e.to_string()))?;
        line.push('\n');
        write_half
            .write_all(line.as_bytes())
            .await
            .map_err(transport)?;

        let mut reply = String::new();
        let read = BufReader::new(read_half)
            .read_line(&mut reply)
            .await
            .map_err(transport)?;
        if read == 0 {
            return Err(SubmissionError::Transport(
                "connection closed before reply".into(),
            ));
        }

        serde_json::from_str(reply.trim_end())
            .map_err(|e| SubmissionError::Transport(format!("malformed reply: {}", e)))
    }
}

#[async_trait]
impl ConsensusProxy for SocketConsensusProxy {
    async fn submit_tx(&self, tx: Transaction) -> Result<(), SubmissionError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            id,
            method: SUBMIT_TX_METHOD.to_string(),
            params: vec![Value::String(hex::encode(tx.as_bytes()))],
        };

        let response = tokio::time::timeout(self.timeout, self.round_trip(&request))
            .await
            .map_err(|_| SubmissionError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            })??;

        if response.id != id {
            return Err(SubmissionError::Transport(format!(
                "reply id {} does not match request id {}",
                response.id, id
            )));
        }
        match response.error {
            Some(message) => Err(SubmissionError::Rejected(message)),
            None => Ok(()),
        }
    }

    fn commit_receiver(&mut self) -> Option<CommitReceiver> {
        let listener = self.listener.take()?;
        let (commit_tx, commit_rx) = commit_channel(self.commit_capacity);
        tokio::spawn(accept_commits(listener, commit_tx).in_current_span());
        Some(commit_rx)
    }
}

/// Accept consensus connections until the engine drops the commit stream.
async fn accept_commits(listener: TcpListener, commits: CommitSender) {
    loop {
        tokio::select! {
            _ = commits.closed() => {
                debug!("Commit stream closed, no longer accepting consensus connections");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "Consensus connected");
                    let commits = commits.clone();
                    tokio::spawn(
                        serve_connection(stream, commits)
                            .instrument(info_span!("consensus_conn", %peer)),
                    );
                }
                Err(e) => {
                    warn!(error = %e, "Failed to accept consensus connection");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            },
        }
    }
}

async fn serve_connection(stream: TcpStream, commits: CommitSender) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Consensus connection read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = handle_request(&line, &commits).await;
        let mut out = match serde_json::to_string(&response) {
            Ok(out) => out,
            Err(e) => {
                error!(error = %e, "Failed to encode response");
                break;
            }
        };
        out.push('\n');
        if let Err(e) = write_half.write_all(out.as_bytes()).await {
            warn!(error = %e, "Consensus connection write failed");
            break;
        }
    }
    debug!("Consensus connection closed");
}

/// Turn one request line into a commit, wait for its acknowledgment and build
/// the reply.
async fn handle_request(line: &str, commits: &CommitSender) -> RpcResponse {
    let request: RpcRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => return RpcResponse::err(0, format!("parse error: {}", e)),
    };
    if request.method != COMMIT_BLOCK_METHOD {
        return RpcResponse::err(request.id, format!("unknown method: {}", request.method));
    }

    let block: Block = match request.params.into_iter().next() {
        Some(value) => match serde_json::from_value(value) {
            Ok(block) => block,
            Err(e) => return RpcResponse::err(request.id, format!("invalid block: {}", e)),
        },
        None => return RpcResponse::err(request.id, "missing block parameter"),
    };

    debug!(block_index = block.index(), tx_count = block.tx_count(), "Commit received");
    let (commit, receipt) = Commit::new(block);
    if let Err(rejected) = commits.send(commit).await {
        rejected
            .0
            .respond(Err(ExecutionError::Storage("replication engine stopped".into())));
    }

    match receipt.wait().await {
        Ok(Ok(state_hash)) => match serde_json::to_value(CommitResult { state_hash }) {
            Ok(result) => RpcResponse::ok(request.id, result),
            Err(e) => RpcResponse::err(request.id, e.to_string()),
        },
        Ok(Err(e)) => RpcResponse::err(request.id, e.to_string()),
        Err(dropped) => RpcResponse::err(request.id, dropped.to_string()),
    }
}
