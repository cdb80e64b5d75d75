//! Replication Engine - the control loop
//!
//! # Architecture
//! - One task, one `tokio::select!` over three sources: shutdown, the
//!   transaction inbox and the commit stream
//! - The chosen event is handled to completion inside the select handler, so
//!   nothing else is polled while a block is being applied
//! - Shutdown is only observed between events, never in the middle of a commit
//!
//! Both `submit_tx` and `process_block` may block on network or disk. The loop
//! services nothing else meanwhile; that bounds throughput but keeps exactly
//! one block in flight.

use std::sync::Arc;

use shared_types::Transaction;
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument, Span};

use crate::domain::{
    Commit, CommitReceiver, ConstructionError, EngineConfig, EngineError, ExecutionError,
};
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::ports::{ApplicationService, ConsensusProxy, NoopService, StateExecutor, TxReceiver};

/// Collaborators and policy handed to the engine at construction.
pub struct EngineDependencies<P, E, S = NoopService> {
    pub proxy: P,
    pub executor: E,
    /// Application service to start alongside the loop, if any.
    pub service: Option<S>,
    /// Receiving end of the inbox the service feeds.
    pub inbox: TxReceiver,
    pub config: EngineConfig,
    /// Logging context. The loop runs inside this span.
    pub span: Span,
}

/// The replication engine.
///
/// Exclusively owns the executor, the inbox receiver and the commit stream
/// for its whole lifetime.
pub struct ReplicationEngine<P, E, S = NoopService> {
    proxy: P,
    executor: E,
    service: Option<S>,
    inbox: TxReceiver,
    commits: CommitReceiver,
    config: EngineConfig,
    span: Span,
    metrics: Arc<EngineMetrics>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

/// Cloneable handle to a constructed or running engine.
#[derive(Clone)]
pub struct EngineHandle {
    shutdown_tx: Arc<watch::Sender<bool>>,
    metrics: Arc<EngineMetrics>,
}

impl EngineHandle {
    /// Ask the loop to stop once the current event, if any, is finished.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl<P, E, S> ReplicationEngine<P, E, S>
where
    P: ConsensusProxy,
    E: StateExecutor,
    S: ApplicationService,
{
    /// Wire the engine to its collaborators.
    ///
    /// Takes the commit stream from the proxy. Fails without side effects if
    /// the proxy has none to give.
    pub fn new(deps: EngineDependencies<P, E, S>) -> Result<Self, ConstructionError> {
        let EngineDependencies {
            mut proxy,
            executor,
            service,
            inbox,
            config,
            span,
        } = deps;

        let commits = proxy
            .commit_receiver()
            .ok_or(ConstructionError::CommitStreamUnavailable)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            proxy,
            executor,
            service,
            inbox,
            commits,
            config,
            span,
            metrics: Arc::new(EngineMetrics::new()),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        })
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            shutdown_tx: Arc::clone(&self.shutdown_tx),
            metrics: Arc::clone(&self.metrics),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start the application service and run the loop.
    ///
    /// Returns `Ok` after a shutdown request or once both inputs are closed.
    /// Returns `Err` only if the configured execution-failure bound is hit.
    pub async fn run(self) -> Result<(), EngineError> {
        let span = self.span.clone();
        self.serve().instrument(span).await
    }

    async fn serve(self) -> Result<(), EngineError> {
        let Self {
            proxy,
            mut executor,
            service,
            mut inbox,
            mut commits,
            config,
            metrics,
            shutdown_tx: _shutdown_tx,
            mut shutdown_rx,
            ..
        } = self;

        let service_task = service.map(|service| {
            tokio::spawn(
                async move {
                    match service.run().await {
                        Ok(()) => info!("Application service stopped"),
                        Err(e) => error!(error = %e, "Application service failed"),
                    }
                }
                .in_current_span(),
            )
        });

        info!("Entering replication loop");

        let mut inbox_open = true;
        let mut commits_open = true;
        let mut consecutive_failures: u32 = 0;

        let result = loop {
            tokio::select! {
                Ok(()) = shutdown_rx.changed(), if inbox_open || commits_open => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown requested, leaving replication loop");
                        break Ok(());
                    }
                }

                maybe_tx = inbox.recv(), if inbox_open => match maybe_tx {
                    Some(tx) => forward_transaction(&proxy, tx, &metrics).await,
                    None => {
                        inbox_open = false;
                        warn!("Transaction inbox closed");
                    }
                },

                maybe_commit = commits.recv(), if commits_open => match maybe_commit {
                    Some(commit) => match apply_commit(&mut executor, commit, &metrics) {
                        Ok(()) => consecutive_failures = 0,
                        Err(last) => {
                            consecutive_failures = consecutive_failures.saturating_add(1);
                            if config.should_escalate(consecutive_failures) {
                                error!(
                                    consecutive_failures,
                                    "Execution failure bound reached, stopping replication"
                                );
                                break Err(EngineError::ExecutionDiverged {
                                    consecutive_failures,
                                    last,
                                });
                            }
                        }
                    },
                    None => {
                        commits_open = false;
                        warn!("Commit stream closed");
                    }
                },

                else => {
                    info!("All event sources closed, leaving replication loop");
                    break Ok(());
                }
            }
        };

        if let Some(task) = service_task {
            task.abort();
        }

        result
    }
}

/// Forward one transaction. Failures are logged and the transaction dropped.
async fn forward_transaction<P: ConsensusProxy>(
    proxy: &P,
    tx: Transaction,
    metrics: &EngineMetrics,
) {
    let tx_len = tx.len();
    debug!(tx_len, "Submitting transaction to consensus");

    match proxy.submit_tx(tx).await {
        Ok(()) => {
            metrics.record_forwarded();
            debug!(tx_len, "Transaction submitted");
        }
        Err(e) => {
            metrics.record_submit_failure();
            error!(tx_len, error = %e, "Transaction submission failed, dropping it");
        }
    }
}

/// Apply one committed block and acknowledge it, whatever the outcome.
fn apply_commit<E: StateExecutor>(
    executor: &mut E,
    commit: Commit,
    metrics: &EngineMetrics,
) -> Result<(), ExecutionError> {
    let (block, responder) = commit.into_parts();
    let block_index = block.index();
    debug!(block_index, tx_count = block.tx_count(), "Applying committed block");

    let outcome = executor.process_block(&block);
    let result = match &outcome {
        Ok(digest) => {
            metrics.record_applied(block_index);
            info!(block_index, state_root = %digest, "Block applied");
            Ok(())
        }
        Err(e) => {
            metrics.record_execution_failure();
            error!(block_index, error = %e, "Block execution failed");
            Err(e.clone())
        }
    };

    if !responder.respond(outcome) {
        warn!(block_index, "Consensus stopped waiting for the acknowledgment");
    }

    result
}

#[cfg(test)]
mod tests;
