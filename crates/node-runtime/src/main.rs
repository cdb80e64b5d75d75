//! # Commit-Proxy Node Runtime
//!
//! Runs a replication node: transactions posted to the HTTP API are forwarded
//! to consensus, and blocks committed by consensus are applied to local state
//! one at a time.
//!
//! ## Startup Sequence
//!
//! 1. Install logging (`RUST_LOG`, default `info`)
//! 2. Load configuration (defaults, then `CP_*` environment overrides)
//! 3. Build the node (state, API listener, consensus listener, engine)
//! 4. Run until Ctrl+C or until the engine stops on its own

use anyhow::{Context, Result};
use node_runtime::container::NodeConfig;
use node_runtime::NodeRuntime;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Load configuration
    let mut config = NodeConfig::default();
    config.apply_env(|key| std::env::var(key).ok());

    let node = NodeRuntime::build(config)
        .await
        .context("Failed to construct replication node")?;
    let handle = node.handle();

    info!(
        api = %node.api_addr(),
        client = %node.client_addr(),
        "Node is running. Press Ctrl+C to stop."
    );

    let mut run = tokio::spawn(node.run());

    let outcome = tokio::select! {
        joined = &mut run => joined,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "Failed to listen for Ctrl+C, shutting down");
            }
            info!("Initiating graceful shutdown...");
            handle.shutdown();
            run.await
        }
    };

    let metrics = handle.metrics();
    info!(
        forwarded = metrics.txs_forwarded,
        applied = metrics.commits_applied,
        failed = metrics.execution_failures,
        "Node stopped"
    );

    match outcome.context("Replication task panicked")? {
        Ok(()) => Ok(()),
        Err(e) => {
            error!(error = %e, "Replication stopped with an error");
            Err(e.into())
        }
    }
}
