//! Construction of a complete replication node.

use std::net::SocketAddr;

use replication_engine::{
    tx_inbox, ConstructionError, EngineDependencies, EngineError, EngineHandle, ReplicationEngine,
};
use tracing::{info, info_span};

use crate::adapters::{HttpTxService, LedgerState, SocketConsensusProxy};
use crate::container::NodeConfig;

/// The engine as wired by this runtime.
pub type NodeEngine = ReplicationEngine<SocketConsensusProxy, LedgerState, HttpTxService>;

/// A fully constructed node, ready to run.
pub struct NodeRuntime {
    engine: NodeEngine,
    handle: EngineHandle,
    api_addr: SocketAddr,
    client_addr: SocketAddr,
}

impl NodeRuntime {
    /// Build every component in dependency order.
    ///
    /// ## Initialization Order
    ///
    /// 1. Validate configuration
    /// 2. Open state storage (directory lock, journal replay)
    /// 3. Bind the transaction API
    /// 4. Bind the consensus commit listener
    /// 5. Construct the engine, which takes the commit stream
    ///
    /// Any failure drops what was already built: the lock is released and
    /// both ports are free again when this returns `Err`.
    pub async fn build(config: NodeConfig) -> Result<Self, ConstructionError> {
        config
            .validate()
            .map_err(|e| ConstructionError::Config(e.to_string()))?;

        let executor = LedgerState::open(&config.state)?;

        let (inbox_tx, inbox_rx) = tx_inbox();
        let service = HttpTxService::bind(&config.service, inbox_tx).await?;
        let api_addr = service.local_addr();

        let proxy = SocketConsensusProxy::bind(&config.consensus).await?;
        let client_addr = proxy.local_addr();

        let span = info_span!(
            "replication",
            client = %client_addr,
            proxy = %config.consensus.proxy_addr
        );

        let engine = ReplicationEngine::new(EngineDependencies {
            proxy,
            executor,
            service: Some(service),
            inbox: inbox_rx,
            config: config.engine.clone(),
            span,
        })?;
        let handle = engine.handle();

        info!(
            api = %api_addr,
            client = %client_addr,
            data_dir = %config.state.data_dir.display(),
            "Node constructed"
        );

        Ok(Self {
            engine,
            handle,
            api_addr,
            client_addr,
        })
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Address of the transaction API.
    pub fn api_addr(&self) -> SocketAddr {
        self.api_addr
    }

    /// Address consensus delivers commits to.
    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    /// Run the replication loop until shutdown.
    pub async fn run(self) -> Result<(), EngineError> {
        self.engine.run().await
    }
}
