//! # HTTP Transaction Service
//!
//! The application service: accepts raw transactions over HTTP and feeds them
//! into the replication engine's inbox.
//!
//! ## Routes
//!
//! | Method | Path      | Body            | Reply                          |
//! |--------|-----------|-----------------|--------------------------------|
//! | POST   | `/tx`     | hex (opt. `0x`) | 202 `{"tx_hash":"0x.."}`       |
//! | GET    | `/health` | -               | 200 `{"status":"ok"}`          |
//!
//! A body that is not hex gets 400. Once the engine has stopped, the inbox is
//! closed and submissions get 503.

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use replication_engine::{ApplicationService, ConstructionError, ServiceError, TxSender};
use shared_types::{decode_hex, Transaction};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::container::ServiceConfig;

/// HTTP front-end feeding the transaction inbox.
pub struct HttpTxService {
    listener: TcpListener,
    local_addr: SocketAddr,
    inbox: TxSender,
}

impl HttpTxService {
    /// Bind the listener now so a taken port fails construction, not `run`.
    pub async fn bind(config: &ServiceConfig, inbox: TxSender) -> Result<Self, ConstructionError> {
        let bind_err = |e: std::io::Error| ConstructionError::ServiceBind {
            addr: config.api_addr.clone(),
            reason: e.to_string(),
        };

        let listener = TcpListener::bind(&config.api_addr)
            .await
            .map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        info!(addr = %local_addr, "Transaction API bound");

        Ok(Self {
            listener,
            local_addr,
            inbox,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Router serving this service's routes.
    pub fn router(&self) -> Router {
        router(self.inbox.clone())
    }
}

#[async_trait]
impl ApplicationService for HttpTxService {
    async fn run(self) -> Result<(), ServiceError> {
        let router = router(self.inbox);
        info!(addr = %self.local_addr, "Transaction API serving");
        axum::serve(self.listener, router).await?;
        Ok(())
    }
}

fn router(inbox: TxSender) -> Router {
    Router::new()
        .route("/tx", post(submit_tx))
        .route("/health", get(health_check))
        .with_state(inbox)
}

async fn submit_tx(State(inbox): State<TxSender>, body: String) -> impl IntoResponse {
    let bytes = match decode_hex(body.trim()) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "Rejecting malformed transaction");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": e.to_string() })),
            );
        }
    };

    let tx = Transaction::new(bytes);
    let tx_hash = format!("0x{}", hex::encode(tx.hash()));

    if inbox.send(tx).is_err() {
        warn!(%tx_hash, "Inbox closed, refusing transaction");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "replication engine stopped" })),
        );
    }

    debug!(%tx_hash, "Transaction queued");
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "tx_hash": tx_hash })),
    )
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
