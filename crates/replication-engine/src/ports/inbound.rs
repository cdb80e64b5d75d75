//! Driving port: the transaction inbox.
//!
//! Unbounded and FIFO. The application service holds the sender; the engine
//! is the only receiver.

use shared_types::Transaction;
use tokio::sync::mpsc;

/// Producer side of the inbox, cloned into the application service.
pub type TxSender = mpsc::UnboundedSender<Transaction>;

/// Consumer side of the inbox, owned by the engine.
pub type TxReceiver = mpsc::UnboundedReceiver<Transaction>;

/// Create a transaction inbox.
pub fn tx_inbox() -> (TxSender, TxReceiver) {
    mpsc::unbounded_channel()
}
