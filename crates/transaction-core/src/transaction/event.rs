//! Channel-based transaction user.
//!
//! Applications that prefer consuming a stream over implementing the
//! callback traits hand a [`ChannelTransactionUser`] to the manager and
//! read [`TransactionEvent`]s. The manager's own event channel carries the
//! same type for traffic that matched no transaction.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use sipua_sip_core::{Request, Response};

use crate::client::ClientTransaction;
use crate::server::ServerTransaction;
use crate::transaction::key::TransactionKey;
use crate::transaction::user::{ClientTransactionUser, ServerTransactionUser};

#[derive(Debug, Clone)]
pub enum TransactionEvent {
    ProvisionalResponse {
        transaction_id: TransactionKey,
        response: Response,
    },
    SuccessResponse {
        transaction_id: TransactionKey,
        response: Response,
    },
    /// `transaction_id` is derived from the response and absent when its
    /// Via or CSeq is unusable.
    ErrorResponse {
        transaction_id: Option<TransactionKey>,
        response: Response,
    },
    TransactionTimeout {
        transaction_id: TransactionKey,
    },
    TransportError,
    ServerTransactionFailure {
        transaction_id: TransactionKey,
    },

    /// A request that matched no server transaction: a new request for the
    /// application, or an ACK for a 2xx.
    StrayRequest {
        request: Request,
        source: SocketAddr,
    },
    /// A response that matched no client transaction, such as a 2xx
    /// retransmission after the INVITE transaction ended.
    StrayResponse {
        response: Response,
        source: SocketAddr,
    },
    /// The transport reported a receive or parse error.
    TransportFailure {
        error: String,
    },
    TransportClosed,
}

/// Forwards every callback as a [`TransactionEvent`].
#[derive(Debug, Clone)]
pub struct ChannelTransactionUser {
    events_tx: mpsc::Sender<TransactionEvent>,
}

impl ChannelTransactionUser {
    pub fn new(events_tx: mpsc::Sender<TransactionEvent>) -> Self {
        Self { events_tx }
    }

    /// Creates a user together with the receiving end of its channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TransactionEvent>) {
        let (events_tx, events_rx) = mpsc::channel(capacity);
        (Self { events_tx }, events_rx)
    }

    async fn emit(&self, event: TransactionEvent) {
        if let Err(e) = self.events_tx.send(event).await {
            debug!(event=?e.0, "Transaction event dropped, receiver closed");
        }
    }
}

#[async_trait]
impl ClientTransactionUser for ChannelTransactionUser {
    async fn transaction_timeout(&self, transaction: &ClientTransaction) {
        self.emit(TransactionEvent::TransactionTimeout {
            transaction_id: transaction.key().clone(),
        })
        .await;
    }

    async fn provisional_response_received(&self, response: &Response, transaction: &ClientTransaction) {
        self.emit(TransactionEvent::ProvisionalResponse {
            transaction_id: transaction.key().clone(),
            response: response.clone(),
        })
        .await;
    }

    async fn success_response_received(&self, response: &Response, transaction: &ClientTransaction) {
        self.emit(TransactionEvent::SuccessResponse {
            transaction_id: transaction.key().clone(),
            response: response.clone(),
        })
        .await;
    }

    async fn error_response_received(&self, response: &Response) {
        self.emit(TransactionEvent::ErrorResponse {
            transaction_id: TransactionKey::from_response(response),
            response: response.clone(),
        })
        .await;
    }

    async fn transport_error(&self) {
        self.emit(TransactionEvent::TransportError).await;
    }
}

#[async_trait]
impl ServerTransactionUser for ChannelTransactionUser {
    async fn transaction_failure(&self, transaction: &ServerTransaction) {
        self.emit(TransactionEvent::ServerTransactionFailure {
            transaction_id: transaction.key().clone(),
        })
        .await;
    }
}
