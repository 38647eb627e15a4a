//! Callback interfaces of the layer above the transactions.
//!
//! Callbacks run on the transaction's own task, after the state change
//! they report has taken effect. Calling back into the transaction from a
//! callback is fine; awaiting the transaction's termination is not.

use async_trait::async_trait;

use sipua_sip_core::Response;

use crate::client::ClientTransaction;
use crate::server::ServerTransaction;

#[async_trait]
pub trait ClientTransactionUser: Send + Sync {
    /// Timer B/F fired, or the request could not be sent while Calling.
    async fn transaction_timeout(&self, transaction: &ClientTransaction);

    /// Every 1xx, including repeats.
    async fn provisional_response_received(&self, response: &Response, transaction: &ClientTransaction);

    /// The 2xx that ended the transaction.
    async fn success_response_received(&self, response: &Response, transaction: &ClientTransaction);

    /// The first 3xx-6xx final response; retransmissions are not reported.
    async fn error_response_received(&self, response: &Response);

    async fn transport_error(&self);
}

#[async_trait]
pub trait ServerTransactionUser: Send + Sync {
    /// Timer H fired without an ACK, or the transport failed.
    async fn transaction_failure(&self, transaction: &ServerTransaction);
}
