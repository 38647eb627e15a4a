//! Inbound dispatch: routes transport events to transactions.

use std::net::SocketAddr;

use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace, warn};

use sipua_sip_core::{HasHeaders, Message, Request, Response};
use sipua_sip_transport::TransportEvent;

use super::TransactionManager;
use crate::transaction::{TransactionEvent, TransactionKey};

/// Stamps `received` and `rport` on the top Via of an inbound request
/// (RFC 3261 Section 18.2.1, RFC 3581).
///
/// `received` is added when the sent-by host differs from the packet's
/// source address, or when the client asked for rport. An empty `rport` is
/// filled in with the source port.
pub(crate) fn stamp_via_received(request: &mut Request, source: SocketAddr) {
    let Some(mut via) = request.top_via() else {
        return;
    };

    let source_ip = source.ip().to_string();
    let host = via.host.trim_start_matches('[').trim_end_matches(']');
    let wants_rport = via.has_param("rport");
    let mut changed = false;

    if host != source_ip || wants_rport {
        via.set_param("received", Some(source_ip));
        changed = true;
    }
    if via.rport() == Some(None) {
        via.set_param("rport", Some(source.port().to_string()));
        changed = true;
    }

    if changed {
        if let Err(e) = request.replace_top_via(&via) {
            warn!(error=%e, "Could not rewrite top Via");
        }
    }
}

impl TransactionManager {
    /// Handles one event from the transport.
    ///
    /// Requests go to their server transaction, responses to their client
    /// transaction. Anything that matches no live transaction is forwarded
    /// on the manager's event channel as stray traffic.
    pub async fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::MessageReceived { message, source, .. } => match message {
                Message::Request(mut request) => {
                    stamp_via_received(&mut request, source);
                    self.dispatch_request(request, source).await;
                }
                Message::Response(response) => self.dispatch_response(response, source).await,
            },
            TransportEvent::Error { error } => {
                warn!(%error, "Transport reported an error");
                self.emit(TransactionEvent::TransportFailure { error });
            }
            TransportEvent::Closed => {
                debug!("Transport closed");
                self.emit(TransactionEvent::TransportClosed);
            }
        }
    }

    async fn dispatch_request(&self, request: Request, source: SocketAddr) {
        let Some(transaction) = self.server_transaction_for(TransactionKey::from_request(&request)) else {
            trace!(method=%request.method, %source, "No server transaction, forwarding request");
            self.emit(TransactionEvent::StrayRequest { request, source });
            return;
        };

        if transaction.received_request(request.clone()).await.is_err() {
            self.emit(TransactionEvent::StrayRequest { request, source });
        }
    }

    async fn dispatch_response(&self, response: Response, source: SocketAddr) {
        let Some(transaction) = self.get_client_transaction(&response) else {
            trace!(status=%response.status, %source, "No client transaction, forwarding response");
            self.emit(TransactionEvent::StrayResponse { response, source });
            return;
        };

        if transaction.received_response(response.clone()).await.is_err() {
            self.emit(TransactionEvent::StrayResponse { response, source });
        }
    }

    /// Queues a manager event without waiting. A full channel drops the
    /// event.
    pub(crate) fn emit(&self, event: TransactionEvent) {
        match self.events_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(?event, "Manager event channel full, dropping event");
            }
            Err(TrySendError::Closed(event)) => {
                debug!(?event, "Manager event dropped, receiver closed");
            }
        }
    }
}
