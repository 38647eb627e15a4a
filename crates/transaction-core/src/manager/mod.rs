//! # Transaction Manager
//!
//! Creates transactions, owns the registry of live ones and routes inbound
//! traffic to them.
//!
//! ```text
//!   application (TU)
//!        |  create_*_transaction / start / send_response
//!        v
//!  TransactionManager ---- registry: (branch, method) -> transaction
//!        |                        |
//!        |  TransportEvent        |  one task per transaction
//!        v                        v
//!    Transport  <------------ sends, retransmissions, ACKs
//! ```
//!
//! Transactions are keyed by the branch of the top Via and the method
//! (the CSeq method for responses). An ACK is matched against the INVITE
//! server transaction with the same branch, except when that transaction's
//! last response was a 2xx: such an ACK belongs to the dialog, not the
//! transaction, and is reported as stray traffic.

mod handlers;
pub mod registry;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use sipua_sip_core::{
    header, HasHeaders, Message, Method, Request, Response, Via, BRANCH_MAGIC_COOKIE,
};
use sipua_sip_transport::{Transport, TransportEvent, TransportType};

use crate::client::{ClientTransaction, ClientTransactionData};
use crate::config::TransactionManagerConfig;
use crate::error::{Error, Result};
use crate::server::{ServerTransaction, ServerTransactionData};
use crate::timer::{TimerManager, TimerSettings};
use crate::transaction::{
    AtomicTransactionState, ClientTransactionUser, ServerTransactionUser, TransactionEvent,
    TransactionKey, TransactionKind,
};
use crate::utils::generate_branch;

use self::registry::TransactionRegistry;

#[derive(Clone)]
pub struct TransactionManager {
    transport: Arc<dyn Transport>,
    registry: Arc<TransactionRegistry>,
    timer_manager: Arc<TimerManager>,
    config: Arc<TransactionManagerConfig>,
    events_tx: mpsc::Sender<TransactionEvent>,
    message_loop: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl TransactionManager {
    /// Creates a manager and starts routing `transport_rx` to it.
    ///
    /// Returns the manager together with the receiver for stray traffic
    /// and transport events.
    pub async fn new(
        transport: Arc<dyn Transport>,
        transport_rx: mpsc::Receiver<TransportEvent>,
        config: Option<TransactionManagerConfig>,
    ) -> Result<(Self, mpsc::Receiver<TransactionEvent>)> {
        let (manager, events_rx) = Self::new_sync(transport, config)?;
        manager.start_message_loop(transport_rx);
        Ok((manager, events_rx))
    }

    /// Creates a manager without an inbound loop; feed it through
    /// [`handle_transport_event`](Self::handle_transport_event) or start
    /// one later with [`start_message_loop`](Self::start_message_loop).
    pub fn new_sync(
        transport: Arc<dyn Transport>,
        config: Option<TransactionManagerConfig>,
    ) -> Result<(Self, mpsc::Receiver<TransactionEvent>)> {
        let config = config.unwrap_or_default();
        if config.event_capacity == 0 || config.command_capacity == 0 {
            return Err(Error::Config("channel capacities must be non-zero".to_string()));
        }

        let (events_tx, events_rx) = mpsc::channel(config.event_capacity);
        let manager = Self {
            transport,
            registry: Arc::new(TransactionRegistry::new()),
            timer_manager: Arc::new(TimerManager::new(Some(config.timer_settings.clone()))),
            config: Arc::new(config),
            events_tx,
            message_loop: Arc::new(Mutex::new(None)),
        };
        Ok((manager, events_rx))
    }

    /// Spawns the task that reads `transport_rx`. Each event is handled by
    /// [`handle_transport_event`](Self::handle_transport_event) on its own
    /// task; a slow event consumer or a full transaction queue stalls only
    /// that event. A loop started earlier is stopped.
    pub fn start_message_loop(&self, mut transport_rx: mpsc::Receiver<TransportEvent>) {
        let manager = self.clone();
        let handle = tokio::spawn(async move {
            debug!("Transaction message loop started");
            while let Some(event) = transport_rx.recv().await {
                let manager = manager.clone();
                tokio::spawn(async move {
                    manager.handle_transport_event(event).await;
                });
            }
            debug!("Transport channel closed, transaction message loop exiting");
        });

        if let Some(previous) = self.message_loop.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Creates a client transaction for `request` without sending it.
    ///
    /// A top Via carrying the transaction's branch is inserted unless the
    /// request's top Via already carries it. `branch_hint` is used when it
    /// starts with the RFC 3261 magic cookie; otherwise a fresh branch is
    /// generated. Call [`ClientTransaction::start`] to send.
    pub async fn create_client_transaction(
        &self,
        mut request: Request,
        destination: SocketAddr,
        transport_type: TransportType,
        branch_hint: Option<&str>,
        user: Arc<dyn ClientTransactionUser>,
    ) -> Result<ClientTransaction> {
        if request.method == Method::Ack {
            return Err(Error::UnsupportedMethod(Method::Ack));
        }

        let branch = match branch_hint {
            Some(hint) if hint.starts_with(BRANCH_MAGIC_COOKIE) => hint.to_string(),
            _ => generate_branch(),
        };

        if request.branch().as_deref() != Some(branch.as_str()) {
            let local = self.transport.local_addr()?;
            let via = Via::new(transport_type.as_str(), via_host(local.ip()), Some(local.port()))
                .with_branch(branch.clone());
            request.push_top_via(&via);
        }

        if let Some(proxy) = &self.config.outbound_proxy {
            if !request.has_header(header::ROUTE) {
                request.push_header(header::ROUTE, format!("<{};lr>", proxy));
            }
        }

        let key = TransactionKey::new(branch, request.method.clone(), false);
        let kind = TransactionKind::client_for(&request.method);
        let (cmd_tx, cmd_rx) = mpsc::channel(self.config.command_capacity);

        let transaction = ClientTransaction {
            data: Arc::new(ClientTransactionData {
                key: key.clone(),
                kind,
                request,
                responses: Mutex::new(Vec::new()),
                state: AtomicTransactionState::new(kind.initial_state()),
                transport: self.transport.clone(),
                transport_type,
                remote_addr: destination,
                user,
                timer_manager: self.timer_manager.clone(),
                settings: self.config.timer_settings.clone(),
                retransmissions: Default::default(),
                ack: Mutex::new(None),
                cmd_tx: cmd_tx.clone(),
                registry: Arc::downgrade(&self.registry),
            }),
        };

        self.registry.insert_client(transaction.clone())?;
        self.timer_manager.register_transaction(key.clone(), cmd_tx);
        transaction.spawn(cmd_rx);

        info!(id=%key, ?kind, %destination, "Created client transaction");
        Ok(transaction)
    }

    /// Creates a server transaction for `request`, to be answered first
    /// with `response` once [`ServerTransaction::start`] is called.
    ///
    /// The key comes from the response: the branch of its top Via and the
    /// method of its CSeq (the request method when CSeq is absent).
    pub async fn create_server_transaction(
        &self,
        response: Response,
        remote: SocketAddr,
        transport_type: TransportType,
        user: Arc<dyn ServerTransactionUser>,
        request: Request,
    ) -> Result<ServerTransaction> {
        let branch = response.branch().ok_or(Error::MissingHeader(header::VIA))?;
        let method = response
            .cseq()
            .map(|cseq| cseq.method)
            .unwrap_or_else(|| request.method.clone());
        if method == Method::Ack {
            return Err(Error::UnsupportedMethod(Method::Ack));
        }

        let key = TransactionKey::new(branch, method.clone(), true);
        let kind = TransactionKind::server_for(&method);
        let (cmd_tx, cmd_rx) = mpsc::channel(self.config.command_capacity);

        let transaction = ServerTransaction {
            data: Arc::new(ServerTransactionData {
                key: key.clone(),
                kind,
                request,
                initial_response: Mutex::new(Some(response)),
                responses: Mutex::new(Vec::new()),
                state: AtomicTransactionState::new(kind.initial_state()),
                transport: self.transport.clone(),
                transport_type,
                remote_addr: remote,
                user,
                timer_manager: self.timer_manager.clone(),
                settings: self.config.timer_settings.clone(),
                cmd_tx: cmd_tx.clone(),
                registry: Arc::downgrade(&self.registry),
            }),
        };

        self.registry.insert_server(transaction.clone())?;
        self.timer_manager.register_transaction(key.clone(), cmd_tx);
        transaction.spawn(cmd_rx);

        info!(id=%key, ?kind, %remote, "Created server transaction");
        Ok(transaction)
    }

    /// Client transaction a response belongs to.
    pub fn get_client_transaction(&self, response: &Response) -> Option<ClientTransaction> {
        match TransactionKey::from_response(response) {
            Some(key) => self.registry.client(&key),
            None => {
                warn!(status=%response.status, "Response without Via branch or CSeq, cannot match a transaction");
                None
            }
        }
    }

    /// Server transaction a message belongs to. An ACK maps to its INVITE
    /// transaction unless that transaction answered with a 2xx.
    pub fn get_server_transaction(&self, message: &Message) -> Option<ServerTransaction> {
        let key = match message {
            Message::Request(request) => TransactionKey::from_request(request),
            Message::Response(response) => response
                .branch()
                .zip(message.method())
                .map(|(branch, method)| TransactionKey::new(branch, method, true)),
        };
        self.server_transaction_for(key)
    }

    pub fn get_server_transaction_by_key(&self, branch: &str, method: &Method) -> Option<ServerTransaction> {
        self.registry
            .server(&TransactionKey::new(branch, method.clone(), true))
    }

    /// Live client transactions whose request carries `call_id` and `method`.
    pub fn get_client_transactions_from_call_id(
        &self,
        call_id: &str,
        method: &Method,
    ) -> Vec<ClientTransaction> {
        self.registry
            .clients()
            .into_iter()
            .filter(|tx| tx.key().method() == method && tx.call_id() == Some(call_id))
            .collect()
    }

    fn server_transaction_for(&self, key: Option<TransactionKey>) -> Option<ServerTransaction> {
        let Some(key) = key else {
            warn!("Message without Via branch or method, cannot match a transaction");
            return None;
        };

        if key.method == Method::Ack {
            let invite = self.registry.server(&key.with_method(Method::Invite))?;
            let answered_2xx = invite
                .last_response()
                .map_or(false, |response| response.status.is_success());
            return if answered_2xx { None } else { Some(invite) };
        }

        self.registry.server(&key)
    }

    pub fn client_transaction_count(&self) -> usize {
        self.registry.client_count()
    }

    pub fn server_transaction_count(&self) -> usize {
        self.registry.server_count()
    }

    /// Keys of the live (client, server) transactions.
    pub fn active_transactions(&self) -> (Vec<TransactionKey>, Vec<TransactionKey>) {
        let clients = self.registry.clients().iter().map(|tx| tx.key().clone()).collect();
        let servers = self.registry.servers().iter().map(|tx| tx.key().clone()).collect();
        (clients, servers)
    }

    /// Forces a transaction to Terminated without notifying its user.
    pub async fn terminate_transaction(&self, key: &TransactionKey) -> Result<()> {
        if key.is_server() {
            match self.registry.server(key) {
                Some(tx) => tx.terminate().await,
                None => Err(Error::TransactionNotFound(key.clone())),
            }
        } else {
            match self.registry.client(key) {
                Some(tx) => tx.terminate().await,
                None => Err(Error::TransactionNotFound(key.clone())),
            }
        }
    }

    pub fn timer_settings(&self) -> &TimerSettings {
        &self.config.timer_settings
    }

    pub fn config(&self) -> &TransactionManagerConfig {
        &self.config
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    /// Stops the inbound loop and terminates every live transaction.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.message_loop.lock().take() {
            handle.abort();
        }
        for tx in self.registry.clients() {
            let _ = tx.terminate().await;
        }
        for tx in self.registry.servers() {
            let _ = tx.terminate().await;
        }
        debug!("Transaction manager shut down");
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("transport", &self.transport)
            .field("client_transactions", &self.registry.client_count())
            .field("server_transactions", &self.registry.server_count())
            .finish()
    }
}

/// Host part for a Via sent-by; IPv6 addresses are bracketed.
fn via_host(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{}]", v6),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use sipua_sip_core::{RequestBuilder, ResponseBuilder, StatusCode};

    use crate::transaction::ChannelTransactionUser;

    #[derive(Debug)]
    struct DiscardTransport;

    #[async_trait::async_trait]
    impl Transport for DiscardTransport {
        fn local_addr(&self) -> sipua_sip_transport::Result<SocketAddr> {
            Ok(SocketAddr::from(([127, 0, 0, 1], 5060)))
        }

        async fn send_message(&self, _message: Message, _destination: SocketAddr) -> sipua_sip_transport::Result<()> {
            Ok(())
        }

        async fn send_raw(&self, _data: Bytes, _destination: SocketAddr) -> sipua_sip_transport::Result<()> {
            Ok(())
        }

        async fn close(&self) -> sipua_sip_transport::Result<()> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            false
        }
    }

    fn request(method: Method, branch: &str) -> Request {
        RequestBuilder::new(method, "sip:alice@127.0.0.1:5060")
            .via(&Via::new("UDP", "127.0.0.1", Some(5070)).with_branch(branch))
            .from("Bob <sip:bob@example.com>;tag=a6c85cf")
            .to("Alice <sip:alice@example.com>")
            .call_id("ack-lookup")
            .cseq(1)
            .build()
    }

    async fn invite_server(manager: &TransactionManager, branch: &str) -> ServerTransaction {
        let invite = request(Method::Invite, branch);
        let (user, _events) = ChannelTransactionUser::channel(4);
        manager
            .create_server_transaction(
                ResponseBuilder::from_request(&invite, StatusCode::Ringing).build(),
                SocketAddr::from(([127, 0, 0, 1], 5070)),
                TransportType::Udp,
                Arc::new(user),
                invite,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_ack_after_2xx_is_not_matched_to_live_invite() {
        let (manager, _events) = TransactionManager::new_sync(Arc::new(DiscardTransport), None).unwrap();
        let tx = invite_server(&manager, "z9hG4bK-acked").await;

        let ok = ResponseBuilder::from_request(tx.request(), StatusCode::Ok).build();
        tx.data.responses.lock().push(ok);
        assert!(manager.get_server_transaction_by_key("z9hG4bK-acked", &Method::Invite).is_some());

        let ack = Message::Request(request(Method::Ack, "z9hG4bK-acked"));
        assert!(manager.get_server_transaction(&ack).is_none());
    }

    #[tokio::test]
    async fn test_ack_after_error_matches_invite() {
        let (manager, _events) = TransactionManager::new_sync(Arc::new(DiscardTransport), None).unwrap();
        let tx = invite_server(&manager, "z9hG4bK-rejected").await;

        let busy = ResponseBuilder::from_request(tx.request(), StatusCode::BusyHere).build();
        tx.data.responses.lock().push(busy);

        let ack = Message::Request(request(Method::Ack, "z9hG4bK-rejected"));
        let matched = manager.get_server_transaction(&ack).unwrap();
        assert_eq!(matched.key(), tx.key());
    }
}
