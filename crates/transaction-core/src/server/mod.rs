//! # Server Transactions
//!
//! RFC 3261 Section 17.2: the INVITE server transaction ([`invite`]) and
//! the non-INVITE server transaction ([`non_invite`]).
//!
//! A server transaction is created from the first response the application
//! wants to send and starts in Proceeding (INVITE) or Trying (non-INVITE).
//! [`ServerTransaction::start`] sends that response; later responses go
//! through [`ServerTransaction::send_response`]. The response history
//! doubles as the list of responses sent.

pub(crate) mod invite;
pub(crate) mod non_invite;

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use sipua_sip_core::{Message, Request, Response};
use sipua_sip_transport::{Transport, TransportType};

use crate::error::{Error, Result};
use crate::manager::registry::TransactionRegistry;
use crate::timer::{TimerHandle, TimerManager, TimerSettings, TimerType};
use crate::transaction::runner::{
    run_transaction_loop, AsRefKey, AsRefState, HasTransactionUser, ReleaseOnTermination,
};
use crate::transaction::{
    AtomicTransactionState, InternalTransactionCommand, Notification, ServerTransactionUser,
    TransactionKey, TransactionKind, TransactionState,
};

use self::invite::{InviteServerLogic, InviteServerTimers};
use self::non_invite::{NonInviteServerLogic, NonInviteServerTimers};

pub struct ServerTransactionData {
    pub(crate) key: TransactionKey,
    pub(crate) kind: TransactionKind,
    pub(crate) request: Request,
    /// Response handed over at creation, taken by `start()`
    pub(crate) initial_response: Mutex<Option<Response>>,
    pub(crate) responses: Mutex<Vec<Response>>,
    pub(crate) state: AtomicTransactionState,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) transport_type: TransportType,
    pub(crate) remote_addr: SocketAddr,
    pub(crate) user: Arc<dyn ServerTransactionUser>,
    pub(crate) timer_manager: Arc<TimerManager>,
    pub(crate) settings: TimerSettings,
    pub(crate) cmd_tx: mpsc::Sender<InternalTransactionCommand>,
    pub(crate) registry: Weak<TransactionRegistry>,
}

impl ServerTransactionData {
    pub(crate) fn is_reliable(&self) -> bool {
        self.transport_type.is_reliable()
    }

    /// Records `response` as sent and hands it to the transport.
    pub(crate) async fn send_and_record(&self, response: Response) -> Result<()> {
        self.responses.lock().push(response.clone());
        self.transport
            .send_message(Message::Response(response), self.remote_addr)
            .await?;
        Ok(())
    }

    /// Resends the last response, if one was sent.
    pub(crate) async fn resend_last_response(&self) -> Result<()> {
        match self.last_response() {
            Some(response) => {
                trace!(id=%self.key, status=%response.status, "Resending last response");
                self.transport
                    .send_message(Message::Response(response), self.remote_addr)
                    .await?;
            }
            None => trace!(id=%self.key, "No response sent yet, nothing to resend"),
        }
        Ok(())
    }

    pub(crate) fn last_response(&self) -> Option<Response> {
        self.responses.lock().last().cloned()
    }

    pub(crate) fn start_timer(&self, timer: TimerType, duration: Duration) -> TimerHandle {
        self.timer_manager.start_timer(self.key.clone(), timer, duration)
    }
}

impl fmt::Debug for ServerTransactionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerTransactionData")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("state", &self.state.get())
            .field("remote_addr", &self.remote_addr)
            .field("transport_type", &self.transport_type)
            .finish()
    }
}

impl AsRefState for ServerTransactionData {
    fn as_ref_state(&self) -> &AtomicTransactionState {
        &self.state
    }
}

impl AsRefKey for ServerTransactionData {
    fn as_ref_key(&self) -> &TransactionKey {
        &self.key
    }
}

#[async_trait::async_trait]
impl HasTransactionUser for ServerTransactionData {
    async fn deliver(data: Arc<Self>, notification: Notification) {
        let user = data.user.clone();
        let transaction = ServerTransaction { data };
        match notification {
            Notification::TransactionFailure => user.transaction_failure(&transaction).await,
            other => {
                debug!(id=%transaction.key(), notification=?other, "Client notification on a server transaction ignored");
            }
        }
    }
}

impl ReleaseOnTermination for ServerTransactionData {
    fn release(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_server_if_same(&self.key, self);
        }
        self.timer_manager.unregister_transaction(&self.key, &self.cmd_tx);
    }
}

/// Handle to a server transaction.
#[derive(Clone)]
pub struct ServerTransaction {
    pub(crate) data: Arc<ServerTransactionData>,
}

impl ServerTransaction {
    pub fn key(&self) -> &TransactionKey {
        &self.data.key
    }

    /// Identity string, `branch|METHOD`.
    pub fn id(&self) -> String {
        self.data.key.id()
    }

    pub fn kind(&self) -> TransactionKind {
        self.data.kind
    }

    pub fn state(&self) -> TransactionState {
        self.data.state.get()
    }

    /// The request that created the transaction.
    pub fn request(&self) -> &Request {
        &self.data.request
    }

    /// Responses sent so far, oldest first.
    pub fn responses(&self) -> Vec<Response> {
        self.data.responses.lock().clone()
    }

    pub fn last_response(&self) -> Option<Response> {
        self.data.last_response()
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.data.remote_addr
    }

    pub fn transport_type(&self) -> TransportType {
        self.data.transport_type
    }

    /// Sends the response the transaction was created with.
    pub async fn start(&self) -> Result<()> {
        let response = self.data.initial_response.lock().take().ok_or_else(|| {
            Error::InvalidStateTransition(format!("{} already started", self.data.key))
        })?;
        self.send_command(InternalTransactionCommand::SendResponse(response)).await
    }

    /// Pushes a further response down the transaction.
    pub async fn send_response(&self, response: Response) -> Result<()> {
        self.send_command(InternalTransactionCommand::SendResponse(response)).await
    }

    /// Feeds an inbound request matched to this transaction: a
    /// retransmission, or the ACK of an INVITE.
    pub async fn received_request(&self, request: Request) -> Result<()> {
        self.send_command(InternalTransactionCommand::ProcessMessage(Message::Request(request)))
            .await
    }

    /// Moves straight to Terminated without notifying the user.
    pub async fn terminate(&self) -> Result<()> {
        self.send_command(InternalTransactionCommand::Terminate).await
    }

    async fn send_command(&self, command: InternalTransactionCommand) -> Result<()> {
        self.data.cmd_tx.send(command).await.map_err(|e| {
            debug!(id=%self.data.key, command=?e.0, "Transaction task is gone");
            Error::ChannelClosed
        })
    }

    pub(crate) fn spawn(&self, cmd_rx: mpsc::Receiver<InternalTransactionCommand>) {
        let data = self.data.clone();
        match data.kind {
            TransactionKind::InviteServer => {
                tokio::spawn(run_transaction_loop::<_, InviteServerTimers, _>(
                    data,
                    Arc::new(InviteServerLogic),
                    cmd_rx,
                ));
            }
            _ => {
                tokio::spawn(run_transaction_loop::<_, NonInviteServerTimers, _>(
                    data,
                    Arc::new(NonInviteServerLogic),
                    cmd_rx,
                ));
            }
        }
    }
}

impl fmt::Debug for ServerTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.data.fmt(f)
    }
}
