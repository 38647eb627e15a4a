//! # Client Transactions
//!
//! RFC 3261 Section 17.1: the INVITE client transaction ([`invite`]) and the
//! non-INVITE client transaction ([`non_invite`]). Both share
//! [`ClientTransactionData`]; the state machine differs per kind.
//!
//! A [`ClientTransaction`] is a cheap handle. The transaction itself runs on
//! its own task and is driven through the handle's methods, which only
//! enqueue commands.

pub(crate) mod invite;
pub(crate) mod non_invite;

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use sipua_sip_core::{HasHeaders, Message, Request, Response};
use sipua_sip_transport::{Transport, TransportType};

use crate::error::{Error, Result};
use crate::manager::registry::TransactionRegistry;
use crate::timer::{TimerHandle, TimerManager, TimerSettings, TimerType};
use crate::transaction::runner::{
    run_transaction_loop, AsRefKey, AsRefState, HasTransactionUser, ReleaseOnTermination,
};
use crate::transaction::{
    AtomicTransactionState, ClientTransactionUser, InternalTransactionCommand, Notification,
    TransactionKey, TransactionKind, TransactionState,
};

use self::invite::{InviteClientLogic, InviteClientTimers};
use self::non_invite::{NonInviteClientLogic, NonInviteClientTimers};

/// Everything a client transaction shares between its handle and its task.
pub struct ClientTransactionData {
    pub(crate) key: TransactionKey,
    pub(crate) kind: TransactionKind,
    pub(crate) request: Request,
    pub(crate) responses: Mutex<Vec<Response>>,
    pub(crate) state: AtomicTransactionState,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) transport_type: TransportType,
    pub(crate) remote_addr: SocketAddr,
    pub(crate) user: Arc<dyn ClientTransactionUser>,
    pub(crate) timer_manager: Arc<TimerManager>,
    pub(crate) settings: TimerSettings,
    pub(crate) retransmissions: AtomicU32,
    pub(crate) ack: Mutex<Option<Request>>,
    pub(crate) cmd_tx: mpsc::Sender<InternalTransactionCommand>,
    pub(crate) registry: Weak<TransactionRegistry>,
}

impl ClientTransactionData {
    pub(crate) fn is_reliable(&self) -> bool {
        self.transport_type.is_reliable()
    }

    pub(crate) async fn send_request(&self) -> Result<()> {
        self.transport
            .send_message(Message::Request(self.request.clone()), self.remote_addr)
            .await?;
        Ok(())
    }

    pub(crate) async fn send_ack(&self, ack: Request) -> Result<()> {
        self.transport
            .send_message(Message::Request(ack), self.remote_addr)
            .await?;
        Ok(())
    }

    pub(crate) fn record_response(&self, response: Response) {
        self.responses.lock().push(response);
    }

    pub(crate) fn last_response(&self) -> Option<Response> {
        self.responses.lock().last().cloned()
    }

    pub(crate) fn cached_ack(&self) -> Option<Request> {
        self.ack.lock().clone()
    }

    pub(crate) fn start_timer(&self, timer: TimerType, duration: Duration) -> TimerHandle {
        self.timer_manager.start_timer(self.key.clone(), timer, duration)
    }
}

impl fmt::Debug for ClientTransactionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientTransactionData")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("state", &self.state.get())
            .field("remote_addr", &self.remote_addr)
            .field("transport_type", &self.transport_type)
            .finish()
    }
}

impl AsRefState for ClientTransactionData {
    fn as_ref_state(&self) -> &AtomicTransactionState {
        &self.state
    }
}

impl AsRefKey for ClientTransactionData {
    fn as_ref_key(&self) -> &TransactionKey {
        &self.key
    }
}

#[async_trait::async_trait]
impl HasTransactionUser for ClientTransactionData {
    async fn deliver(data: Arc<Self>, notification: Notification) {
        let user = data.user.clone();
        let transaction = ClientTransaction { data };
        match notification {
            Notification::ProvisionalResponse(response) => {
                user.provisional_response_received(&response, &transaction).await
            }
            Notification::SuccessResponse(response) => {
                user.success_response_received(&response, &transaction).await
            }
            Notification::ErrorResponse(response) => user.error_response_received(&response).await,
            Notification::Timeout => user.transaction_timeout(&transaction).await,
            Notification::TransportError => user.transport_error().await,
            Notification::TransactionFailure => {
                warn!(id=%transaction.key(), "Server notification on a client transaction ignored");
            }
        }
    }
}

impl ReleaseOnTermination for ClientTransactionData {
    fn release(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_client_if_same(&self.key, self);
        }
        self.timer_manager.unregister_transaction(&self.key, &self.cmd_tx);
    }
}

/// Handle to a client transaction.
#[derive(Clone)]
pub struct ClientTransaction {
    pub(crate) data: Arc<ClientTransactionData>,
}

impl ClientTransaction {
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

    pub fn request(&self) -> &Request {
        &self.data.request
    }

    /// Every response received so far, in arrival order.
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

    /// Number of request retransmissions (Timer A or E firings that resent).
    pub fn retransmission_count(&self) -> u32 {
        self.data.retransmissions.load(Ordering::Relaxed)
    }

    /// The ACK generated for a 3xx-6xx final response, if any.
    pub fn ack(&self) -> Option<Request> {
        self.data.cached_ack()
    }

    pub fn call_id(&self) -> Option<&str> {
        self.data.request.call_id()
    }

    /// Sends the request and arms the retransmission and timeout timers.
    pub async fn start(&self) -> Result<()> {
        let current = self.state();
        if current != TransactionState::Initial {
            return Err(Error::InvalidStateTransition(format!(
                "{} cannot start from {:?}",
                self.data.key, current
            )));
        }
        let target = match self.data.kind {
            TransactionKind::InviteClient => TransactionState::Calling,
            _ => TransactionState::Trying,
        };
        self.send_command(InternalTransactionCommand::TransitionTo(target)).await
    }

    /// Feeds a response matched to this transaction.
    pub async fn received_response(&self, response: Response) -> Result<()> {
        self.send_command(InternalTransactionCommand::ProcessMessage(Message::Response(response)))
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
            TransactionKind::InviteClient => {
                tokio::spawn(run_transaction_loop::<_, InviteClientTimers, _>(
                    data,
                    Arc::new(InviteClientLogic),
                    cmd_rx,
                ));
            }
            _ => {
                tokio::spawn(run_transaction_loop::<_, NonInviteClientTimers, _>(
                    data,
                    Arc::new(NonInviteClientLogic),
                    cmd_rx,
                ));
            }
        }
    }
}

impl fmt::Debug for ClientTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.data.fmt(f)
    }
}
