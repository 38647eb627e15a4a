use std::sync::Arc;

use sipua_sip_core::{Message, Response};

use crate::error::{Error, Result};
use crate::timer::TimerType;
use crate::transaction::{TransactionKind, TransactionState};

/// What the transaction user should be told about.
#[derive(Debug, Clone)]
pub enum Notification {
    ProvisionalResponse(Response),
    SuccessResponse(Response),
    ErrorResponse(Response),
    /// Timer B/F, or a transport failure while an INVITE is Calling
    Timeout,
    /// Client side transport failure
    TransportError,
    /// Server side failure: Timer H or a transport failure
    TransactionFailure,
}

/// Result of handling one command: an optional state change and an
/// optional notification, delivered after the state change took effect.
#[derive(Debug, Default)]
pub struct Reaction {
    pub next_state: Option<TransactionState>,
    pub notification: Option<Notification>,
}

impl Reaction {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn transition(state: TransactionState) -> Self {
        Self {
            next_state: Some(state),
            notification: None,
        }
    }

    pub fn notify(mut self, notification: Notification) -> Self {
        self.notification = Some(notification);
        self
    }
}

/// State machine of one transaction kind, driven by
/// [`run_transaction_loop`](crate::transaction::runner::run_transaction_loop).
///
/// `D` is the shared transaction data, `TH` the kind-specific timer handles
/// owned by the loop.
#[async_trait::async_trait]
pub trait TransactionLogic<D, TH>: Send + Sync + 'static
where
    D: Send + Sync + 'static,
    TH: Default + Send + Sync + 'static,
{
    fn kind(&self) -> TransactionKind;

    /// Handles an inbound message routed to this transaction.
    async fn process_message(
        &self,
        data: &Arc<D>,
        message: Message,
        current_state: TransactionState,
        timer_handles: &mut TH,
    ) -> Result<Reaction>;

    /// Handles a response pushed down by a server transaction user.
    async fn send_response(
        &self,
        _data: &Arc<D>,
        response: Response,
        _current_state: TransactionState,
        _timer_handles: &mut TH,
    ) -> Result<Reaction> {
        Err(Error::Other(format!(
            "{:?} transactions do not send responses ({})",
            self.kind(),
            response.status
        )))
    }

    async fn handle_timer(
        &self,
        data: &Arc<D>,
        timer: TimerType,
        current_state: TransactionState,
        timer_handles: &mut TH,
    ) -> Result<Reaction>;

    /// Entry actions: sends and timer arming for `new_state`. An
    /// `Error::TransportError` here is treated as a transport failure in
    /// `new_state`.
    async fn on_enter_state(
        &self,
        data: &Arc<D>,
        new_state: TransactionState,
        previous_state: TransactionState,
        timer_handles: &mut TH,
    ) -> Result<()>;

    /// Reaction to a transport failure in `current_state`.
    fn on_transport_error(&self, current_state: TransactionState) -> Reaction;

    fn cancel_all_specific_timers(&self, timer_handles: &mut TH);
}
