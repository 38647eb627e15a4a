//! Non-INVITE server transaction, RFC 3261 Section 17.2.2.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use sipua_sip_core::{Message, Response};

use super::ServerTransactionData;
use crate::error::Result;
use crate::timer::{cancel_timer, TimerHandle, TimerType};
use crate::transaction::{Notification, Reaction, TransactionKind, TransactionLogic, TransactionState};

#[derive(Default, Debug)]
pub(crate) struct NonInviteServerTimers {
    timer_j: Option<TimerHandle>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct NonInviteServerLogic;

#[async_trait]
impl TransactionLogic<ServerTransactionData, NonInviteServerTimers> for NonInviteServerLogic {
    fn kind(&self) -> TransactionKind {
        TransactionKind::NonInviteServer
    }

    async fn process_message(
        &self,
        data: &Arc<ServerTransactionData>,
        message: Message,
        current_state: TransactionState,
        _timer_handles: &mut NonInviteServerTimers,
    ) -> Result<Reaction> {
        if let Message::Response(response) = &message {
            warn!(id=%data.key, status=%response.status, "Response routed to non-INVITE server transaction, ignoring");
            return Ok(Reaction::none());
        }

        match current_state {
            TransactionState::Proceeding | TransactionState::Completed => {
                debug!(id=%data.key, state=?current_state, "Request retransmission");
                data.resend_last_response().await?;
            }
            _ => trace!(id=%data.key, state=?current_state, "Request retransmission absorbed"),
        }
        Ok(Reaction::none())
    }

    async fn send_response(
        &self,
        data: &Arc<ServerTransactionData>,
        response: Response,
        current_state: TransactionState,
        _timer_handles: &mut NonInviteServerTimers,
    ) -> Result<Reaction> {
        if !matches!(current_state, TransactionState::Trying | TransactionState::Proceeding) {
            warn!(id=%data.key, state=?current_state, status=%response.status, "Cannot send response in this state, dropping");
            return Ok(Reaction::none());
        }
        if !response.status.is_valid() {
            warn!(id=%data.key, status=response.status_code(), "Refusing to send out-of-range status code");
            return Ok(Reaction::none());
        }

        let status = response.status;
        data.send_and_record(response).await?;

        if status.is_provisional() {
            Ok(Reaction::transition(TransactionState::Proceeding))
        } else {
            Ok(Reaction::transition(TransactionState::Completed))
        }
    }

    async fn handle_timer(
        &self,
        data: &Arc<ServerTransactionData>,
        timer: TimerType,
        current_state: TransactionState,
        _timer_handles: &mut NonInviteServerTimers,
    ) -> Result<Reaction> {
        match (timer, current_state) {
            (TimerType::J, TransactionState::Completed) => {
                Ok(Reaction::transition(TransactionState::Terminated))
            }
            _ => {
                trace!(id=%data.key, %timer, state=?current_state, "Stale timer ignored");
                Ok(Reaction::none())
            }
        }
    }

    async fn on_enter_state(
        &self,
        data: &Arc<ServerTransactionData>,
        new_state: TransactionState,
        _previous_state: TransactionState,
        timer_handles: &mut NonInviteServerTimers,
    ) -> Result<()> {
        match new_state {
            TransactionState::Completed => {
                timer_handles.timer_j =
                    Some(data.start_timer(TimerType::J, data.settings.timer_j(data.is_reliable())));
            }
            TransactionState::Terminated => self.cancel_all_specific_timers(timer_handles),
            _ => {}
        }
        Ok(())
    }

    fn on_transport_error(&self, current_state: TransactionState) -> Reaction {
        match current_state {
            TransactionState::Terminated => Reaction::none(),
            _ => Reaction::transition(TransactionState::Terminated).notify(Notification::TransactionFailure),
        }
    }

    fn cancel_all_specific_timers(&self, timer_handles: &mut NonInviteServerTimers) {
        cancel_timer(&mut timer_handles.timer_j);
    }
}
