//! Non-INVITE client transaction, RFC 3261 Section 17.1.2.
//!
//! Timer E retransmits the request on unreliable transports, doubling from
//! T1 up to T2 while Trying and fixed at T2 once Proceeding. Timer F bounds
//! the whole exchange; Timer K absorbs response retransmissions after the
//! final response.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use sipua_sip_core::Message;

use super::ClientTransactionData;
use crate::error::{Error, Result};
use crate::timer::{cancel_timer, TimerHandle, TimerType};
use crate::transaction::{Notification, Reaction, TransactionKind, TransactionLogic, TransactionState};

#[derive(Default, Debug)]
pub(crate) struct NonInviteClientTimers {
    timer_e: Option<TimerHandle>,
    timer_f: Option<TimerHandle>,
    timer_k: Option<TimerHandle>,
    /// Interval the pending Timer E was armed with
    e_interval: Duration,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct NonInviteClientLogic;

#[async_trait]
impl TransactionLogic<ClientTransactionData, NonInviteClientTimers> for NonInviteClientLogic {
    fn kind(&self) -> TransactionKind {
        TransactionKind::NonInviteClient
    }

    async fn process_message(
        &self,
        data: &Arc<ClientTransactionData>,
        message: Message,
        current_state: TransactionState,
        _timer_handles: &mut NonInviteClientTimers,
    ) -> Result<Reaction> {
        let response = match message {
            Message::Response(response) => response,
            Message::Request(request) => {
                warn!(id=%data.key, method=%request.method, "Request routed to non-INVITE client transaction, ignoring");
                return Ok(Reaction::none());
            }
        };

        if !response.status.is_valid() {
            let violation = Error::ProtocolViolation(format!("status code {} out of range", response.status_code()));
            warn!(id=%data.key, error=%violation, "Dropping response");
            return Ok(Reaction::none());
        }

        match current_state {
            TransactionState::Trying | TransactionState::Proceeding => {
                data.record_response(response.clone());
                let status = response.status;
                if status.is_provisional() {
                    Ok(Reaction::transition(TransactionState::Proceeding)
                        .notify(Notification::ProvisionalResponse(response)))
                } else if status.is_success() {
                    Ok(Reaction::transition(TransactionState::Completed)
                        .notify(Notification::SuccessResponse(response)))
                } else {
                    Ok(Reaction::transition(TransactionState::Completed)
                        .notify(Notification::ErrorResponse(response)))
                }
            }
            _ => {
                trace!(id=%data.key, state=?current_state, status=%response.status, "Response absorbed");
                Ok(Reaction::none())
            }
        }
    }

    async fn handle_timer(
        &self,
        data: &Arc<ClientTransactionData>,
        timer: TimerType,
        current_state: TransactionState,
        timer_handles: &mut NonInviteClientTimers,
    ) -> Result<Reaction> {
        match (timer, current_state) {
            (TimerType::E, TransactionState::Trying | TransactionState::Proceeding) => {
                let sent = data.retransmissions.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(id=%data.key, retransmission=sent, state=?current_state, "Timer E fired, retransmitting request");
                data.send_request().await?;
                let interval = if current_state == TransactionState::Trying {
                    data.settings.next_backoff_interval(timer_handles.e_interval)
                } else {
                    data.settings.t2
                };
                timer_handles.e_interval = interval;
                timer_handles.timer_e = Some(data.start_timer(TimerType::E, interval));
                Ok(Reaction::none())
            }
            (TimerType::F, TransactionState::Trying | TransactionState::Proceeding) => {
                debug!(id=%data.key, "Timer F fired, request timed out");
                Ok(Reaction::transition(TransactionState::Terminated).notify(Notification::Timeout))
            }
            (TimerType::K, TransactionState::Completed) => {
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
        data: &Arc<ClientTransactionData>,
        new_state: TransactionState,
        _previous_state: TransactionState,
        timer_handles: &mut NonInviteClientTimers,
    ) -> Result<()> {
        match new_state {
            TransactionState::Trying => {
                if !data.is_reliable() {
                    timer_handles.e_interval = data.settings.t1;
                    timer_handles.timer_e = Some(data.start_timer(TimerType::E, data.settings.t1));
                }
                timer_handles.timer_f =
                    Some(data.start_timer(TimerType::F, data.settings.transaction_timeout));
                data.send_request().await?;
            }
            TransactionState::Completed => {
                cancel_timer(&mut timer_handles.timer_e);
                cancel_timer(&mut timer_handles.timer_f);
                timer_handles.timer_k =
                    Some(data.start_timer(TimerType::K, data.settings.timer_k(data.is_reliable())));
            }
            TransactionState::Terminated => self.cancel_all_specific_timers(timer_handles),
            _ => {}
        }
        Ok(())
    }

    fn on_transport_error(&self, current_state: TransactionState) -> Reaction {
        match current_state {
            TransactionState::Terminated => Reaction::none(),
            _ => Reaction::transition(TransactionState::Terminated).notify(Notification::TransportError),
        }
    }

    fn cancel_all_specific_timers(&self, timer_handles: &mut NonInviteClientTimers) {
        cancel_timer(&mut timer_handles.timer_e);
        cancel_timer(&mut timer_handles.timer_f);
        cancel_timer(&mut timer_handles.timer_k);
    }
}
