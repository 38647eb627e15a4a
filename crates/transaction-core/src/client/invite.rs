//! INVITE client transaction, RFC 3261 Section 17.1.1.
//!
//! ```text
//!                    |INVITE from TU
//!  Timer A fires     |INVITE sent
//!  Reset A,          V                      Timer B fires
//!  INVITE sent +-----------+                or Transport Err.
//!    +---------|           |---------------+inform TU
//!    |         |  Calling  |               |
//!    +-------->|           |-------------->|
//!              +-----------+ 2xx           |
//!                 |  |       2xx to TU     |
//!                 |  |1xx                  |
//!  300-699 +------+  |1xx to TU            |
//! ACK sent |         V                     |
//! resp. to TU  +-----------+               |
//!              |           |--+ 1xx        |
//!              |Proceeding |  | 1xx to TU  |
//!              |           |<-+            |
//!              +-----------+ 2xx           |
//!                 |          2xx to TU     |
//!  300-699        |                        |
//!  ACK sent,      V                        |
//!  resp. to TU +-----------+               |
//!    +---------|           |               |
//! 300-699      | Completed |               |
//! ACK sent     |           |               |
//!    +-------->+-----------+               |
//!                 |  Timer D fires         |
//!                 V  -                     |
//!              +-----------+               |
//!              | Terminated|<--------------+
//!              +-----------+
//! ```

use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use sipua_sip_core::Message;

use super::ClientTransactionData;
use crate::error::{Error, Result};
use crate::timer::{cancel_timer, TimerHandle, TimerType};
use crate::transaction::{Notification, Reaction, TransactionKind, TransactionLogic, TransactionState};
use crate::utils::create_ack_for_error_response;

#[derive(Default, Debug)]
pub(crate) struct InviteClientTimers {
    timer_a: Option<TimerHandle>,
    timer_b: Option<TimerHandle>,
    timer_d: Option<TimerHandle>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct InviteClientLogic;

#[async_trait]
impl TransactionLogic<ClientTransactionData, InviteClientTimers> for InviteClientLogic {
    fn kind(&self) -> TransactionKind {
        TransactionKind::InviteClient
    }

    async fn process_message(
        &self,
        data: &Arc<ClientTransactionData>,
        message: Message,
        current_state: TransactionState,
        _timer_handles: &mut InviteClientTimers,
    ) -> Result<Reaction> {
        let response = match message {
            Message::Response(response) => response,
            Message::Request(request) => {
                warn!(id=%data.key, method=%request.method, "Request routed to INVITE client transaction, ignoring");
                return Ok(Reaction::none());
            }
        };

        if !response.status.is_valid() {
            let violation = Error::ProtocolViolation(format!("status code {} out of range", response.status_code()));
            warn!(id=%data.key, error=%violation, "Dropping response");
            return Ok(Reaction::none());
        }

        match current_state {
            TransactionState::Calling | TransactionState::Proceeding => {
                data.record_response(response.clone());
                let status = response.status;
                if status.is_provisional() {
                    Ok(Reaction::transition(TransactionState::Proceeding)
                        .notify(Notification::ProvisionalResponse(response)))
                } else if status.is_success() {
                    Ok(Reaction::transition(TransactionState::Terminated)
                        .notify(Notification::SuccessResponse(response)))
                } else {
                    Ok(Reaction::transition(TransactionState::Completed)
                        .notify(Notification::ErrorResponse(response)))
                }
            }
            TransactionState::Completed => {
                if response.status.is_error() {
                    data.record_response(response.clone());
                    if let Some(ack) = data.cached_ack() {
                        debug!(id=%data.key, status=%response.status, "Final response retransmitted, resending ACK");
                        data.send_ack(ack).await?;
                    }
                }
                Ok(Reaction::none())
            }
            _ => {
                trace!(id=%data.key, state=?current_state, status=%response.status, "Response ignored");
                Ok(Reaction::none())
            }
        }
    }

    async fn handle_timer(
        &self,
        data: &Arc<ClientTransactionData>,
        timer: TimerType,
        current_state: TransactionState,
        timer_handles: &mut InviteClientTimers,
    ) -> Result<Reaction> {
        match (timer, current_state) {
            (TimerType::A, TransactionState::Calling) => {
                let sent = data.retransmissions.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(id=%data.key, retransmission=sent, "Timer A fired, retransmitting INVITE");
                data.send_request().await?;
                let interval = data.settings.timer_a_interval(sent);
                timer_handles.timer_a = Some(data.start_timer(TimerType::A, interval));
                Ok(Reaction::none())
            }
            (TimerType::B, TransactionState::Calling) => {
                debug!(id=%data.key, "Timer B fired, INVITE timed out");
                Ok(Reaction::transition(TransactionState::Terminated).notify(Notification::Timeout))
            }
            (TimerType::D, TransactionState::Completed) => {
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
        timer_handles: &mut InviteClientTimers,
    ) -> Result<()> {
        match new_state {
            TransactionState::Calling => {
                if !data.is_reliable() {
                    timer_handles.timer_a = Some(data.start_timer(TimerType::A, data.settings.t1));
                }
                timer_handles.timer_b =
                    Some(data.start_timer(TimerType::B, data.settings.transaction_timeout));
                data.send_request().await?;
            }
            TransactionState::Proceeding => {
                cancel_timer(&mut timer_handles.timer_a);
                cancel_timer(&mut timer_handles.timer_b);
            }
            TransactionState::Completed => {
                cancel_timer(&mut timer_handles.timer_a);
                cancel_timer(&mut timer_handles.timer_b);
                timer_handles.timer_d =
                    Some(data.start_timer(TimerType::D, data.settings.timer_d(data.is_reliable())));

                let response = data
                    .last_response()
                    .ok_or_else(|| Error::Other("Completed without a final response".to_string()))?;
                let ack = create_ack_for_error_response(&data.request, &response)?;
                *data.ack.lock() = Some(ack.clone());
                data.send_ack(ack).await?;
            }
            TransactionState::Terminated => self.cancel_all_specific_timers(timer_handles),
            _ => {}
        }
        Ok(())
    }

    fn on_transport_error(&self, current_state: TransactionState) -> Reaction {
        match current_state {
            TransactionState::Calling => {
                Reaction::transition(TransactionState::Terminated).notify(Notification::Timeout)
            }
            TransactionState::Terminated => Reaction::none(),
            _ => Reaction::transition(TransactionState::Terminated).notify(Notification::TransportError),
        }
    }

    fn cancel_all_specific_timers(&self, timer_handles: &mut InviteClientTimers) {
        cancel_timer(&mut timer_handles.timer_a);
        cancel_timer(&mut timer_handles.timer_b);
        cancel_timer(&mut timer_handles.timer_d);
    }
}
