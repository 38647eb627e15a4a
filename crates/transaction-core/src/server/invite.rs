//! INVITE server transaction, RFC 3261 Section 17.2.1.
//!
//! ```text
//!                                |INVITE
//!                                |pass INV to TU
//!             INVITE             V send 100 if TU won't in 200ms
//!             send response+-----------+
//!                 +--------|           |--------+101-199 from TU
//!                 |        | Proceeding|        |send response
//!                 +------->|           |<-------+
//!                          |           |          Transport Err.
//!                          |           |          Inform TU
//!                          |           |--------------->+
//!                          +-----------+                |
//!             300-699 from TU |     |2xx from TU        |
//!             send response   |     |send response      |
//!                             |     +------------------>+
//!                             |                         |
//!             INVITE          V          Timer G fires  |
//!             send response+-----------+ send response  |
//!                 +--------|           |--------+       |
//!                 |        | Completed |        |       |
//!                 +------->|           |<-------+       |
//!                          +-----------+                |
//!                             |     |                   |
//!                         ACK |     |                   |
//!                         -   |     +------------------>+
//!                             |        Timer H fires    |
//!                             V        or Transport Err.|
//!                          +-----------+  Inform TU     |
//!                          |           |                |
//!                          | Confirmed |                |
//!                          |           |                |
//!                          +-----------+                |
//!                                |                      |
//!                                |Timer I fires         |
//!                                |-                     |
//!                                |                      |
//!                                V                      |
//!                          +-----------+                |
//!                          |           |                |
//!                          | Terminated|<---------------+
//!                          |           |
//!                          +-----------+
//! ```
//!
//! The 100 Trying shortcut is left to the application: it creates the
//! transaction with whatever response it wants sent first.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use sipua_sip_core::{Message, Method, Response};

use super::ServerTransactionData;
use crate::error::Result;
use crate::timer::{cancel_timer, TimerHandle, TimerType};
use crate::transaction::{Notification, Reaction, TransactionKind, TransactionLogic, TransactionState};

#[derive(Default, Debug)]
pub(crate) struct InviteServerTimers {
    timer_g: Option<TimerHandle>,
    timer_h: Option<TimerHandle>,
    timer_i: Option<TimerHandle>,
    g_interval: Duration,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct InviteServerLogic;

#[async_trait]
impl TransactionLogic<ServerTransactionData, InviteServerTimers> for InviteServerLogic {
    fn kind(&self) -> TransactionKind {
        TransactionKind::InviteServer
    }

    async fn process_message(
        &self,
        data: &Arc<ServerTransactionData>,
        message: Message,
        current_state: TransactionState,
        _timer_handles: &mut InviteServerTimers,
    ) -> Result<Reaction> {
        let request = match message {
            Message::Request(request) => request,
            Message::Response(response) => {
                warn!(id=%data.key, status=%response.status, "Response routed to INVITE server transaction, ignoring");
                return Ok(Reaction::none());
            }
        };

        match (&request.method, current_state) {
            (Method::Invite, TransactionState::Proceeding | TransactionState::Completed) => {
                debug!(id=%data.key, state=?current_state, "INVITE retransmission");
                data.resend_last_response().await?;
                Ok(Reaction::none())
            }
            (Method::Ack, TransactionState::Completed) => {
                Ok(Reaction::transition(TransactionState::Confirmed))
            }
            (method, state) => {
                trace!(id=%data.key, %method, ?state, "Request absorbed");
                Ok(Reaction::none())
            }
        }
    }

    async fn send_response(
        &self,
        data: &Arc<ServerTransactionData>,
        response: Response,
        current_state: TransactionState,
        _timer_handles: &mut InviteServerTimers,
    ) -> Result<Reaction> {
        if current_state != TransactionState::Proceeding {
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
            Ok(Reaction::none())
        } else if status.is_success() {
            Ok(Reaction::transition(TransactionState::Terminated))
        } else {
            Ok(Reaction::transition(TransactionState::Completed))
        }
    }

    async fn handle_timer(
        &self,
        data: &Arc<ServerTransactionData>,
        timer: TimerType,
        current_state: TransactionState,
        timer_handles: &mut InviteServerTimers,
    ) -> Result<Reaction> {
        match (timer, current_state) {
            (TimerType::G, TransactionState::Completed) => {
                debug!(id=%data.key, "Timer G fired, retransmitting final response");
                data.resend_last_response().await?;
                let interval = data.settings.next_backoff_interval(timer_handles.g_interval);
                timer_handles.g_interval = interval;
                timer_handles.timer_g = Some(data.start_timer(TimerType::G, interval));
                Ok(Reaction::none())
            }
            (TimerType::H, TransactionState::Completed) => {
                debug!(id=%data.key, "Timer H fired, no ACK received");
                Ok(Reaction::transition(TransactionState::Terminated)
                    .notify(Notification::TransactionFailure))
            }
            (TimerType::I, TransactionState::Confirmed) => {
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
        timer_handles: &mut InviteServerTimers,
    ) -> Result<()> {
        match new_state {
            TransactionState::Completed => {
                if !data.is_reliable() {
                    timer_handles.g_interval = data.settings.t1;
                    timer_handles.timer_g = Some(data.start_timer(TimerType::G, data.settings.t1));
                }
                timer_handles.timer_h = Some(data.start_timer(TimerType::H, data.settings.wait_time_h));
            }
            TransactionState::Confirmed => {
                cancel_timer(&mut timer_handles.timer_g);
                cancel_timer(&mut timer_handles.timer_h);
                timer_handles.timer_i =
                    Some(data.start_timer(TimerType::I, data.settings.timer_i(data.is_reliable())));
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

    fn cancel_all_specific_timers(&self, timer_handles: &mut InviteServerTimers) {
        cancel_timer(&mut timer_handles.timer_g);
        cancel_timer(&mut timer_handles.timer_h);
        cancel_timer(&mut timer_handles.timer_i);
    }
}
