//! # Transaction Runner
//!
//! The event loop behind every transaction. Each transaction owns one task
//! that consumes [`InternalTransactionCommand`]s from a single channel;
//! network input, timer expiry and user commands all arrive there, so the
//! handling of one transaction is strictly sequential.
//!
//! Kind-specific behaviour lives in a [`TransactionLogic`] implementation.
//! Handlers return a [`Reaction`]; the runner applies the state change,
//! runs the entry actions of the new state and only then delivers the
//! notification to the transaction user. A transport failure reported by a
//! handler or an entry action is turned into the logic's transport-error
//! reaction before the next command is taken.
//!
//! Entering Terminated releases the transaction (registry entry and timer
//! registration) before the user hears about it.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::error::Error;
use crate::transaction::logic::{Notification, Reaction, TransactionLogic};
use crate::transaction::{
    AtomicTransactionState, InternalTransactionCommand, TransactionKey, TransactionState,
};

/// Access to a transaction's state cell.
pub trait AsRefState {
    fn as_ref_state(&self) -> &AtomicTransactionState;
}

/// Access to a transaction's key.
pub trait AsRefKey {
    fn as_ref_key(&self) -> &TransactionKey;
}

/// Delivery of notifications to the transaction user.
#[async_trait::async_trait]
pub trait HasTransactionUser {
    async fn deliver(data: Arc<Self>, notification: Notification);
}

/// Cleanup once the transaction has terminated: leave the registry and the
/// timer manager. Runs before the terminating notification is delivered and
/// again when the loop exits, so it must be idempotent.
pub trait ReleaseOnTermination {
    fn release(&self);
}

pub async fn run_transaction_loop<D, TH, L>(
    data: Arc<D>,
    logic: Arc<L>,
    mut cmd_rx: mpsc::Receiver<InternalTransactionCommand>,
) where
    D: AsRefState + AsRefKey + HasTransactionUser + ReleaseOnTermination + Send + Sync + 'static,
    TH: Default + Send + Sync + 'static,
    L: TransactionLogic<D, TH>,
{
    let mut timer_handles = TH::default();
    let tx_id = data.as_ref_key().clone();

    debug!(id=%tx_id, kind=?logic.kind(), state=?data.as_ref_state().get(), "Transaction loop starting");

    while let Some(command) = cmd_rx.recv().await {
        let current_state = data.as_ref_state().get();
        trace!(id=%tx_id, ?command, state=?current_state, "Transaction received command");

        let outcome = match command {
            InternalTransactionCommand::TransitionTo(state) => Ok(Reaction::transition(state)),
            InternalTransactionCommand::ProcessMessage(message) => {
                logic
                    .process_message(&data, message, current_state, &mut timer_handles)
                    .await
            }
            InternalTransactionCommand::SendResponse(response) => {
                logic
                    .send_response(&data, response, current_state, &mut timer_handles)
                    .await
            }
            InternalTransactionCommand::Timer(timer) => {
                logic
                    .handle_timer(&data, timer, current_state, &mut timer_handles)
                    .await
            }
            InternalTransactionCommand::TransportError(reason) => {
                Err(Error::TransportError(reason))
            }
            InternalTransactionCommand::Terminate => {
                debug!(id=%tx_id, "Received Terminate command");
                Ok(Reaction::transition(TransactionState::Terminated))
            }
        };

        let reaction = match outcome {
            Ok(reaction) => reaction,
            Err(e) if e.is_transport_error() => {
                warn!(id=%tx_id, error=%e, state=?current_state, "Transport error");
                logic.on_transport_error(current_state)
            }
            Err(e) => {
                error!(id=%tx_id, error=%e, state=?current_state, "Error handling command");
                Reaction::none()
            }
        };

        apply_reaction(&data, logic.as_ref(), reaction, &mut timer_handles).await;

        if data.as_ref_state().get().is_terminated() {
            break;
        }
    }

    logic.cancel_all_specific_timers(&mut timer_handles);
    data.release();
    debug!(id=%tx_id, final_state=?data.as_ref_state().get(), "Transaction loop ended");
}

async fn apply_reaction<D, TH, L>(
    data: &Arc<D>,
    logic: &L,
    mut reaction: Reaction,
    timer_handles: &mut TH,
) where
    D: AsRefState + AsRefKey + HasTransactionUser + ReleaseOnTermination + Send + Sync + 'static,
    TH: Default + Send + Sync + 'static,
    L: TransactionLogic<D, TH>,
{
    let tx_id = data.as_ref_key();

    // Entering Terminated never sends, so a failure can chain at most once.
    for _ in 0..2 {
        let mut failure = None;

        if let Some(next) = reaction.next_state {
            let current = data.as_ref_state().get();
            if next != current {
                match AtomicTransactionState::validate_transition(logic.kind(), current, next) {
                    Ok(()) => {
                        data.as_ref_state().set(next);
                        debug!(id=%tx_id, "State transition: {:?} -> {:?}", current, next);
                        if let Err(e) = logic.on_enter_state(data, next, current, timer_handles).await {
                            failure = Some(e);
                        }
                        if next.is_terminated() {
                            data.release();
                        }
                    }
                    Err(e) => {
                        error!(id=%tx_id, error=%e, "Invalid state transition");
                    }
                }
            }
        }

        if let Some(notification) = reaction.notification.take() {
            D::deliver(data.clone(), notification).await;
        }

        match failure {
            Some(e) if e.is_transport_error() => {
                let state = data.as_ref_state().get();
                warn!(id=%tx_id, error=%e, ?state, "Transport error while entering state");
                reaction = logic.on_transport_error(state);
            }
            Some(e) => {
                error!(id=%tx_id, error=%e, "Error entering state");
                break;
            }
            None => break,
        }
    }
}
