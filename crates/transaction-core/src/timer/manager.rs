//! One-shot timer scheduling for transactions.
//!
//! A transaction registers its command channel once. Each started timer is
//! a task that sleeps and then posts [`InternalTransactionCommand::Timer`]
//! into that channel. Retransmission back-off is driven by the transaction:
//! when it handles a retransmission timer it starts the next one with the
//! new interval. A timer that fires after its transaction unregistered is
//! dropped.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, trace};

use super::types::{TimerSettings, TimerType};
use crate::transaction::{InternalTransactionCommand, TransactionKey};

/// Handle to a scheduled timer; aborts the timer task on cancel or drop.
#[derive(Debug)]
pub struct TimerHandle {
    timer: TimerType,
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub fn timer_type(&self) -> TimerType {
        self.timer
    }

    pub fn cancel(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Cancels the timer held in `slot`, if any.
pub(crate) fn cancel_timer(slot: &mut Option<TimerHandle>) {
    if let Some(handle) = slot.take() {
        handle.cancel();
    }
}

#[derive(Debug)]
pub struct TimerManager {
    transaction_channels: Arc<DashMap<TransactionKey, mpsc::Sender<InternalTransactionCommand>>>,
    settings: TimerSettings,
}

impl TimerManager {
    pub fn new(settings: Option<TimerSettings>) -> Self {
        Self {
            transaction_channels: Arc::new(DashMap::new()),
            settings: settings.unwrap_or_default(),
        }
    }

    pub fn register_transaction(
        &self,
        transaction_id: TransactionKey,
        command_tx: mpsc::Sender<InternalTransactionCommand>,
    ) {
        if self
            .transaction_channels
            .insert(transaction_id.clone(), command_tx)
            .is_some()
        {
            debug!(id=%transaction_id, "Transaction channel replaced for already registered transaction.");
        }
        trace!(id=%transaction_id, "Transaction registered with TimerManager.");
    }

    /// Unregisters `transaction_id` only if it is still bound to `command_tx`,
    /// so a finished transaction cannot evict a newer one with the same key.
    pub fn unregister_transaction(
        &self,
        transaction_id: &TransactionKey,
        command_tx: &mpsc::Sender<InternalTransactionCommand>,
    ) {
        let removed = self
            .transaction_channels
            .remove_if(transaction_id, |_, tx| tx.same_channel(command_tx));
        if removed.is_some() {
            trace!(id=%transaction_id, "Transaction unregistered from TimerManager.");
        }
    }

    pub fn is_registered(&self, transaction_id: &TransactionKey) -> bool {
        self.transaction_channels.contains_key(transaction_id)
    }

    pub fn start_timer(
        &self,
        transaction_id: TransactionKey,
        timer_type: TimerType,
        duration: Duration,
    ) -> TimerHandle {
        let channels = self.transaction_channels.clone();

        let task = tokio::spawn(async move {
            trace!(id=%transaction_id, timer=%timer_type, duration=?duration, "Timer task started.");
            sleep(duration).await;

            let cmd_tx = channels.get(&transaction_id).map(|entry| entry.value().clone());
            match cmd_tx {
                Some(cmd_tx) => {
                    if let Err(e) = cmd_tx.send(InternalTransactionCommand::Timer(timer_type)).await {
                        debug!(id=%transaction_id, timer=%timer_type, error=%e, "Failed to send timer event (receiver dropped).");
                    } else {
                        trace!(id=%transaction_id, timer=%timer_type, "Timer fired.");
                    }
                }
                None => {
                    trace!(id=%transaction_id, timer=%timer_type, "Timer fired, but transaction no longer registered.");
                }
            }
        });

        TimerHandle {
            timer: timer_type,
            task,
        }
    }

    pub fn settings(&self) -> &TimerSettings {
        &self.settings
    }
}

impl Default for TimerManager {
    fn default() -> Self {
        Self::new(None)
    }
}
