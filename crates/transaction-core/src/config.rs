//! Transaction manager configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::timer::TimerSettings;

/// Default capacity of the manager's event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Default capacity of each transaction's command queue.
pub const DEFAULT_COMMAND_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionManagerConfig {
    pub timer_settings: TimerSettings,

    /// Capacity of the channel carrying stray traffic and transport events
    pub event_capacity: usize,

    /// Capacity of each transaction's command queue
    pub command_capacity: usize,

    /// SIP URI added as a loose Route to outgoing requests that have none
    pub outbound_proxy: Option<String>,
}

impl Default for TransactionManagerConfig {
    fn default() -> Self {
        Self {
            timer_settings: TimerSettings::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            outbound_proxy: None,
        }
    }
}

impl TransactionManagerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_timer_settings(mut self, timer_settings: TimerSettings) -> Self {
        self.timer_settings = timer_settings;
        self
    }

    pub fn with_outbound_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.outbound_proxy = Some(proxy.into());
        self
    }
}
