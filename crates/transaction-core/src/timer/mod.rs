//! Timer service for SIP transactions.

pub mod manager;
pub mod types;

pub(crate) use manager::cancel_timer;
pub use manager::{TimerHandle, TimerManager};
pub use types::{TimerSettings, TimerType};
