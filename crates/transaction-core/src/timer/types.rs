//! Timer identifiers and durations (RFC 3261 Section 17, Table 4).
//!
//! - Retransmission timers: A (INVITE client), E (non-INVITE client),
//!   G (INVITE server). Only armed on unreliable transports.
//! - Transaction timeouts: B, F, H, all 64*T1.
//! - Wait timers: D, I, J, K. They absorb retransmissions and collapse to
//!   zero on reliable transports.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerType {
    A,
    B,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
}

impl fmt::Display for TimerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimerType::A => "A",
            TimerType::B => "B",
            TimerType::D => "D",
            TimerType::E => "E",
            TimerType::F => "F",
            TimerType::G => "G",
            TimerType::H => "H",
            TimerType::I => "I",
            TimerType::J => "J",
            TimerType::K => "K",
        };
        f.write_str(name)
    }
}

/// Durations serialize as integer milliseconds.
mod millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}

/// Timer durations for one transaction manager.
///
/// Deserialized settings derive B/F, H and J from `t1` and I, K from `t4`
/// unless those timers are given explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TimerSettingsMillis")]
pub struct TimerSettings {
    /// RTT estimate, initial retransmit interval
    #[serde(serialize_with = "millis::serialize")]
    pub t1: Duration,

    /// Retransmit interval cap for non-INVITE requests and INVITE responses
    #[serde(serialize_with = "millis::serialize")]
    pub t2: Duration,

    /// Maximum time a message stays in the network
    #[serde(serialize_with = "millis::serialize")]
    pub t4: Duration,

    /// Timer B / F: 64*T1
    #[serde(serialize_with = "millis::serialize")]
    pub transaction_timeout: Duration,

    /// Timer D on unreliable transports
    #[serde(serialize_with = "millis::serialize")]
    pub wait_time_d: Duration,

    /// Timer H: 64*T1
    #[serde(serialize_with = "millis::serialize")]
    pub wait_time_h: Duration,

    /// Timer I on unreliable transports: T4
    #[serde(serialize_with = "millis::serialize")]
    pub wait_time_i: Duration,

    /// Timer J on unreliable transports: 64*T1
    #[serde(serialize_with = "millis::serialize")]
    pub wait_time_j: Duration,

    /// Timer K on unreliable transports: T4
    #[serde(serialize_with = "millis::serialize")]
    pub wait_time_k: Duration,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            t1: Duration::from_millis(500),
            t2: Duration::from_secs(4),
            t4: Duration::from_secs(5),
            transaction_timeout: Duration::from_secs(32),
            wait_time_d: Duration::from_secs(32),
            wait_time_h: Duration::from_secs(32),
            wait_time_i: Duration::from_secs(5),
            wait_time_j: Duration::from_secs(32),
            wait_time_k: Duration::from_secs(5),
        }
    }
}

/// Wire form of [`TimerSettings`]: optional integer milliseconds.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TimerSettingsMillis {
    t1: Option<u64>,
    t2: Option<u64>,
    t4: Option<u64>,
    transaction_timeout: Option<u64>,
    wait_time_d: Option<u64>,
    wait_time_h: Option<u64>,
    wait_time_i: Option<u64>,
    wait_time_j: Option<u64>,
    wait_time_k: Option<u64>,
}

impl From<TimerSettingsMillis> for TimerSettings {
    fn from(raw: TimerSettingsMillis) -> Self {
        let mut settings = TimerSettings::default();
        if let Some(t1) = raw.t1 {
            settings = settings.with_t1(Duration::from_millis(t1));
        }
        if let Some(t4) = raw.t4 {
            settings = settings.with_t4(Duration::from_millis(t4));
        }

        let explicit = [
            (raw.t2, &mut settings.t2),
            (raw.transaction_timeout, &mut settings.transaction_timeout),
            (raw.wait_time_d, &mut settings.wait_time_d),
            (raw.wait_time_h, &mut settings.wait_time_h),
            (raw.wait_time_i, &mut settings.wait_time_i),
            (raw.wait_time_j, &mut settings.wait_time_j),
            (raw.wait_time_k, &mut settings.wait_time_k),
        ];
        for (value, slot) in explicit {
            if let Some(ms) = value {
                *slot = Duration::from_millis(ms);
            }
        }
        settings
    }
}

impl TimerSettings {
    /// Sets T1 and rescales every 64*T1 timer with it.
    pub fn with_t1(mut self, t1: Duration) -> Self {
        self.t1 = t1;
        self.transaction_timeout = t1 * 64;
        self.wait_time_h = t1 * 64;
        self.wait_time_j = t1 * 64;
        self
    }

    /// Sets T4 together with Timers I and K.
    pub fn with_t4(mut self, t4: Duration) -> Self {
        self.t4 = t4;
        self.wait_time_i = t4;
        self.wait_time_k = t4;
        self
    }

    /// Timer A after `retransmissions` resends: 2^n * T1, uncapped.
    pub fn timer_a_interval(&self, retransmissions: u32) -> Duration {
        self.t1
            .checked_mul(2u32.saturating_pow(retransmissions))
            .unwrap_or(Duration::MAX)
    }

    /// Next E/G interval: double the current one, capped at T2.
    pub fn next_backoff_interval(&self, current: Duration) -> Duration {
        std::cmp::min(current.saturating_mul(2), self.t2)
    }

    pub fn timer_d(&self, reliable: bool) -> Duration {
        if reliable { Duration::ZERO } else { self.wait_time_d }
    }

    pub fn timer_i(&self, reliable: bool) -> Duration {
        if reliable { Duration::ZERO } else { self.wait_time_i }
    }

    pub fn timer_j(&self, reliable: bool) -> Duration {
        if reliable { Duration::ZERO } else { self.wait_time_j }
    }

    pub fn timer_k(&self, reliable: bool) -> Duration {
        if reliable { Duration::ZERO } else { self.wait_time_k }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let settings = TimerSettings::default();
        assert_eq!(settings.t1, Duration::from_millis(500));
        assert_eq!(settings.transaction_timeout, settings.t1 * 64);
        assert_eq!(settings.wait_time_i, settings.t4);
    }

    #[test]
    fn test_timer_a_doubles_without_cap() {
        let settings = TimerSettings::default();
        let intervals: Vec<u64> = (0..7)
            .map(|n| settings.timer_a_interval(n).as_millis() as u64)
            .collect();
        assert_eq!(intervals, vec![500, 1000, 2000, 4000, 8000, 16000, 32000]);
    }

    #[test]
    fn test_backoff_is_capped_at_t2() {
        let settings = TimerSettings::default();
        assert_eq!(settings.next_backoff_interval(Duration::from_millis(500)), Duration::from_secs(1));
        assert_eq!(settings.next_backoff_interval(Duration::from_secs(4)), Duration::from_secs(4));
    }

    #[test]
    fn test_wait_timers_collapse_on_reliable_transport() {
        let settings = TimerSettings::default();
        assert_eq!(settings.timer_d(true), Duration::ZERO);
        assert_eq!(settings.timer_d(false), Duration::from_secs(32));
        assert_eq!(settings.timer_k(true), Duration::ZERO);
        assert_eq!(settings.timer_j(false), settings.t1 * 64);
    }

    #[test]
    fn test_with_t1_rescales() {
        let settings = TimerSettings::default().with_t1(Duration::from_millis(100));
        assert_eq!(settings.transaction_timeout, Duration::from_millis(6400));
        assert_eq!(settings.wait_time_h, Duration::from_millis(6400));
    }

    #[test]
    fn test_serde_uses_milliseconds() {
        let settings: TimerSettings = serde_json::from_str(r#"{"t1": 250, "t2": 2000}"#).unwrap();
        assert_eq!(settings.t1, Duration::from_millis(250));
        assert_eq!(settings.t2, Duration::from_secs(2));
        assert_eq!(settings.t4, Duration::from_secs(5));

        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["t1"], 250);
    }

    #[test]
    fn test_deserialized_t1_rescales_derived_timers() {
        let settings: TimerSettings = serde_json::from_str(r#"{"t1": 100, "t4": 2000}"#).unwrap();
        assert_eq!(settings.transaction_timeout, settings.t1 * 64);
        assert_eq!(settings.wait_time_h, Duration::from_millis(6400));
        assert_eq!(settings.wait_time_j, Duration::from_millis(6400));
        assert_eq!(settings.wait_time_i, Duration::from_secs(2));
        assert_eq!(settings.wait_time_k, Duration::from_secs(2));
        assert_eq!(settings.wait_time_d, Duration::from_secs(32));
    }

    #[test]
    fn test_explicit_timers_win_over_derived() {
        let settings: TimerSettings =
            serde_json::from_str(r#"{"t1": 100, "transaction_timeout": 1000, "wait_time_d": 0}"#).unwrap();
        assert_eq!(settings.transaction_timeout, Duration::from_secs(1));
        assert_eq!(settings.wait_time_h, Duration::from_millis(6400));
        assert_eq!(settings.wait_time_d, Duration::ZERO);
    }

    #[test]
    fn test_serialized_settings_read_back_unchanged() {
        let settings = TimerSettings::default().with_t1(Duration::from_millis(200));
        let json = serde_json::to_string(&settings).unwrap();
        let back: TimerSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }
}
