//! Transaction states (RFC 3261 Section 17) and an atomic holder for them.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::transaction::TransactionKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Created, nothing sent yet (client transactions)
    Initial,
    /// INVITE client: request sent, waiting for any response
    Calling,
    /// Non-INVITE: request sent or received, no provisional yet
    Trying,
    /// Provisional response seen
    Proceeding,
    /// Final response sent or received, absorbing retransmissions
    Completed,
    /// INVITE server: ACK received
    Confirmed,
    Terminated,
}

impl TransactionState {
    pub fn is_terminated(&self) -> bool {
        *self == TransactionState::Terminated
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl From<TransactionState> for u8 {
    fn from(state: TransactionState) -> Self {
        match state {
            TransactionState::Initial => 0,
            TransactionState::Calling => 1,
            TransactionState::Trying => 2,
            TransactionState::Proceeding => 3,
            TransactionState::Completed => 4,
            TransactionState::Confirmed => 5,
            TransactionState::Terminated => 6,
        }
    }
}

impl From<u8> for TransactionState {
    fn from(value: u8) -> Self {
        match value {
            0 => TransactionState::Initial,
            1 => TransactionState::Calling,
            2 => TransactionState::Trying,
            3 => TransactionState::Proceeding,
            4 => TransactionState::Completed,
            5 => TransactionState::Confirmed,
            _ => TransactionState::Terminated,
        }
    }
}

/// Lock-free state cell. Only the transaction's own task writes it; any
/// handle may read it.
#[derive(Debug)]
pub struct AtomicTransactionState {
    value: AtomicU8,
}

impl AtomicTransactionState {
    pub fn new(state: TransactionState) -> Self {
        Self {
            value: AtomicU8::new(state.into()),
        }
    }

    pub fn get(&self) -> TransactionState {
        TransactionState::from(self.value.load(Ordering::Acquire))
    }

    /// Stores `new_state` and returns the previous state.
    pub fn set(&self, new_state: TransactionState) -> TransactionState {
        TransactionState::from(self.value.swap(new_state.into(), Ordering::AcqRel))
    }

    /// Checks a transition against the state machine of `tx_kind`.
    pub fn validate_transition(
        tx_kind: TransactionKind,
        current_state: TransactionState,
        new_state: TransactionState,
    ) -> std::result::Result<(), String> {
        use TransactionState::*;

        if current_state == new_state {
            return Ok(());
        }
        if current_state == Terminated {
            return Err("Cannot transition from Terminated state".to_string());
        }
        if new_state == Terminated {
            return Ok(());
        }

        let allowed = match tx_kind {
            TransactionKind::InviteClient => matches!(
                (current_state, new_state),
                (Initial, Calling) | (Calling, Proceeding) | (Calling, Completed) | (Proceeding, Completed)
            ),
            TransactionKind::NonInviteClient => matches!(
                (current_state, new_state),
                (Initial, Trying) | (Trying, Proceeding) | (Trying, Completed) | (Proceeding, Completed)
            ),
            TransactionKind::InviteServer => matches!(
                (current_state, new_state),
                (Proceeding, Completed) | (Completed, Confirmed)
            ),
            TransactionKind::NonInviteServer => matches!(
                (current_state, new_state),
                (Trying, Proceeding) | (Trying, Completed) | (Proceeding, Completed)
            ),
        };

        if allowed {
            Ok(())
        } else {
            Err(format!(
                "Invalid transition for {:?}: {:?} -> {:?}",
                tx_kind, current_state, new_state
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TransactionState::*;

    #[test]
    fn test_atomic_state_set_returns_previous() {
        let state = AtomicTransactionState::new(Initial);
        assert_eq!(state.set(Calling), Initial);
        assert_eq!(state.get(), Calling);
    }

    #[test]
    fn test_invite_client_transitions() {
        let kind = TransactionKind::InviteClient;
        assert!(AtomicTransactionState::validate_transition(kind, Initial, Calling).is_ok());
        assert!(AtomicTransactionState::validate_transition(kind, Calling, Completed).is_ok());
        assert!(AtomicTransactionState::validate_transition(kind, Proceeding, Terminated).is_ok());
        assert!(AtomicTransactionState::validate_transition(kind, Completed, Proceeding).is_err());
        assert!(AtomicTransactionState::validate_transition(kind, Calling, Trying).is_err());
    }

    #[test]
    fn test_server_transitions() {
        let ist = TransactionKind::InviteServer;
        assert!(AtomicTransactionState::validate_transition(ist, Completed, Confirmed).is_ok());
        assert!(AtomicTransactionState::validate_transition(ist, Proceeding, Confirmed).is_err());

        let nist = TransactionKind::NonInviteServer;
        assert!(AtomicTransactionState::validate_transition(nist, Trying, Completed).is_ok());
        assert!(AtomicTransactionState::validate_transition(nist, Completed, Proceeding).is_err());
    }

    #[test]
    fn test_terminated_is_absorbing() {
        for kind in [
            TransactionKind::InviteClient,
            TransactionKind::NonInviteClient,
            TransactionKind::InviteServer,
            TransactionKind::NonInviteServer,
        ] {
            assert!(AtomicTransactionState::validate_transition(kind, Terminated, Completed).is_err());
            assert!(AtomicTransactionState::validate_transition(kind, Terminated, Terminated).is_ok());
        }
    }
}
