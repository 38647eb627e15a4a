//! Shared transaction machinery: identity, state, the per-transaction
//! actor loop and the callback interfaces transaction users implement.

pub mod event;
pub mod key;
pub mod logic;
pub mod runner;
pub mod state;
pub mod user;

use std::fmt;

use sipua_sip_core::{Message, Method, Response};

use crate::timer::TimerType;

pub use event::{ChannelTransactionUser, TransactionEvent};
pub use key::{TransactionKey, ID_SEPARATOR};
pub use logic::{Notification, Reaction, TransactionLogic};
pub use state::{AtomicTransactionState, TransactionState};
pub use user::{ClientTransactionUser, ServerTransactionUser};

/// The four RFC 3261 transaction state machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    InviteClient,
    NonInviteClient,
    InviteServer,
    NonInviteServer,
}

impl TransactionKind {
    pub fn client_for(method: &Method) -> Self {
        if *method == Method::Invite {
            TransactionKind::InviteClient
        } else {
            TransactionKind::NonInviteClient
        }
    }

    pub fn server_for(method: &Method) -> Self {
        if *method == Method::Invite {
            TransactionKind::InviteServer
        } else {
            TransactionKind::NonInviteServer
        }
    }

    pub fn is_server(&self) -> bool {
        matches!(self, TransactionKind::InviteServer | TransactionKind::NonInviteServer)
    }

    /// State a freshly created transaction starts in.
    pub fn initial_state(&self) -> TransactionState {
        match self {
            TransactionKind::InviteClient | TransactionKind::NonInviteClient => TransactionState::Initial,
            TransactionKind::InviteServer => TransactionState::Proceeding,
            TransactionKind::NonInviteServer => TransactionState::Trying,
        }
    }
}

/// Commands consumed by a transaction's task, in arrival order.
pub enum InternalTransactionCommand {
    /// Move to a state (used by `start()`)
    TransitionTo(TransactionState),
    /// Inbound message routed to this transaction
    ProcessMessage(Message),
    /// Response pushed down by the server transaction user
    SendResponse(Response),
    /// A timer fired
    Timer(TimerType),
    /// The transport reported a failure for this transaction
    TransportError(String),
    /// Stop silently
    Terminate,
}

impl fmt::Debug for InternalTransactionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransitionTo(state) => write!(f, "TransitionTo({:?})", state),
            Self::ProcessMessage(Message::Request(r)) => write!(f, "ProcessMessage({} request)", r.method),
            Self::ProcessMessage(Message::Response(r)) => write!(f, "ProcessMessage({} response)", r.status),
            Self::SendResponse(r) => write!(f, "SendResponse({})", r.status),
            Self::Timer(timer) => write!(f, "Timer({})", timer),
            Self::TransportError(e) => write!(f, "TransportError({})", e),
            Self::Terminate => write!(f, "Terminate"),
        }
    }
}
