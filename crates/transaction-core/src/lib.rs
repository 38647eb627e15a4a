//! # sipua-transaction-core
//!
//! The RFC 3261 transaction layer of the sipua stack.
//!
//! A [`TransactionManager`] creates client and server transactions, keeps
//! the live ones in a registry keyed by the top Via branch and the method,
//! and routes inbound traffic from a [`Transport`](sipua_sip_transport::Transport)
//! to them. Each transaction runs its state machine on its own task:
//! retransmissions, timeouts and the ACK for non-2xx final responses are
//! handled here, and the application hears about outcomes through the
//! [`ClientTransactionUser`] and [`ServerTransactionUser`] callbacks.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sipua_sip_core::prelude::*;
//! use sipua_sip_transport::{bind_udp, TransportType};
//! use sipua_transaction_core::prelude::*;
//!
//! # async fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let (transport, transport_rx) = bind_udp("127.0.0.1:5060".parse()?).await?;
//! let (manager, _stray_events) =
//!     TransactionManager::new(Arc::new(transport), transport_rx, None).await?;
//!
//! let (user, mut events) = ChannelTransactionUser::channel(16);
//! let request = RequestBuilder::new(Method::Options, "sip:bob@example.com")
//!     .from("<sip:alice@example.com>;tag=1")
//!     .to("<sip:bob@example.com>")
//!     .call_id("c1")
//!     .cseq(1)
//!     .build();
//!
//! let tx = manager
//!     .create_client_transaction(request, "127.0.0.1:5070".parse()?, TransportType::Udp, None, Arc::new(user))
//!     .await?;
//! tx.start().await?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
mod error;
pub mod manager;
pub mod server;
pub mod timer;
pub mod transaction;
pub mod utils;

pub use client::ClientTransaction;
pub use config::TransactionManagerConfig;
pub use error::{Error, Result};
pub use manager::TransactionManager;
pub use server::ServerTransaction;
pub use timer::{TimerSettings, TimerType};
pub use transaction::{
    ChannelTransactionUser, ClientTransactionUser, ServerTransactionUser, TransactionEvent,
    TransactionKey, TransactionKind, TransactionState,
};

pub mod prelude {
    pub use crate::{
        ChannelTransactionUser, ClientTransaction, ClientTransactionUser, Error, Result,
        ServerTransaction, ServerTransactionUser, TimerSettings, TransactionEvent, TransactionKey,
        TransactionKind, TransactionManager, TransactionManagerConfig, TransactionState,
    };
}
