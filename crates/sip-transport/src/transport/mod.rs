pub mod udp;

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use sipua_sip_core::Message;

use crate::error::{Error, Result};

/// Transport protocol a message travels over.
///
/// Only reliability matters to the transaction layer: retransmission timers
/// run on unreliable transports and wait timers collapse to zero on reliable
/// ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportType {
    Udp,
    Tcp,
    Tls,
}

impl TransportType {
    pub fn is_reliable(&self) -> bool {
        !matches!(self, TransportType::Udp)
    }

    /// Token used in the Via sent-protocol.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportType::Udp => "UDP",
            TransportType::Tcp => "TCP",
            TransportType::Tls => "TLS",
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "UDP" => Ok(TransportType::Udp),
            "TCP" => Ok(TransportType::Tcp),
            "TLS" => Ok(TransportType::Tls),
            _ => Err(Error::UnsupportedTransport(s.to_string())),
        }
    }
}

/// Events emitted by a transport to its consumer
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A SIP message arrived
    MessageReceived {
        message: Message,
        source: SocketAddr,
        destination: SocketAddr,
    },

    /// A receive or parse error occurred
    Error { error: String },

    /// The transport has been closed
    Closed,
}

/// The gateway the transaction layer sends through.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    fn local_addr(&self) -> Result<SocketAddr>;

    fn transport_type(&self) -> TransportType {
        TransportType::Udp
    }

    async fn send_message(&self, message: Message, destination: SocketAddr) -> Result<()>;

    /// Sends pre-encoded bytes unchanged.
    async fn send_raw(&self, data: Bytes, destination: SocketAddr) -> Result<()>;

    async fn close(&self) -> Result<()>;

    fn is_closed(&self) -> bool;
}
