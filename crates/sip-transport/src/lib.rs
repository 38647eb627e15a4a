//! SIP transport gateway for the sipua stack
//!
//! The transaction layer only needs two things from a transport: a way to
//! send a message to an address, and a channel of inbound
//! [`TransportEvent`]s. [`UdpTransport`] provides both over a single socket.

mod error;
pub mod transport;

pub use error::{Error, Result};
pub use transport::udp::UdpTransport;
pub use transport::{Transport, TransportEvent, TransportType};

/// Binds a [`UdpTransport`] with the default channel capacity.
pub async fn bind_udp(
    addr: std::net::SocketAddr,
) -> Result<(UdpTransport, tokio::sync::mpsc::Receiver<TransportEvent>)> {
    UdpTransport::bind(addr, None).await
}

pub mod prelude {
    pub use super::{bind_udp, Error, Result, Transport, TransportEvent, TransportType, UdpTransport};
}
