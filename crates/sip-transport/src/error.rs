use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// A type alias for handling `Result`s with `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the transport gateway
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to bind the socket
    #[error("Failed to bind to {0}: {1}")]
    BindFailed(SocketAddr, #[source] io::Error),

    /// Failed to send a datagram
    #[error("Failed to send to {0}: {1}")]
    SendFailed(SocketAddr, #[source] io::Error),

    /// Encoded message exceeds what the transport can carry
    #[error("Packet too large: {0} bytes (max {1})")]
    PacketTooLarge(usize, usize),

    /// The transport was closed
    #[error("Transport closed")]
    TransportClosed,

    /// Unknown transport token
    #[error("Unsupported transport: {0}")]
    UnsupportedTransport(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
