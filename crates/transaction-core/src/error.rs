use thiserror::Error;

use sipua_sip_core::Method;

use crate::transaction::TransactionKey;

/// A type alias for handling `Result`s with `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in SIP transaction handling
#[derive(Error, Debug)]
pub enum Error {
    /// Error originating from the sip-core crate (parsing, missing headers)
    #[error("SIP core error: {0}")]
    SipCore(#[from] sipua_sip_core::Error),

    /// A send through the transport gateway failed.
    #[error("SIP transport error: {0}")]
    TransportError(String),

    /// Inbound message broke the protocol (e.g. status code out of range).
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// No transaction can be created for this method (ACK).
    #[error("Unsupported method for a transaction: {0}")]
    UnsupportedMethod(Method),

    /// Transaction not found for the given key.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionKey),

    /// Transaction with the given key already exists.
    #[error("Transaction already exists: {0}")]
    TransactionExists(TransactionKey),

    /// Invalid transaction state transition attempted.
    #[error("Invalid transaction state transition: {0}")]
    InvalidStateTransition(String),

    /// A header needed to identify or build a message is absent.
    #[error("Missing header: {0}")]
    MissingHeader(&'static str),

    /// Invalid configuration input.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal channel error (e.g., the transaction task has finished).
    #[error("Internal channel closed")]
    ChannelClosed,

    /// Other miscellaneous errors.
    #[error("Other error: {0}")]
    Other(String),
}

impl From<sipua_sip_transport::Error> for Error {
    fn from(e: sipua_sip_transport::Error) -> Self {
        Error::TransportError(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::ChannelClosed
    }
}

impl Error {
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Error::TransportError(_))
    }
}
