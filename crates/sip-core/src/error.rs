use thiserror::Error;

/// A type alias for handling `Result`s with `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while parsing or building SIP messages
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The request line or status line could not be parsed
    #[error("Invalid start line: {0}")]
    InvalidStartLine(String),

    /// A header line was malformed
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// A header required for the operation is absent
    #[error("Missing header: {0}")]
    MissingHeader(&'static str),

    /// Status code outside the three digit range
    #[error("Invalid status code: {0}")]
    InvalidStatusCode(u16),

    /// Method token contained characters outside the token grammar
    #[error("Invalid method: {0}")]
    InvalidMethod(String),

    /// Malformed Via header value
    #[error("Invalid Via header: {0}")]
    InvalidVia(String),

    /// Malformed CSeq header value
    #[error("Invalid CSeq header: {0}")]
    InvalidCSeq(String),

    /// Message head was not valid UTF-8
    #[error("Message is not valid UTF-8")]
    Utf8,

    /// Input ended before the end of the header section
    #[error("Incomplete message")]
    Incomplete,
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::Utf8
    }
}
