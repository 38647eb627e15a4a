//! # SIP Status Codes
//!
//! Status codes as defined in RFC 3261 Section 21. Codes are grouped by their
//! first digit:
//!
//! - `1xx`: Provisional
//! - `2xx`: Success
//! - `3xx`: Redirection
//! - `4xx`: Client Error
//! - `5xx`: Server Error
//! - `6xx`: Global Failure
//!
//! The parser accepts any three digit code so that the transaction layer can
//! see and reject codes outside `100..=699` itself. Use [`StatusCode::from_u16`]
//! for the strict conversion and [`StatusCode::from_raw`] for the lenient one.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    // 1xx: Provisional
    Trying,
    Ringing,
    CallIsBeingForwarded,
    Queued,
    SessionProgress,

    // 2xx: Success
    Ok,
    Accepted,

    // 3xx: Redirection
    MultipleChoices,
    MovedPermanently,
    MovedTemporarily,
    UseProxy,

    // 4xx: Client Error
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    ProxyAuthenticationRequired,
    RequestTimeout,
    TemporarilyUnavailable,
    CallOrTransactionDoesNotExist,
    BusyHere,
    RequestTerminated,
    NotAcceptableHere,

    // 5xx: Server Error
    ServerInternalError,
    NotImplemented,
    ServiceUnavailable,
    ServerTimeout,

    // 6xx: Global Failure
    BusyEverywhere,
    Decline,
    DoesNotExistAnywhere,

    /// Any other code, including ones outside the valid range
    Custom(u16),
}

impl StatusCode {
    /// Maps a numeric value onto a status code without range checking.
    pub fn from_raw(code: u16) -> Self {
        match code {
            100 => StatusCode::Trying,
            180 => StatusCode::Ringing,
            181 => StatusCode::CallIsBeingForwarded,
            182 => StatusCode::Queued,
            183 => StatusCode::SessionProgress,
            200 => StatusCode::Ok,
            202 => StatusCode::Accepted,
            300 => StatusCode::MultipleChoices,
            301 => StatusCode::MovedPermanently,
            302 => StatusCode::MovedTemporarily,
            305 => StatusCode::UseProxy,
            400 => StatusCode::BadRequest,
            401 => StatusCode::Unauthorized,
            403 => StatusCode::Forbidden,
            404 => StatusCode::NotFound,
            405 => StatusCode::MethodNotAllowed,
            407 => StatusCode::ProxyAuthenticationRequired,
            408 => StatusCode::RequestTimeout,
            480 => StatusCode::TemporarilyUnavailable,
            481 => StatusCode::CallOrTransactionDoesNotExist,
            486 => StatusCode::BusyHere,
            487 => StatusCode::RequestTerminated,
            488 => StatusCode::NotAcceptableHere,
            500 => StatusCode::ServerInternalError,
            501 => StatusCode::NotImplemented,
            503 => StatusCode::ServiceUnavailable,
            504 => StatusCode::ServerTimeout,
            600 => StatusCode::BusyEverywhere,
            603 => StatusCode::Decline,
            604 => StatusCode::DoesNotExistAnywhere,
            other => StatusCode::Custom(other),
        }
    }

    /// Creates a status code, rejecting values outside `100..=699`.
    pub fn from_u16(code: u16) -> Result<Self> {
        if (100..700).contains(&code) {
            Ok(Self::from_raw(code))
        } else {
            Err(Error::InvalidStatusCode(code))
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Trying => 100,
            StatusCode::Ringing => 180,
            StatusCode::CallIsBeingForwarded => 181,
            StatusCode::Queued => 182,
            StatusCode::SessionProgress => 183,
            StatusCode::Ok => 200,
            StatusCode::Accepted => 202,
            StatusCode::MultipleChoices => 300,
            StatusCode::MovedPermanently => 301,
            StatusCode::MovedTemporarily => 302,
            StatusCode::UseProxy => 305,
            StatusCode::BadRequest => 400,
            StatusCode::Unauthorized => 401,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::ProxyAuthenticationRequired => 407,
            StatusCode::RequestTimeout => 408,
            StatusCode::TemporarilyUnavailable => 480,
            StatusCode::CallOrTransactionDoesNotExist => 481,
            StatusCode::BusyHere => 486,
            StatusCode::RequestTerminated => 487,
            StatusCode::NotAcceptableHere => 488,
            StatusCode::ServerInternalError => 500,
            StatusCode::NotImplemented => 501,
            StatusCode::ServiceUnavailable => 503,
            StatusCode::ServerTimeout => 504,
            StatusCode::BusyEverywhere => 600,
            StatusCode::Decline => 603,
            StatusCode::DoesNotExistAnywhere => 604,
            StatusCode::Custom(code) => *code,
        }
    }

    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Trying => "Trying",
            StatusCode::Ringing => "Ringing",
            StatusCode::CallIsBeingForwarded => "Call Is Being Forwarded",
            StatusCode::Queued => "Queued",
            StatusCode::SessionProgress => "Session Progress",
            StatusCode::Ok => "OK",
            StatusCode::Accepted => "Accepted",
            StatusCode::MultipleChoices => "Multiple Choices",
            StatusCode::MovedPermanently => "Moved Permanently",
            StatusCode::MovedTemporarily => "Moved Temporarily",
            StatusCode::UseProxy => "Use Proxy",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Unauthorized => "Unauthorized",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::ProxyAuthenticationRequired => "Proxy Authentication Required",
            StatusCode::RequestTimeout => "Request Timeout",
            StatusCode::TemporarilyUnavailable => "Temporarily Unavailable",
            StatusCode::CallOrTransactionDoesNotExist => "Call/Transaction Does Not Exist",
            StatusCode::BusyHere => "Busy Here",
            StatusCode::RequestTerminated => "Request Terminated",
            StatusCode::NotAcceptableHere => "Not Acceptable Here",
            StatusCode::ServerInternalError => "Server Internal Error",
            StatusCode::NotImplemented => "Not Implemented",
            StatusCode::ServiceUnavailable => "Service Unavailable",
            StatusCode::ServerTimeout => "Server Time-out",
            StatusCode::BusyEverywhere => "Busy Everywhere",
            StatusCode::Decline => "Decline",
            StatusCode::DoesNotExistAnywhere => "Does Not Exist Anywhere",
            StatusCode::Custom(_) => "Unknown",
        }
    }

    /// True for codes inside `100..=699`.
    pub fn is_valid(&self) -> bool {
        (100..700).contains(&self.as_u16())
    }

    pub fn is_provisional(&self) -> bool {
        (100..200).contains(&self.as_u16())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.as_u16())
    }

    pub fn is_redirection(&self) -> bool {
        (300..400).contains(&self.as_u16())
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.as_u16())
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.as_u16())
    }

    pub fn is_global_failure(&self) -> bool {
        (600..700).contains(&self.as_u16())
    }

    /// Any valid final response, 2xx through 6xx.
    pub fn is_final(&self) -> bool {
        (200..700).contains(&self.as_u16())
    }

    /// 3xx through 6xx.
    pub fn is_error(&self) -> bool {
        (300..700).contains(&self.as_u16())
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.as_u16())
    }
}

impl FromStr for StatusCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let code = s
            .trim()
            .parse::<u16>()
            .map_err(|_| Error::InvalidStartLine(format!("bad status code '{}'", s)))?;
        Self::from_u16(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(StatusCode::Ringing.is_provisional());
        assert!(StatusCode::Ok.is_success());
        assert!(StatusCode::Ok.is_final());
        assert!(!StatusCode::Ok.is_error());
        assert!(StatusCode::BusyHere.is_client_error());
        assert!(StatusCode::BusyHere.is_error());
        assert!(StatusCode::Decline.is_global_failure());
    }

    #[test]
    fn test_strict_and_raw_construction() {
        assert_eq!(StatusCode::from_u16(486).unwrap(), StatusCode::BusyHere);
        assert_eq!(StatusCode::from_u16(499).unwrap(), StatusCode::Custom(499));
        assert!(StatusCode::from_u16(99).is_err());
        assert!(StatusCode::from_u16(700).is_err());

        let raw = StatusCode::from_raw(750);
        assert_eq!(raw.as_u16(), 750);
        assert!(!raw.is_valid());
        assert!(!raw.is_final());
    }

    #[test]
    fn test_display_pads_to_three_digits() {
        assert_eq!(StatusCode::from_raw(42).to_string(), "042");
        assert_eq!(StatusCode::Ok.to_string(), "200");
    }
}
