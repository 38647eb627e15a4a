//! SIP message model for the sipua stack.
//!
//! This crate holds the message types the transaction and transport layers
//! exchange: [`Request`], [`Response`] and [`Message`], the header helpers
//! they need ([`Via`], [`CSeq`]), a wire parser and fluent builders.

pub mod builder;
pub mod error;
pub mod parser;
pub mod types;

pub use builder::{RequestBuilder, ResponseBuilder};
pub use error::{Error, Result};
pub use parser::{parse_message, parse_request, parse_response};
pub use types::header;
pub use types::{
    CSeq, HasHeaders, Header, Message, Method, Request, Response, StatusCode, Via,
    BRANCH_MAGIC_COOKIE, SIP_VERSION,
};

pub mod prelude {
    pub use crate::{
        header, parse_message, CSeq, HasHeaders, Header, Message, Method, Request,
        RequestBuilder, Response, ResponseBuilder, StatusCode, Via, BRANCH_MAGIC_COOKIE,
    };
}
