//! Fluent builders for requests and responses.
//!
//! ```
//! use sipua_sip_core::prelude::*;
//!
//! let request = RequestBuilder::new(Method::Invite, "sip:bob@example.com")
//!     .from("<sip:alice@example.com>;tag=1928301774")
//!     .to("<sip:bob@example.com>")
//!     .call_id("a84b4c76e66710")
//!     .cseq(314159)
//!     .build();
//!
//! let ringing = ResponseBuilder::from_request(&request, StatusCode::Ringing)
//!     .to_tag("a6c85cf")
//!     .build();
//! assert_eq!(ringing.cseq().unwrap().seq, 314159);
//! ```

use bytes::Bytes;

use crate::types::cseq::CSeq;
use crate::types::header::{self, Header};
use crate::types::message::{HasHeaders, Request, Response};
use crate::types::method::Method;
use crate::types::status::StatusCode;
use crate::types::via::Via;

pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            request: Request::new(method, uri),
        }
    }

    pub fn via(mut self, via: &Via) -> Self {
        self.request.push_header(header::VIA, via.to_string());
        self
    }

    pub fn from(mut self, value: impl Into<String>) -> Self {
        self.request.set_header(header::FROM, value);
        self
    }

    pub fn to(mut self, value: impl Into<String>) -> Self {
        self.request.set_header(header::TO, value);
        self
    }

    pub fn call_id(mut self, value: impl Into<String>) -> Self {
        self.request.set_header(header::CALL_ID, value);
        self
    }

    /// CSeq with the request's own method.
    pub fn cseq(mut self, seq: u32) -> Self {
        let cseq = CSeq::new(seq, self.request.method.clone());
        self.request.set_header(header::CSEQ, cseq.to_string());
        self
    }

    pub fn max_forwards(mut self, hops: u32) -> Self {
        self.request.set_header(header::MAX_FORWARDS, hops.to_string());
        self
    }

    pub fn route(mut self, value: impl Into<String>) -> Self {
        self.request.push_header(header::ROUTE, value);
        self
    }

    pub fn contact(mut self, value: impl Into<String>) -> Self {
        self.request.set_header(header::CONTACT, value);
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.request.push_header(name, value);
        self
    }

    pub fn body(mut self, content_type: &str, body: impl Into<Bytes>) -> Self {
        self.request.set_header(header::CONTENT_TYPE, content_type);
        self.request.body = body.into();
        self
    }

    pub fn build(mut self) -> Request {
        if !self.request.has_header(header::MAX_FORWARDS) {
            self.request.push_header(header::MAX_FORWARDS, "70");
        }
        self.request
    }
}

pub struct ResponseBuilder {
    response: Response,
}

impl ResponseBuilder {
    pub fn new(status: StatusCode) -> Self {
        Self {
            response: Response::new(status),
        }
    }

    /// Starts a response to `request`, copying Via, From, To, Call-ID and
    /// CSeq as RFC 3261 Section 8.2.6.2 requires.
    pub fn from_request(request: &Request, status: StatusCode) -> Self {
        let mut response = Response::new(status);
        for h in request.headers() {
            if h.is(header::VIA)
                || h.is(header::FROM)
                || h.is(header::TO)
                || h.is(header::CALL_ID)
                || h.is(header::CSEQ)
            {
                response.headers.push(Header::new(header::canonical_name(&h.name), h.value.clone()));
            }
        }
        Self { response }
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.response.reason = reason.into();
        self
    }

    /// Adds a tag to the To header unless it already carries one.
    pub fn to_tag(mut self, tag: &str) -> Self {
        if let Some(to) = self.response.header(header::TO).map(str::to_string) {
            if !to.contains(";tag=") {
                self.response.set_header(header::TO, format!("{};tag={}", to, tag));
            }
        }
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.response.push_header(name, value);
        self
    }

    pub fn body(mut self, content_type: &str, body: impl Into<Bytes>) -> Self {
        self.response.set_header(header::CONTENT_TYPE, content_type);
        self.response.body = body.into();
        self
    }

    pub fn build(self) -> Response {
        self.response
    }
}
