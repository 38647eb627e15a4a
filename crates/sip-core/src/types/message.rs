//! SIP request, response and the `Message` sum type.
//!
//! Messages are plain owned values. Header access is by name (see
//! [`crate::types::header`]); a few typed accessors cover what the
//! transaction layer needs: the top Via, CSeq and Call-ID.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::cseq::CSeq;
use crate::types::header::{self, split_comma_values, Header};
use crate::types::method::Method;
use crate::types::status::StatusCode;
use crate::types::via::Via;

pub const SIP_VERSION: &str = "SIP/2.0";

/// Shared header-list behaviour of requests and responses.
pub trait HasHeaders {
    fn headers(&self) -> &[Header];
    fn headers_mut(&mut self) -> &mut Vec<Header>;

    /// Value of the first header with this name.
    fn header(&self, name: &str) -> Option<&str> {
        self.headers()
            .iter()
            .find(|h| h.is(name))
            .map(|h| h.value.as_str())
    }

    /// All values for this name, in order.
    fn header_values<'a>(&'a self, name: &'a str) -> Box<dyn Iterator<Item = &'a str> + 'a> {
        Box::new(
            self.headers()
                .iter()
                .filter(move |h| h.is(name))
                .map(|h| h.value.as_str()),
        )
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers().iter().any(|h| h.is(name))
    }

    /// Appends a header after existing ones.
    fn push_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers_mut().push(Header::new(name, value));
    }

    /// Replaces every header of this name with a single value at the
    /// position of the first one (or at the end if absent).
    fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let headers = self.headers_mut();
        match headers.iter().position(|h| h.is(name)) {
            Some(pos) => {
                headers[pos] = Header::new(name, value);
                let mut index = 0;
                headers.retain(|h| {
                    let keep = index <= pos || !h.is(name);
                    index += 1;
                    keep
                });
            }
            None => headers.push(Header::new(name, value)),
        }
    }

    fn remove_header(&mut self, name: &str) {
        self.headers_mut().retain(|h| !h.is(name));
    }

    /// Parsed top-most Via value.
    fn top_via(&self) -> Option<Via> {
        let first = self.header(header::VIA)?;
        let top = split_comma_values(first).into_iter().next()?;
        top.parse().ok()
    }

    /// Inserts a Via above all existing ones.
    fn push_top_via(&mut self, via: &Via) {
        self.headers_mut()
            .insert(0, Header::new(header::VIA, via.to_string()));
    }

    /// Rewrites the top-most Via value in place.
    fn replace_top_via(&mut self, via: &Via) -> Result<()> {
        let headers = self.headers_mut();
        let pos = headers
            .iter()
            .position(|h| h.is(header::VIA))
            .ok_or(Error::MissingHeader(header::VIA))?;
        let mut values: Vec<String> = split_comma_values(&headers[pos].value)
            .into_iter()
            .map(str::to_string)
            .collect();
        if values.is_empty() {
            return Err(Error::MissingHeader(header::VIA));
        }
        values[0] = via.to_string();
        headers[pos].value = values.join(", ");
        Ok(())
    }

    /// First comma-separated value of the top Via header, verbatim.
    fn top_via_raw(&self) -> Option<&str> {
        let first = self.header(header::VIA)?;
        split_comma_values(first).into_iter().next()
    }

    /// Branch parameter of the top Via.
    fn branch(&self) -> Option<String> {
        self.top_via().and_then(|via| via.branch().map(str::to_string))
    }

    fn cseq(&self) -> Option<CSeq> {
        self.header(header::CSEQ).and_then(|v| v.parse().ok())
    }

    fn call_id(&self) -> Option<&str> {
        self.header(header::CALL_ID).map(str::trim)
    }
}

/// A SIP request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub method: Method,
    pub uri: String,
    pub headers: Vec<Header>,
    pub body: Bytes,
}

impl Request {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

impl HasHeaders for Request {
    fn headers(&self) -> &[Header] {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut Vec<Header> {
        &mut self.headers
    }
}

/// A SIP response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: StatusCode,
    pub reason: String,
    pub headers: Vec<Header>,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            reason: status.reason_phrase().to_string(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    pub fn reason_phrase(&self) -> &str {
        &self.reason
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

impl HasHeaders for Response {
    fn headers(&self) -> &[Header] {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut Vec<Header> {
        &mut self.headers
    }
}

/// Either a request or a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Request(Request),
    Response(Response),
}

impl Message {
    pub fn is_request(&self) -> bool {
        matches!(self, Message::Request(_))
    }

    pub fn is_response(&self) -> bool {
        matches!(self, Message::Response(_))
    }

    pub fn as_request(&self) -> Option<&Request> {
        match self {
            Message::Request(r) => Some(r),
            Message::Response(_) => None,
        }
    }

    pub fn as_response(&self) -> Option<&Response> {
        match self {
            Message::Response(r) => Some(r),
            Message::Request(_) => None,
        }
    }

    /// The method the message belongs to: the request method, or the CSeq
    /// method of a response.
    pub fn method(&self) -> Option<Method> {
        match self {
            Message::Request(r) => Some(r.method.clone()),
            Message::Response(r) => r.cseq().map(|c| c.method),
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.to_string())
    }
}

impl HasHeaders for Message {
    fn headers(&self) -> &[Header] {
        match self {
            Message::Request(r) => &r.headers,
            Message::Response(r) => &r.headers,
        }
    }

    fn headers_mut(&mut self) -> &mut Vec<Header> {
        match self {
            Message::Request(r) => &mut r.headers,
            Message::Response(r) => &mut r.headers,
        }
    }
}

impl From<Request> for Message {
    fn from(request: Request) -> Self {
        Message::Request(request)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Message::Response(response)
    }
}

// Content-Length is always regenerated from the body.
fn write_headers_and_body(f: &mut fmt::Formatter<'_>, headers: &[Header], body: &Bytes) -> fmt::Result {
    for h in headers.iter().filter(|h| !h.is(header::CONTENT_LENGTH)) {
        write!(f, "{}\r\n", h)?;
    }
    write!(f, "{}: {}\r\n\r\n", header::CONTENT_LENGTH, body.len())?;
    if !body.is_empty() {
        f.write_str(&String::from_utf8_lossy(body))?;
    }
    Ok(())
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}\r\n", self.method, self.uri, SIP_VERSION)?;
        write_headers_and_body(f, &self.headers, &self.body)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}\r\n", SIP_VERSION, self.status, self.reason)?;
        write_headers_and_body(f, &self.headers, &self.body)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Request(r) => r.fmt(f),
            Message::Response(r) => r.fmt(f),
        }
    }
}
