//! Transaction identity.
//!
//! RFC 3261 Section 17.1.3 / 17.2.3: a transaction is matched by the branch
//! parameter of the top Via together with the method (the CSeq method for
//! responses). The identity string is `branch|METHOD`. Client and server
//! transactions live in separate tables, so `is_server` only disambiguates
//! keys that end up in shared structures such as the timer manager.

use std::fmt;

use sipua_sip_core::{HasHeaders, Method, Request, Response};

/// Separator between branch and method in the identity string.
pub const ID_SEPARATOR: char = '|';

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TransactionKey {
    pub branch: String,
    pub method: Method,
    pub is_server: bool,
}

impl TransactionKey {
    pub fn new(branch: impl Into<String>, method: Method, is_server: bool) -> Self {
        Self {
            branch: branch.into(),
            method,
            is_server,
        }
    }

    /// Server-side key of an inbound request.
    pub fn from_request(request: &Request) -> Option<Self> {
        let branch = request.branch()?;
        Some(Self::new(branch, request.method.clone(), true))
    }

    /// Client-side key of an inbound response.
    pub fn from_response(response: &Response) -> Option<Self> {
        let branch = response.branch()?;
        let cseq = response.cseq()?;
        Some(Self::new(branch, cseq.method, false))
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn is_server(&self) -> bool {
        self.is_server
    }

    pub fn with_method(&self, method: Method) -> Self {
        Self {
            branch: self.branch.clone(),
            method,
            is_server: self.is_server,
        }
    }

    /// `branch|METHOD`
    pub fn id(&self) -> String {
        format!("{}{}{}", self.branch, ID_SEPARATOR, self.method)
    }
}

impl fmt::Display for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.branch, ID_SEPARATOR, self.method)
    }
}

impl fmt::Debug for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = if self.is_server { "server" } else { "client" };
        write!(f, "Key({}{}{}:{})", self.branch, ID_SEPARATOR, self.method, side)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sipua_sip_core::{RequestBuilder, ResponseBuilder, StatusCode, Via};

    fn invite(branch: &str) -> Request {
        RequestBuilder::new(Method::Invite, "sip:bob@example.com")
            .via(&Via::new("UDP", "10.0.0.1", Some(5060)).with_branch(branch))
            .from("<sip:alice@example.com>;tag=a")
            .to("<sip:bob@example.com>")
            .call_id("key-test")
            .cseq(1)
            .build()
    }

    #[test]
    fn test_identity_string() {
        let key = TransactionKey::new("z9hG4bK-1", Method::Invite, false);
        assert_eq!(key.to_string(), "z9hG4bK-1|INVITE");
        assert_eq!(key.id(), "z9hG4bK-1|INVITE");
    }

    #[test]
    fn test_request_and_response_keys_match_up_to_side() {
        let request = invite("z9hG4bK-42");
        let response = ResponseBuilder::from_request(&request, StatusCode::Ringing).build();

        let server = TransactionKey::from_request(&request).unwrap();
        let client = TransactionKey::from_response(&response).unwrap();
        assert!(server.is_server());
        assert!(!client.is_server());
        assert_eq!(server.branch, client.branch);
        assert_eq!(server.method, client.method);
        assert_ne!(server, client);
    }

    #[test]
    fn test_response_key_uses_cseq_method() {
        let mut response = ResponseBuilder::from_request(&invite("z9hG4bK-7"), StatusCode::Ok).build();
        response.set_header("CSeq", "1 CANCEL");
        let key = TransactionKey::from_response(&response).unwrap();
        assert_eq!(key.method, Method::Cancel);
    }

    #[test]
    fn test_missing_branch_gives_no_key() {
        let mut request = invite("z9hG4bK-1");
        request.remove_header("Via");
        assert!(TransactionKey::from_request(&request).is_none());
    }

    #[test]
    fn test_with_method() {
        let key = TransactionKey::new("z9hG4bK-9", Method::Ack, true);
        assert_eq!(key.with_method(Method::Invite).to_string(), "z9hG4bK-9|INVITE");
    }
}
