//! Helpers for building transaction-level messages.

use uuid::Uuid;

use sipua_sip_core::{header, HasHeaders, Method, Request, Response, BRANCH_MAGIC_COOKIE};

use crate::error::{Error, Result};

/// Fresh RFC 3261 branch: the magic cookie followed by a random suffix.
pub fn generate_branch() -> String {
    format!("{}-{}", BRANCH_MAGIC_COOKIE, Uuid::new_v4().simple())
}

/// Builds the ACK an INVITE client transaction sends for a 3xx-6xx final
/// response (RFC 3261 Section 17.1.1.3).
///
/// The ACK reuses the INVITE's Request-URI, top Via, Route set, From and
/// Call-ID. To comes from the response so it carries the remote tag; CSeq
/// keeps the INVITE's sequence number with method ACK.
pub fn create_ack_for_error_response(invite: &Request, response: &Response) -> Result<Request> {
    let via = invite.top_via_raw().ok_or(Error::MissingHeader(header::VIA))?;
    let from = invite.header(header::FROM).ok_or(Error::MissingHeader(header::FROM))?;
    let call_id = invite.call_id().ok_or(Error::MissingHeader(header::CALL_ID))?;
    let cseq = invite.cseq().ok_or(Error::MissingHeader(header::CSEQ))?;
    let to = response
        .header(header::TO)
        .or_else(|| invite.header(header::TO))
        .ok_or(Error::MissingHeader(header::TO))?;

    let mut ack = Request::new(Method::Ack, invite.uri());
    ack.push_header(header::VIA, via);
    for route in invite.header_values(header::ROUTE) {
        ack.push_header(header::ROUTE, route);
    }
    ack.push_header(header::MAX_FORWARDS, "70");
    ack.push_header(header::FROM, from);
    ack.push_header(header::TO, to);
    ack.push_header(header::CALL_ID, call_id);
    ack.push_header(header::CSEQ, format!("{} {}", cseq.seq, Method::Ack));
    ack.push_header(header::CONTENT_LENGTH, "0");
    Ok(ack)
}
