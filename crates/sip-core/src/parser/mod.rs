//! Wire parser for SIP messages.
//!
//! Start lines and header lines are parsed with `nom`. The header section
//! is unfolded (continuation lines starting with SP/HTAB are joined) before
//! each line is split into name and value. The body is taken according to
//! Content-Length when present, otherwise everything after the blank line.

use bytes::Bytes;
use nom::{
    bytes::complete::{tag, take_till, take_till1, take_while1, take_while_m_n},
    character::complete::{char, space0, space1},
    combinator::{all_consuming, map_res, opt, rest},
    sequence::{preceded, separated_pair, tuple},
    IResult,
};
use tracing::trace;

use crate::error::{Error, Result};
use crate::types::header::{self, Header};
use crate::types::message::{Message, Request, Response};
use crate::types::method::Method;
use crate::types::status::StatusCode;

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-.!%*_+`'~".contains(c)
}

fn sip_version(input: &str) -> IResult<&str, &str> {
    tag("SIP/2.0")(input)
}

// Request-Line = Method SP Request-URI SP SIP-Version
fn request_line(input: &str) -> IResult<&str, (Method, &str)> {
    let (input, method) =
        map_res(take_while1(is_token_char), |s: &str| s.parse::<Method>())(input)?;
    let (input, _) = space1(input)?;
    let (input, uri) = take_till1(|c: char| c == ' ')(input)?;
    let (input, _) = space1(input)?;
    let (input, _) = sip_version(input)?;
    Ok((input, (method, uri)))
}

// Status-Line = SIP-Version SP Status-Code SP Reason-Phrase
fn status_line(input: &str) -> IResult<&str, (u16, &str)> {
    let (input, _) = sip_version(input)?;
    let (input, _) = space1(input)?;
    let (input, code) = map_res(
        take_while_m_n(3, 3, |c: char| c.is_ascii_digit()),
        |s: &str| s.parse::<u16>(),
    )(input)?;
    let (input, reason) =
        opt(preceded(space1, take_till(|c: char| c == '\r' || c == '\n')))(input)?;
    Ok((input, (code, reason.unwrap_or(""))))
}

fn header_line(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(
        take_while1(is_token_char),
        tuple((space0, char(':'), space0)),
        rest,
    )(input)
}

/// Splits raw input into the head (start line + headers) and the rest.
fn split_head(data: &[u8]) -> Option<(&[u8], &[u8])> {
    if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
        return Some((&data[..pos], &data[pos + 4..]));
    }
    data.windows(2)
        .position(|w| w == b"\n\n")
        .map(|pos| (&data[..pos], &data[pos + 2..]))
}

fn unfold_lines(head: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for line in head.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = lines.last_mut() {
                last.push(' ');
                last.push_str(line.trim());
                continue;
            }
        }
        lines.push(line.to_string());
    }
    lines
}

fn parse_headers(lines: &[String]) -> Result<Vec<Header>> {
    lines
        .iter()
        .filter(|l| !l.is_empty())
        .map(|line| {
            let (_, (name, value)) =
                header_line(line).map_err(|_| Error::InvalidHeader(line.clone()))?;
            Ok(Header::new(header::canonical_name(name), value.trim()))
        })
        .collect()
}

/// Parses one complete SIP message from a datagram or framed buffer.
pub fn parse_message(data: &[u8]) -> Result<Message> {
    // Leading CRLFs are keep-alives (RFC 3261 7.5)
    let start = data
        .iter()
        .position(|b| *b != b'\r' && *b != b'\n')
        .ok_or(Error::Incomplete)?;
    let (head, remainder) = split_head(&data[start..]).ok_or(Error::Incomplete)?;
    let head = std::str::from_utf8(head)?;

    let lines = unfold_lines(head);
    let (first, header_lines) = lines.split_first().ok_or(Error::Incomplete)?;
    let headers = parse_headers(header_lines)?;

    let body_len = headers
        .iter()
        .find(|h| h.is(header::CONTENT_LENGTH))
        .and_then(|h| h.value.trim().parse::<usize>().ok())
        .map(|len| len.min(remainder.len()))
        .unwrap_or(remainder.len());
    let body = Bytes::copy_from_slice(&remainder[..body_len]);

    let message = if first.starts_with("SIP/") {
        let (_, (code, reason)) =
            all_consuming(status_line)(first.as_str()).map_err(|_| Error::InvalidStartLine(first.clone()))?;
        let mut response = Response::new(StatusCode::from_raw(code));
        response.reason = reason.to_string();
        response.headers = headers;
        response.body = body;
        Message::Response(response)
    } else {
        let (_, (method, uri)) =
            all_consuming(request_line)(first.as_str()).map_err(|_| Error::InvalidStartLine(first.clone()))?;
        let mut request = Request::new(method, uri);
        request.headers = headers;
        request.body = body;
        Message::Request(request)
    };

    trace!(method = ?message.method(), "parsed SIP message");
    Ok(message)
}

pub fn parse_request(data: &[u8]) -> Result<Request> {
    match parse_message(data)? {
        Message::Request(r) => Ok(r),
        Message::Response(_) => Err(Error::InvalidStartLine("expected a request".to_string())),
    }
}

pub fn parse_response(data: &[u8]) -> Result<Response> {
    match parse_message(data)? {
        Message::Response(r) => Ok(r),
        Message::Request(_) => Err(Error::InvalidStartLine("expected a response".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::message::HasHeaders;

    #[test]
    fn test_folded_header_is_joined() {
        let raw = b"OPTIONS sip:a@b SIP/2.0\r\nSubject: hello\r\n  world\r\nCSeq: 1 OPTIONS\r\n\r\n";
        let request = parse_request(raw).unwrap();
        assert_eq!(request.header("Subject"), Some("hello world"));
    }

    #[test]
    fn test_compact_names_are_expanded() {
        let raw = b"OPTIONS sip:a@b SIP/2.0\r\nv: SIP/2.0/UDP h;branch=z9hG4bK1\r\ni: id1\r\n\r\n";
        let request = parse_request(raw).unwrap();
        assert_eq!(request.headers[0].name, "Via");
        assert_eq!(request.call_id(), Some("id1"));
    }

    #[test]
    fn test_status_line_without_reason() {
        let raw = b"SIP/2.0 200\r\nCSeq: 1 INVITE\r\n\r\n";
        let response = parse_response(raw).unwrap();
        assert_eq!(response.status, StatusCode::Ok);
        assert_eq!(response.reason, "");
    }

    #[test]
    fn test_out_of_range_code_is_kept() {
        let raw = b"SIP/2.0 999 Weird\r\nCSeq: 1 INVITE\r\n\r\n";
        let response = parse_response(raw).unwrap();
        assert_eq!(response.status_code(), 999);
        assert!(!response.status.is_valid());
    }

    #[test]
    fn test_body_honours_content_length() {
        let raw = b"MESSAGE sip:a@b SIP/2.0\r\nContent-Length: 3\r\n\r\nabcdef";
        let request = parse_request(raw).unwrap();
        assert_eq!(&request.body[..], b"abc");
    }

    #[test]
    fn test_incomplete_head() {
        assert_eq!(
            parse_message(b"INVITE sip:a@b SIP/2.0\r\nVia: x"),
            Err(Error::Incomplete)
        );
        assert_eq!(parse_message(b"\r\n\r\n"), Err(Error::Incomplete));
    }
}
