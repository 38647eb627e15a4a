use sipua_sip_core::prelude::*;
use sipua_sip_core::{parse_request, parse_response};

const INVITE: &str = "INVITE sip:bob@biloxi.com SIP/2.0\r\n\
Via: SIP/2.0/UDP pc33.atlanta.com;branch=z9hG4bK776asdhds\r\n\
Max-Forwards: 70\r\n\
To: Bob <sip:bob@biloxi.com>\r\n\
From: Alice <sip:alice@atlanta.com>;tag=1928301774\r\n\
Call-ID: a84b4c76e66710@pc33.atlanta.com\r\n\
CSeq: 314159 INVITE\r\n\
Contact: <sip:alice@pc33.atlanta.com>\r\n\
Content-Type: application/sdp\r\n\
Content-Length: 4\r\n\
\r\n\
v=0\n";

#[test]
fn test_parse_rfc_invite() {
    let request = parse_request(INVITE.as_bytes()).unwrap();
    assert_eq!(request.method, Method::Invite);
    assert_eq!(request.uri, "sip:bob@biloxi.com");
    assert_eq!(request.branch().as_deref(), Some("z9hG4bK776asdhds"));
    assert_eq!(request.cseq(), Some(CSeq::new(314159, Method::Invite)));
    assert_eq!(request.call_id(), Some("a84b4c76e66710@pc33.atlanta.com"));
    assert_eq!(&request.body[..], b"v=0\n");
}

#[test]
fn test_serialized_request_parses_back() {
    let request = parse_request(INVITE.as_bytes()).unwrap();
    let reparsed = parse_request(&Message::from(request.clone()).to_bytes()).unwrap();
    assert_eq!(reparsed.method, request.method);
    assert_eq!(reparsed.headers, request.headers);
    assert_eq!(reparsed.body, request.body);
}

#[test]
fn test_parse_response_with_multiple_vias() {
    let raw = "SIP/2.0 486 Busy Here\r\n\
Via: SIP/2.0/UDP a.example.com;branch=z9hG4bK-top;received=1.2.3.4\r\n\
Via: SIP/2.0/UDP b.example.com;branch=z9hG4bK-second\r\n\
CSeq: 1 INVITE\r\n\
\r\n";
    let response = parse_response(raw.as_bytes()).unwrap();
    assert_eq!(response.status, StatusCode::BusyHere);
    assert_eq!(response.reason_phrase(), "Busy Here");
    let via = response.top_via().unwrap();
    assert_eq!(via.branch(), Some("z9hG4bK-top"));
    assert_eq!(via.received(), Some("1.2.3.4"));
    assert_eq!(response.header_values("Via").count(), 2);
}

#[test]
fn test_rejects_malformed_start_line() {
    assert!(parse_message(b"HELLO\r\n\r\n").is_err());
    assert!(parse_message(b"SIP/2.0 2000 OK\r\n\r\n").is_err());
}
