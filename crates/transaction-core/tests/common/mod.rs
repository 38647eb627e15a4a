//! Shared fixtures for the transaction-core integration tests.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;

use sipua_sip_core::prelude::*;
use sipua_sip_transport::{Error as TransportError, Transport, TransportEvent};
use sipua_transaction_core::prelude::*;

pub const LOCAL_ADDR: &str = "127.0.0.1:5060";
pub const REMOTE_ADDR: &str = "127.0.0.1:5070";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn local_addr() -> SocketAddr {
    LOCAL_ADDR.parse().unwrap()
}

pub fn remote_addr() -> SocketAddr {
    REMOTE_ADDR.parse().unwrap()
}

/// A message handed to the mock transport.
#[derive(Debug, Clone)]
pub struct Sent {
    pub message: Message,
    pub destination: SocketAddr,
    pub at: Instant,
}

/// Transport that records every send and can be told to fail.
#[derive(Debug)]
pub struct MockTransport {
    local: SocketAddr,
    sent_tx: mpsc::UnboundedSender<Sent>,
    fail_sends: AtomicBool,
    closed: AtomicBool,
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Sent>) {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            local: local_addr(),
            sent_tx,
            fail_sends: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        (transport, sent_rx)
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn local_addr(&self) -> sipua_sip_transport::Result<SocketAddr> {
        Ok(self.local)
    }

    async fn send_message(&self, message: Message, destination: SocketAddr) -> sipua_sip_transport::Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed(
                destination,
                io::Error::new(io::ErrorKind::Other, "mock send failure"),
            ));
        }
        let _ = self.sent_tx.send(Sent {
            message,
            destination,
            at: Instant::now(),
        });
        Ok(())
    }

    async fn send_raw(&self, data: Bytes, destination: SocketAddr) -> sipua_sip_transport::Result<()> {
        let message = parse_message(&data)
            .map_err(|e| TransportError::Io(io::Error::new(io::ErrorKind::InvalidData, e.to_string())))?;
        self.send_message(message, destination).await
    }

    async fn close(&self) -> sipua_sip_transport::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A manager over a fresh mock transport.
pub fn manager(
    config: Option<TransactionManagerConfig>,
) -> (
    TransactionManager,
    mpsc::Receiver<TransactionEvent>,
    Arc<MockTransport>,
    mpsc::UnboundedReceiver<Sent>,
) {
    init_tracing();
    let (transport, sent_rx) = MockTransport::new();
    let (manager, events_rx) = TransactionManager::new_sync(transport.clone(), config).unwrap();
    (manager, events_rx, transport, sent_rx)
}

pub fn invite_request(call_id: &str) -> Request {
    RequestBuilder::new(Method::Invite, "sip:bob@example.com")
        .from("Alice <sip:alice@example.com>;tag=1928301774")
        .to("Bob <sip:bob@example.com>")
        .call_id(call_id)
        .cseq(1)
        .contact("<sip:alice@127.0.0.1:5060>")
        .build()
}

pub fn non_invite_request(method: Method, call_id: &str) -> Request {
    RequestBuilder::new(method, "sip:bob@example.com")
        .from("Alice <sip:alice@example.com>;tag=1928301774")
        .to("Bob <sip:bob@example.com>")
        .call_id(call_id)
        .cseq(2)
        .build()
}

/// An inbound request as a remote client would send it.
pub fn inbound_request(method: Method, branch: &str) -> Request {
    RequestBuilder::new(method, "sip:alice@127.0.0.1:5060")
        .via(&Via::new("UDP", "127.0.0.1", Some(5070)).with_branch(branch))
        .from("Bob <sip:bob@example.com>;tag=a6c85cf")
        .to("Alice <sip:alice@example.com>")
        .call_id("inbound-call")
        .cseq(1)
        .build()
}

/// The ACK a remote client sends for a non-2xx final response.
pub fn inbound_ack(invite: &Request, branch: &str) -> Request {
    let mut ack = RequestBuilder::new(Method::Ack, invite.uri())
        .via(&Via::new("UDP", "127.0.0.1", Some(5070)).with_branch(branch))
        .from(invite.header(header::FROM).unwrap())
        .to(invite.header(header::TO).unwrap())
        .call_id(invite.call_id().unwrap())
        .build();
    ack.set_header(header::CSEQ, "1 ACK");
    ack
}

pub fn response_to(request: &Request, status: StatusCode) -> Response {
    ResponseBuilder::from_request(request, status).to_tag("8321234356").build()
}

pub fn received(message: impl Into<Message>) -> TransportEvent {
    TransportEvent::MessageReceived {
        message: message.into(),
        source: remote_addr(),
        destination: local_addr(),
    }
}

/// Next message sent through the mock, waiting (in virtual time) for it.
pub async fn next_sent(sent_rx: &mut mpsc::UnboundedReceiver<Sent>) -> Sent {
    tokio::time::timeout(Duration::from_secs(120), sent_rx.recv())
        .await
        .expect("timed out waiting for a send")
        .expect("mock transport dropped")
}

pub async fn next_event(events: &mut mpsc::Receiver<TransactionEvent>) -> TransactionEvent {
    tokio::time::timeout(Duration::from_secs(120), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// Lets spawned tasks drain their queues without advancing the clock much.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
