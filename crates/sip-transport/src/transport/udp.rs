use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, trace, warn};

use sipua_sip_core::{parse_message, Message};

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportEvent, TransportType};

// Maximum UDP payload over IPv4
const MAX_UDP_PACKET_SIZE: usize = 65_507;
const UDP_BUFFER_SIZE: usize = 65_535;
const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// UDP transport for SIP messages
#[derive(Clone)]
pub struct UdpTransport {
    inner: Arc<UdpTransportInner>,
}

struct UdpTransportInner {
    socket: UdpSocket,
    closed: AtomicBool,
    shutdown: Notify,
    events_tx: mpsc::Sender<TransportEvent>,
}

impl UdpTransport {
    /// Binds a socket and starts the receive loop. Inbound traffic is
    /// delivered on the returned channel.
    pub async fn bind(
        addr: SocketAddr,
        channel_capacity: Option<usize>,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| Error::BindFailed(addr, e))?;

        let local_addr = socket.local_addr()?;
        info!("SIP UDP transport bound to {}", local_addr);

        let capacity = channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(capacity);

        let transport = UdpTransport {
            inner: Arc::new(UdpTransportInner {
                socket,
                closed: AtomicBool::new(false),
                shutdown: Notify::new(),
                events_tx,
            }),
        };

        transport.spawn_receive_loop();

        Ok((transport, events_rx))
    }

    fn spawn_receive_loop(&self) {
        let transport = self.clone();
        tokio::spawn(async move {
            let inner = &transport.inner;
            let mut buffer = vec![0u8; UDP_BUFFER_SIZE];

            while !inner.closed.load(Ordering::Acquire) {
                let received = tokio::select! {
                    result = inner.socket.recv_from(&mut buffer) => result,
                    _ = inner.shutdown.notified() => break,
                };

                let (len, src) = match received {
                    Ok(pair) => pair,
                    Err(e) => {
                        if inner.closed.load(Ordering::Acquire) {
                            break;
                        }
                        error!("Error receiving UDP packet: {}", e);
                        let _ = inner
                            .events_tx
                            .send(TransportEvent::Error {
                                error: format!("Error receiving packet: {}", e),
                            })
                            .await;
                        continue;
                    }
                };

                let packet = &buffer[..len];

                // Bare CRLF keep-alives carry no message
                if packet.iter().all(|b| *b == b'\r' || *b == b'\n') {
                    trace!("Ignoring {} byte keep-alive from {}", len, src);
                    continue;
                }

                let local_addr = match inner.socket.local_addr() {
                    Ok(addr) => addr,
                    Err(e) => {
                        error!("Error getting local address: {}", e);
                        continue;
                    }
                };

                match parse_message(packet) {
                    Ok(message) => {
                        debug!("Received SIP message from {}", src);
                        let event = TransportEvent::MessageReceived {
                            message,
                            source: src,
                            destination: local_addr,
                        };
                        if let Err(e) = inner.events_tx.send(event).await {
                            error!("Error sending event: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Error parsing SIP message from {}: {}", src, e);
                        let _ = inner
                            .events_tx
                            .send(TransportEvent::Error {
                                error: format!("Error parsing SIP message: {}", e),
                            })
                            .await;
                    }
                }
            }

            debug!("UDP receive loop finished");
            let _ = inner.events_tx.send(TransportEvent::Closed).await;
        });
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.socket.local_addr().map_err(Error::from)
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Udp
    }

    async fn send_message(&self, message: Message, destination: SocketAddr) -> Result<()> {
        self.send_raw(message.to_bytes(), destination).await
    }

    async fn send_raw(&self, data: Bytes, destination: SocketAddr) -> Result<()> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }
        if data.len() > MAX_UDP_PACKET_SIZE {
            return Err(Error::PacketTooLarge(data.len(), MAX_UDP_PACKET_SIZE));
        }

        self.inner
            .socket
            .send_to(&data, destination)
            .await
            .map_err(|e| Error::SendFailed(destination, e))?;

        trace!("Sent {} bytes to {}", data.len(), destination);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            self.inner.shutdown.notify_one();
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.socket.local_addr() {
            Ok(addr) => write!(f, "UdpTransport({})", addr),
            Err(_) => write!(f, "UdpTransport(<error>)"),
        }
    }
}
