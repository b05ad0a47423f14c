use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::metrics::TransportMetrics;

/// Maximum UDP payload length this transport will send (`spec.md` §4.1).
pub const MAX_DATAGRAM_LEN: usize = 65507;

/// Capacity of the broadcast channel that fans inbound datagrams out to
/// subscribers. A slow subscriber drops the oldest unread datagrams rather
/// than stalling the receive loop.
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 1024;

/// An inbound datagram and the endpoint it arrived from.
#[derive(Debug, Clone)]
pub struct Datagram {
    pub bytes: Vec<u8>,
    pub source: SocketAddrV4,
}

/// UDP transport (C1): bind, send, and an event stream of received
/// datagrams. Built on `tokio::net::UdpSocket`, whose `send_to` is safe to
/// call concurrently from multiple tasks sharing the same socket, so senders
/// never contend with the single receive-loop task.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddrV4,
    metrics: Arc<TransportMetrics>,
    events: broadcast::Sender<Datagram>,
    receive_task: JoinHandle<()>,
}

impl UdpTransport {
    /// Binds a UDP socket on `port` (0 selects an ephemeral port) and spawns
    /// the receive loop. Bind failure is fatal to startup
    /// (`Transport/BindError`).
    pub async fn start(port: u16) -> Result<Self> {
        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|source| TransportError::BindError { port, source })?;
        let local_addr = match socket.local_addr() {
            Ok(std::net::SocketAddr::V4(addr)) => addr,
            _ => bind_addr,
        };
        let socket = Arc::new(socket);
        let metrics = Arc::new(TransportMetrics::default());
        let (events, _) = broadcast::channel(SUBSCRIBER_CHANNEL_CAPACITY);

        let receive_task = tokio::spawn(receive_loop(socket.clone(), metrics.clone(), events.clone()));

        Ok(UdpTransport {
            socket,
            local_addr,
            metrics,
            events,
            receive_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddrV4 {
        self.local_addr
    }

    pub fn metrics(&self) -> &TransportMetrics {
        &self.metrics
    }

    /// Subscribes to the "datagram received" event stream (`spec.md`
    /// §4.1). Each subscriber gets its own lagging-tolerant queue.
    pub fn subscribe(&self) -> broadcast::Receiver<Datagram> {
        self.events.subscribe()
    }

    /// Sends `bytes` to `dest`. Rejects datagrams over [`MAX_DATAGRAM_LEN`]
    /// before touching the socket. A send failure increments a counter but
    /// is also returned to the caller — per `spec.md` §4.1 it "does not
    /// propagate as fatal" to the transport itself, but the immediate
    /// request still needs to know it failed.
    pub async fn send(&self, bytes: &[u8], dest: SocketAddrV4) -> Result<usize> {
        if bytes.len() > MAX_DATAGRAM_LEN {
            return Err(TransportError::DatagramTooLarge(bytes.len()));
        }
        match self.socket.send_to(bytes, dest).await {
            Ok(n) => {
                self.metrics.record_sent(n);
                Ok(n)
            }
            Err(e) => {
                self.metrics.record_send_error();
                warn!(error = %e, %dest, "udp send failed");
                Err(TransportError::SendError(e))
            }
        }
    }

    /// Stops the receive loop. Idempotent with respect to resource safety:
    /// the socket and channel are dropped with `self`.
    pub fn stop(&self) {
        self.receive_task.abort();
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.receive_task.abort();
    }
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    metrics: Arc<TransportMetrics>,
    events: broadcast::Sender<Datagram>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((n, std::net::SocketAddr::V4(source))) => {
                metrics.record_received(n);
                let datagram = Datagram {
                    bytes: buf[..n].to_vec(),
                    source,
                };
                // No subscribers is not an error; the datagram is simply
                // unobserved.
                let _ = events.send(datagram);
            }
            Ok((_, std::net::SocketAddr::V6(_))) => {
                debug!("dropped inbound IPv6 datagram; this transport is IPv4-only");
            }
            Err(e) => {
                warn!(error = %e, "udp recv_from failed");
            }
        }
    }
}
