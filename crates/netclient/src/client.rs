use std::collections::HashMap;
use std::net::SocketAddrV4;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tracing::debug;

use tunnelmesh_transport::UdpTransport;
use tunnelmesh_wire::{
    CircuitMsgType, CreatePayload, CreatedPayload, DestroyPayload, ExtendPayload, ExtendedPayload,
    Frame, Prefix, SERVICE_CIRCUIT,
};

use crate::error::{NetworkError, Result};

/// Default time `send_create`/`send_extend` wait for a matching response
/// before failing with `Network/Timeout` (`spec.md` §4.7).
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Network client for the circuit subprotocol (C7): maintains two waiter
/// maps keyed by identifier, one for CREATE and one for EXTEND, and routes
/// inbound CREATED/EXTENDED frames to them.
pub struct CircuitNetworkClient {
    transport: Arc<UdpTransport>,
    community_id: [u8; 20],
    timeout: Duration,
    create_waiters: Mutex<HashMap<u16, oneshot::Sender<CreatedPayload>>>,
    extend_waiters: Mutex<HashMap<u16, oneshot::Sender<ExtendedPayload>>>,
    unmatched_frames: std::sync::atomic::AtomicU64,
}

impl CircuitNetworkClient {
    pub fn new(transport: Arc<UdpTransport>, community_id: [u8; 20]) -> Self {
        CircuitNetworkClient {
            transport,
            community_id,
            timeout: DEFAULT_RESPONSE_TIMEOUT,
            create_waiters: Mutex::new(HashMap::new()),
            extend_waiters: Mutex::new(HashMap::new()),
            unmatched_frames: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn prefix(&self) -> Prefix {
        Prefix::new(self.community_id, SERVICE_CIRCUIT)
    }

    pub fn unmatched_frame_count(&self) -> u64 {
        self.unmatched_frames.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Sends CREATE to `relay` and returns a future resolving to the
    /// CREATED payload (`spec.md` §4.7).
    pub async fn send_create(
        &self,
        relay: SocketAddrV4,
        circuit_id: u32,
        identifier: u16,
        node_public_key: [u8; 32],
        ephemeral_pub: [u8; 32],
    ) -> Result<CreatedPayload> {
        let (tx, rx) = oneshot::channel();
        self.create_waiters.lock().await.insert(identifier, tx);

        let payload = CreatePayload {
            circuit_id,
            identifier,
            node_public_key,
            ephemeral_pubkey: ephemeral_pub,
        };
        let frame = Frame::encode(self.prefix(), CircuitMsgType::Create as u8, &payload.encode());
        self.transport.send(&frame, relay).await?;

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(created)) => Ok(created),
            _ => {
                self.create_waiters.lock().await.remove(&identifier);
                Err(NetworkError::Timeout)
            }
        }
    }

    /// Sends EXTEND to `via_relay` (the current last hop) carrying the next
    /// relay's address and the new ephemeral-pub, returning the EXTENDED
    /// payload (`spec.md` §4.7).
    pub async fn send_extend(
        &self,
        via_relay: SocketAddrV4,
        circuit_id: u32,
        identifier: u16,
        next_relay_public_key: [u8; 32],
        next_relay_addr: SocketAddrV4,
        ephemeral_pub: [u8; 32],
    ) -> Result<ExtendedPayload> {
        let (tx, rx) = oneshot::channel();
        self.extend_waiters.lock().await.insert(identifier, tx);

        let payload = ExtendPayload {
            circuit_id,
            node_public_key: next_relay_public_key,
            ipv4: u32::from(next_relay_addr.ip().to_owned()),
            port: next_relay_addr.port(),
            identifier,
        };
        // ephemeral_pub has no field in the EXTEND wire payload itself;
        // the caller correlates it with the ephemeral-pub EXTENDED echoes
        // back once this resolves.
        let _ = ephemeral_pub;
        let frame = Frame::encode(self.prefix(), CircuitMsgType::Extend as u8, &payload.encode());
        self.transport.send(&frame, via_relay).await?;

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(extended)) => Ok(extended),
            _ => {
                self.extend_waiters.lock().await.remove(&identifier);
                Err(NetworkError::Timeout)
            }
        }
    }

    /// Fire-and-forget circuit teardown (`spec.md` §4.7): no response is
    /// awaited.
    pub async fn send_destroy(&self, dest: SocketAddrV4, circuit_id: u32, reason: u16) {
        let payload = DestroyPayload { circuit_id, reason };
        let frame = Frame::encode(self.prefix(), CircuitMsgType::Destroy as u8, &payload.encode());
        let _ = self.transport.send(&frame, dest).await;
    }

    /// Routes a decoded circuit-subprotocol frame to the matching waiter.
    /// Unmatched frames increment a counter rather than erroring
    /// (`spec.md` §4.7).
    pub async fn handle_frame(&self, message_type: u8, payload: &[u8]) {
        let Ok(msg_type) = CircuitMsgType::from_byte(message_type) else {
            return;
        };
        match msg_type {
            CircuitMsgType::Created => {
                let Ok(created) = CreatedPayload::decode(payload) else {
                    return;
                };
                let mut waiters = self.create_waiters.lock().await;
                if let Some(tx) = waiters.remove(&created.identifier) {
                    let _ = tx.send(created);
                } else {
                    drop(waiters);
                    self.note_unmatched(created.identifier, "CREATED");
                }
            }
            CircuitMsgType::Extended => {
                let Ok(extended) = ExtendedPayload::decode(payload) else {
                    return;
                };
                let mut waiters = self.extend_waiters.lock().await;
                if let Some(tx) = waiters.remove(&extended.identifier) {
                    let _ = tx.send(extended);
                } else {
                    drop(waiters);
                    self.note_unmatched(extended.identifier, "EXTENDED");
                }
            }
            CircuitMsgType::Create | CircuitMsgType::Extend | CircuitMsgType::Destroy => {
                debug!(?msg_type, "request-direction circuit message; no relay responder wired here");
            }
        }
    }

    fn note_unmatched(&self, identifier: u16, kind: &str) {
        self.unmatched_frames.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        debug!(identifier, kind, "unmatched circuit frame dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn client() -> CircuitNetworkClient {
        let transport = Arc::new(UdpTransport::start(0).await.unwrap());
        CircuitNetworkClient::new(transport, [0u8; 20])
    }

    #[tokio::test]
    async fn handle_frame_resolves_matching_created_waiter() {
        let client = client().await;
        let (tx, rx) = oneshot::channel();
        client.create_waiters.lock().await.insert(3, tx);

        let created = CreatedPayload {
            circuit_id: 1,
            identifier: 3,
            ephemeral_pubkey: [1u8; 32],
            auth: [2u8; 32],
            candidates: vec![],
        };
        client
            .handle_frame(CircuitMsgType::Created as u8, &created.encode())
            .await;

        assert_eq!(rx.await.unwrap(), created);
    }

    #[tokio::test]
    async fn unmatched_created_increments_counter() {
        let client = client().await;
        let created = CreatedPayload {
            circuit_id: 1,
            identifier: 99,
            ephemeral_pubkey: [1u8; 32],
            auth: [2u8; 32],
            candidates: vec![],
        };
        client
            .handle_frame(CircuitMsgType::Created as u8, &created.encode())
            .await;
        assert_eq!(client.unmatched_frame_count(), 1);
    }

    #[tokio::test]
    async fn send_create_times_out_with_no_responder() {
        let client = client().await.with_timeout(Duration::from_millis(50));
        let dest = SocketAddrV4::new(std::net::Ipv4Addr::LOCALHOST, 1);
        let result = client
            .send_create(dest, 1, 1, [0u8; 32], [0u8; 32])
            .await;
        assert!(matches!(result, Err(NetworkError::Timeout)));
    }

    #[tokio::test]
    async fn send_destroy_does_not_block_on_a_response() {
        let client = client().await;
        let dest = SocketAddrV4::new(std::net::Ipv4Addr::LOCALHOST, 1);
        client.send_destroy(dest, 1, 0).await;
    }
}
