use std::collections::HashMap;
use std::net::SocketAddrV4;
use std::sync::Arc;

use rand::Rng;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use tunnelmesh_peer::NatType;
use tunnelmesh_transport::UdpTransport;
use tunnelmesh_wire::{
    Frame, HandshakeMsgType, IntroRequestPayload, IntroResponsePayload, Prefix, PuncturePayload,
    PunctureRequestPayload, WireSocketAddr, SERVICE_HANDSHAKE,
};

use crate::error::{HandshakeError, Result};
use crate::nat::PunctureStats;
use crate::state::{Handshake, HANDSHAKE_TIMEOUT};

/// Drives the 4-message handshake (`spec.md` §4.5) against one peer,
/// correlating inbound IntroResponse/Puncture datagrams with outstanding
/// requests by their 16-bit identifier.
pub struct HandshakeManager {
    transport: Arc<UdpTransport>,
    community_id: [u8; 20],
    waiters: Mutex<HashMap<u16, oneshot::Sender<IntroResponsePayload>>>,
    puncture_waiters: Mutex<HashMap<u16, oneshot::Sender<()>>>,
    puncture_stats: Mutex<HashMap<[u8; 4], PunctureStats>>,
}

impl HandshakeManager {
    pub fn new(transport: Arc<UdpTransport>, community_id: [u8; 20]) -> Self {
        HandshakeManager {
            transport,
            community_id,
            waiters: Mutex::new(HashMap::new()),
            puncture_waiters: Mutex::new(HashMap::new()),
            puncture_stats: Mutex::new(HashMap::new()),
        }
    }

    fn prefix(&self) -> Prefix {
        Prefix::new(self.community_id, SERVICE_HANDSHAKE)
    }

    fn random_identifier(&self) -> u16 {
        rand::thread_rng().gen()
    }

    /// Sends IntroRequest to `dest` and awaits IntroResponse, driving a
    /// fresh [`Handshake`] through `IntroRequestSent` to
    /// `IntroResponseReceived` (or `TimedOut`/`Failed`).
    pub async fn intro_handshake(
        &self,
        dest: SocketAddrV4,
        source_lan: WireSocketAddr,
        source_wan: WireSocketAddr,
    ) -> Result<(Handshake, IntroResponsePayload)> {
        let identifier = self.random_identifier();
        let mut handshake = Handshake::new(identifier);

        let (tx, rx) = oneshot::channel();
        self.waiters.lock().await.insert(identifier, tx);

        let payload = IntroRequestPayload {
            destination: WireSocketAddr {
                ipv4: u32::from(dest.ip().to_owned()),
                port: dest.port(),
            },
            source_lan,
            source_wan,
            flags: 0,
            identifier,
        };
        let frame = Frame::encode(
            self.prefix(),
            HandshakeMsgType::IntroRequest as u8,
            &payload.encode(),
        );
        handshake.mark_intro_request_sent()?;

        if self.transport.send(&frame, dest).await.is_err() {
            self.waiters.lock().await.remove(&identifier);
            handshake.mark_failed();
            return Err(HandshakeError::TimedOut);
        }

        match tokio::time::timeout(HANDSHAKE_TIMEOUT, rx).await {
            Ok(Ok(response)) => {
                handshake.mark_intro_response_received()?;
                Ok((handshake, response))
            }
            _ => {
                self.waiters.lock().await.remove(&identifier);
                handshake.mark_failed();
                Err(HandshakeError::TimedOut)
            }
        }
    }

    /// Sends PunctureRequest to `candidate` and awaits the resulting
    /// Puncture datagram, updating per-candidate [`PunctureStats`] either
    /// way (`spec.md` §4.5 NAT inference).
    pub async fn request_puncture(
        &self,
        candidate: SocketAddrV4,
        identifier: u16,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.puncture_waiters.lock().await.insert(identifier, tx);

        let payload = PunctureRequestPayload {
            target: WireSocketAddr {
                ipv4: u32::from(candidate.ip().to_owned()),
                port: candidate.port(),
            },
            identifier,
        };
        let frame = Frame::encode(
            self.prefix(),
            HandshakeMsgType::PunctureRequest as u8,
            &payload.encode(),
        );
        let _ = self.transport.send(&frame, candidate).await;

        let key = candidate.ip().octets();
        let outcome = tokio::time::timeout(HANDSHAKE_TIMEOUT, rx).await;
        let mut stats = self.puncture_stats.lock().await;
        let entry = stats.entry(key).or_default();
        match outcome {
            Ok(Ok(())) => {
                entry.record_success();
                Ok(())
            }
            _ => {
                self.puncture_waiters.lock().await.remove(&identifier);
                entry.record_failure();
                Err(HandshakeError::TimedOut)
            }
        }
    }

    /// Feeds a decoded handshake-subprotocol frame to the manager, routing
    /// it to the matching waiter by identifier. Unmatched frames are
    /// dropped with a debug log rather than propagated as an error.
    pub async fn handle_frame(&self, message_type: u8, payload: &[u8]) {
        let msg_type = match HandshakeMsgType::from_byte(message_type) {
            Ok(t) => t,
            Err(_) => return,
        };
        match msg_type {
            HandshakeMsgType::IntroResponse => {
                let Ok(response) = IntroResponsePayload::decode(payload) else {
                    return;
                };
                let mut waiters = self.waiters.lock().await;
                if let Some(tx) = waiters.remove(&response.identifier) {
                    let _ = tx.send(response);
                } else {
                    debug!(identifier = response.identifier, "unmatched IntroResponse dropped");
                }
            }
            HandshakeMsgType::Puncture => {
                let Ok(puncture) = PuncturePayload::decode(payload) else {
                    return;
                };
                let mut waiters = self.puncture_waiters.lock().await;
                if let Some(tx) = waiters.remove(&puncture.identifier) {
                    let _ = tx.send(());
                } else {
                    debug!(identifier = puncture.identifier, "unmatched Puncture dropped");
                }
            }
            HandshakeMsgType::IntroRequest | HandshakeMsgType::PunctureRequest => {
                warn!("received a request-direction handshake message; no responder wired here");
            }
        }
    }

    /// Classifies a candidate's NAT behavior from its accumulated puncture
    /// stats (`spec.md` §4.5).
    pub async fn nat_type_of(&self, candidate: SocketAddrV4) -> NatType {
        let key = candidate.ip().octets();
        self.puncture_stats
            .lock()
            .await
            .get(&key)
            .map(|s| s.classify())
            .unwrap_or(NatType::Unknown)
    }
}
