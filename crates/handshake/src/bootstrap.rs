use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use tunnelmesh_peer::{Peer, PeerTable, BOOTSTRAP_ENDPOINTS};
use tunnelmesh_wire::WireSocketAddr;

use crate::manager::HandshakeManager;

/// How many already-known peers a refresh pass reprobes each time it fires
/// (`spec.md` §4.4: "reprobes random known peers to detect liveness").
const REFRESH_SAMPLE_SIZE: usize = 8;

/// Default interval between refresh passes (`spec.md` §4.4).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Outcome of a bootstrap pass. `spec.md` §4.4: "Bootstrap completion is
/// signalled when at least one peer has IsHandshakeComplete=true, or after
/// a configured timeout with partial results."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// At least one bootstrap endpoint completed its handshake.
    Reached { peers_learned: usize },
    /// The deadline elapsed with zero completed handshakes.
    TimedOutEmpty,
}

/// The intro-handshake wire payloads in this protocol subset (`spec.md`
/// §4.2) carry no identity public key, so a bootstrap-learned peer has no
/// key to index the table by until some later, out-of-scope layer supplies
/// one. A stable hash of the endpoint's address stands in for that key; it
/// is consistent across repeated probes of the same endpoint and never
/// collides with another endpoint's address.
fn address_derived_key(ipv4: u32, port: u16) -> [u8; 32] {
    let mut buf = [0u8; 6];
    buf[..4].copy_from_slice(&ipv4.to_be_bytes());
    buf[4..].copy_from_slice(&port.to_be_bytes());
    tunnelmesh_crypto::sha256(&buf)
}

/// Drives bootstrap discovery and periodic liveness refresh (`spec.md`
/// §4.4) on top of a [`HandshakeManager`] and a shared [`PeerTable`].
pub struct BootstrapCoordinator {
    handshake: Arc<HandshakeManager>,
    peers: Arc<Mutex<PeerTable>>,
    local: WireSocketAddr,
}

impl BootstrapCoordinator {
    pub fn new(handshake: Arc<HandshakeManager>, peers: Arc<Mutex<PeerTable>>, local_addr: SocketAddrV4) -> Self {
        let local = WireSocketAddr {
            ipv4: u32::from(*local_addr.ip()),
            port: local_addr.port(),
        };
        BootstrapCoordinator { handshake, peers, local }
    }

    async fn probe(&self, ipv4: u32, port: u16) -> bool {
        let dest = SocketAddrV4::new(Ipv4Addr::from(ipv4), port);
        match self.handshake.intro_handshake(dest, self.local, self.local).await {
            Ok((_, response)) => {
                let mut peer = Peer::new(address_derived_key(ipv4, port), ipv4, port);
                peer.handshake_complete = true;
                peer.relay_candidate = true;
                peer.record_success();
                self.peers.lock().await.insert(peer);
                debug!(?dest, candidate = ?response.candidate, "intro handshake succeeded");
                true
            }
            Err(err) => {
                warn!(?dest, error = %err, "intro handshake failed");
                if let Some(existing) = self
                    .peers
                    .lock()
                    .await
                    .get_mut(&address_derived_key(ipv4, port))
                {
                    existing.record_failure();
                }
                false
            }
        }
    }

    /// Probes every entry in [`BOOTSTRAP_ENDPOINTS`] in parallel, returning
    /// as soon as the whole batch finishes or `deadline` elapses, whichever
    /// comes first. A timeout with zero successes is reported, not treated
    /// as an error: startup proceeds with an empty table and relies on the
    /// periodic refresh (or a later manual [`crate::manager::HandshakeManager`]
    /// call) to populate it. Takes `&Arc<Self>` rather than `&self` because
    /// each probe runs as its own `tokio::spawn`ed task and needs an owned
    /// handle back to the coordinator.
    pub async fn bootstrap(self: &Arc<Self>, deadline: Duration) -> BootstrapOutcome {
        let handles: Vec<_> = BOOTSTRAP_ENDPOINTS
            .iter()
            .map(|endpoint| {
                let coordinator = Arc::clone(self);
                let (ipv4, port) = (endpoint.ipv4_u32(), endpoint.port);
                tokio::spawn(async move { coordinator.probe(ipv4, port).await })
            })
            .collect();

        let outcome = tokio::time::timeout(deadline, join_handles(handles)).await;

        let peers_learned = self.peers.lock().await.len();
        match outcome {
            Ok(results) if results.iter().any(|ok| *ok) => {
                info!(peers_learned, "bootstrap reached at least one peer");
                BootstrapOutcome::Reached { peers_learned }
            }
            Ok(_) => {
                warn!("bootstrap probes all completed without a single success");
                BootstrapOutcome::TimedOutEmpty
            }
            Err(_) => {
                warn!(peers_learned, "bootstrap deadline elapsed; proceeding with partial results");
                if peers_learned > 0 {
                    BootstrapOutcome::Reached { peers_learned }
                } else {
                    BootstrapOutcome::TimedOutEmpty
                }
            }
        }
    }

    /// Reprobes up to [`REFRESH_SAMPLE_SIZE`] random already-known peers
    /// to detect liveness (`spec.md` §4.4). Failures accumulate toward
    /// each peer's consecutive-failure demotion via [`Peer::record_failure`];
    /// this function does not itself decide relay eligibility.
    pub async fn refresh_known_peers(&self) {
        let sample: Vec<(u32, u16)> = {
            let table = self.peers.lock().await;
            let mut addrs: Vec<(u32, u16)> = table.iter().map(|p| (p.ipv4, p.port)).collect();
            addrs.shuffle(&mut rand::thread_rng());
            addrs.truncate(REFRESH_SAMPLE_SIZE);
            addrs
        };

        for (ipv4, port) in sample {
            self.probe(ipv4, port).await;
        }
        self.peers.lock().await.mark_refreshed();
    }

    /// Runs [`Self::refresh_known_peers`] every `interval` until the
    /// returned future is dropped or the process ends; intended to be
    /// `tokio::spawn`ed alongside the circuit manager and pool health
    /// monitor loops.
    pub async fn run_periodic_refresh(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            self.refresh_known_peers().await;
        }
    }
}

/// Awaits every already-spawned probe task back in order. A task that
/// panics or is cancelled counts as a failed probe rather than failing the
/// whole bootstrap pass.
async fn join_handles(handles: Vec<tokio::task::JoinHandle<bool>>) -> Vec<bool> {
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.unwrap_or(false));
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunnelmesh_transport::UdpTransport;

    async fn coordinator() -> (Arc<UdpTransport>, Arc<BootstrapCoordinator>) {
        let transport = Arc::new(UdpTransport::start(0).await.unwrap());
        let handshake = Arc::new(HandshakeManager::new(transport.clone(), [0u8; 20]));
        let peers = Arc::new(Mutex::new(PeerTable::new(64)));
        let local = transport.local_addr();
        (transport, Arc::new(BootstrapCoordinator::new(handshake, peers, local)))
    }

    #[tokio::test]
    async fn bootstrap_with_unreachable_endpoints_times_out_empty() {
        let (_transport, coord) = coordinator().await;
        let outcome = coord.bootstrap(Duration::from_millis(50)).await;
        assert_eq!(outcome, BootstrapOutcome::TimedOutEmpty);
    }

    #[tokio::test]
    async fn refresh_with_no_known_peers_is_a_noop() {
        let (_transport, coord) = coordinator().await;
        coord.refresh_known_peers().await;
        assert!(coord.peers.lock().await.last_refresh().is_some());
    }

    #[test]
    fn address_derived_key_is_stable_and_distinct() {
        let a = address_derived_key(0x82A177C9, 6421);
        let b = address_derived_key(0x82A177C9, 6421);
        let c = address_derived_key(0x82A177C9, 6422);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
