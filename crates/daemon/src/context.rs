use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tunnelmesh_circmgr::{CircMgrConfig, CircuitManager};
use tunnelmesh_config::Config;
use tunnelmesh_handshake::{BootstrapCoordinator, BootstrapOutcome, HandshakeManager};
use tunnelmesh_netclient::CircuitNetworkClient;
use tunnelmesh_peer::{validate_bootstrap_list, PeerTable, DEFAULT_MAX_PEERS};
use tunnelmesh_transport::UdpTransport;
use tunnelmesh_tunnel::{CircuitConnectionPool, Connector, TunnelIo, TunnelProxy};
use tunnelmesh_wire::{Frame, SERVICE_CIRCUIT, SERVICE_HANDSHAKE, SERVICE_TUNNEL, TUNNEL_DATA_MSG_TYPE};

use crate::error::Result;
use crate::status::{NodeStatus, NodeStatusCell};

fn circmgr_config_from(config: &Config) -> CircMgrConfig {
    CircMgrConfig {
        min_hops: config.min_hops,
        max_hops: config.max_hops,
        default_hops: config.default_hops,
        min_concurrent_circuits: config.min_concurrent_circuits,
        max_concurrent_circuits: config.max_concurrent_circuits,
        circuit_lifetime: Duration::from_secs(config.circuit_lifetime_seconds),
        circuit_establishment_timeout: Duration::from_secs(config.circuit_establishment_timeout_seconds),
        min_relay_reliability: config.min_relay_reliability,
        prefer_high_bandwidth_relays: config.prefer_high_bandwidth_relays,
        prefer_low_latency_relays: config.prefer_low_latency_relays,
        ..CircMgrConfig::default()
    }
}

/// Everything one node needs, wired together. Deliberately not a
/// process-wide singleton (`spec.md` §9): a test harness, or a process
/// hosting more than one identity, constructs as many of these as it
/// needs.
pub struct NetworkContext {
    pub config: Config,
    pub transport: Arc<UdpTransport>,
    pub peers: Arc<Mutex<PeerTable>>,
    pub handshake: Arc<HandshakeManager>,
    pub bootstrap: Arc<BootstrapCoordinator>,
    pub network: Arc<CircuitNetworkClient>,
    pub circmgr: Arc<CircuitManager>,
    pub tunnel_proxy: Arc<TunnelProxy>,
    pub pool: Arc<CircuitConnectionPool>,
    pub connector: Arc<Connector>,
    status: NodeStatusCell,
    dispatch_task: JoinHandle<()>,
}

impl NetworkContext {
    /// Binds the transport on `port` and wires up every layer from C1
    /// through C10 on top of it. `allow_direct_fallback` threads straight
    /// into the [`Connector`] (`spec.md` §4.10).
    pub async fn start(config: Config, port: u16, community_id: [u8; 20], allow_direct_fallback: bool) -> Result<Arc<Self>> {
        validate_bootstrap_list()?;

        let transport = Arc::new(UdpTransport::start(port).await?);
        info!(local_addr = ?transport.local_addr(), "transport bound");

        let peers = Arc::new(Mutex::new(PeerTable::new(DEFAULT_MAX_PEERS)));
        let handshake = Arc::new(HandshakeManager::new(transport.clone(), community_id));
        let bootstrap = Arc::new(BootstrapCoordinator::new(
            handshake.clone(),
            peers.clone(),
            transport.local_addr(),
        ));
        let network = Arc::new(CircuitNetworkClient::new(transport.clone(), community_id));

        let circmgr = Arc::new(CircuitManager::new(
            circmgr_config_from(&config),
            peers.clone(),
            network.clone(),
        ));

        let tunnel_io = Arc::new(TunnelIo {
            circmgr: circmgr.clone(),
            transport: transport.clone(),
            peers: peers.clone(),
            community_id,
        });
        let tunnel_proxy = Arc::new(TunnelProxy::new(tunnel_io));
        let pool = Arc::new(CircuitConnectionPool::new(circmgr.clone()));
        let connector = Arc::new(Connector::new(pool.clone(), tunnel_proxy.clone(), allow_direct_fallback));

        let dispatch_task = tokio::spawn(dispatch_loop(
            transport.clone(),
            handshake.clone(),
            network.clone(),
            tunnel_proxy.clone(),
        ));

        Ok(Arc::new(NetworkContext {
            config,
            transport,
            peers,
            handshake,
            bootstrap,
            network,
            circmgr,
            tunnel_proxy,
            pool,
            connector,
            status: NodeStatusCell::new(NodeStatus::NotStarted),
            dispatch_task,
        }))
    }

    /// Runs the initial bootstrap pass (`spec.md` §4.4): probes every
    /// hard-coded bootstrap endpoint in parallel and waits up to
    /// `config.bootstrap_timeout_seconds` for at least one to complete its
    /// handshake. Status moves `NotStarted` -> `Bootstrapping` for the
    /// duration, then to `Ready` or `Degraded` depending on the outcome.
    pub async fn run_bootstrap(&self) -> BootstrapOutcome {
        self.status.set(NodeStatus::Bootstrapping);
        let timeout = Duration::from_secs(self.config.bootstrap_timeout_seconds);
        let outcome = self.bootstrap.bootstrap(timeout).await;
        match outcome {
            BootstrapOutcome::Reached { peers_learned } => {
                info!(peers_learned, "bootstrap complete");
                self.status.set(NodeStatus::Ready);
            }
            BootstrapOutcome::TimedOutEmpty => {
                info!("bootstrap timed out with no peers; continuing degraded");
                self.status.set(NodeStatus::Degraded);
            }
        }
        outcome
    }

    /// Current coarse status (`spec.md` §7), refined by live circuit
    /// health: a `Ready` node whose circuits have all failed reads back as
    /// `Degraded` rather than staying falsely optimistic.
    pub async fn status(&self) -> NodeStatus {
        let stored = self.status.get();
        if stored == NodeStatus::Ready
            && self.circmgr.circuit_count().await > 0
            && self.circmgr.established_fraction().await == 0.0
        {
            return NodeStatus::Degraded;
        }
        stored
    }

    /// Fraction of circuits currently `Established` (`spec.md` §7 health
    /// metric).
    pub async fn established_fraction(&self) -> f64 {
        self.circmgr.established_fraction().await
    }

    /// Registers a peer this node already knows the address and public key
    /// of (from a bootstrap endpoint or prior session), immediately
    /// eligible as a relay candidate. Resolving unknown peers by walking
    /// the overlay is out of scope here; see `spec.md`'s Non-goals.
    pub async fn add_known_peer(&self, public_key: [u8; 32], ipv4: u32, port: u16) {
        let mut peer = tunnelmesh_peer::Peer::new(public_key, ipv4, port);
        peer.handshake_complete = true;
        peer.relay_candidate = true;
        self.peers.lock().await.insert(peer);
    }

    /// Runs the circuit manager's background passes and the connection
    /// pool's health monitor until interrupted, mirroring the
    /// `tokio::select!` + `ctrl_c()` shutdown used by this codebase's
    /// earlier daemon binary.
    pub async fn run(self: Arc<Self>) {
        let circmgr = self.circmgr.clone();
        let pool = self.pool.clone();
        let bootstrap = self.bootstrap.clone();
        let health_interval = Duration::from_secs(self.config.circuit_health_check_interval_seconds);
        let refresh_interval = Duration::from_secs(self.config.bootstrap_refresh_interval_seconds);

        let circmgr_task = tokio::spawn(async move { circmgr.run().await });
        let pool_task = tokio::spawn(async move {
            if self.config.enable_circuit_health_monitoring {
                pool.run_health_monitor(health_interval).await;
            }
        });
        let refresh_task = tokio::spawn(async move { bootstrap.run_periodic_refresh(refresh_interval).await });

        tokio::select! {
            _ = circmgr_task => {}
            _ = pool_task => {}
            _ = refresh_task => {}
            _ = tokio::signal::ctrl_c() => {
                info!("received shutdown signal");
            }
        }
    }
}

impl Drop for NetworkContext {
    fn drop(&mut self) {
        self.dispatch_task.abort();
    }
}

/// Subscribes to the transport's inbound datagram stream and routes every
/// frame to its owning component by `Prefix::service` (`spec.md` §2 "Data
/// flow": bytes in -> C1 -> C2 decode -> dispatched to C5/C7 by message
/// type). This is the one place in the assembled system where the
/// per-crate handlers actually get fed real inbound traffic instead of
/// only their own unit tests.
async fn dispatch_loop(
    transport: Arc<UdpTransport>,
    handshake: Arc<HandshakeManager>,
    network: Arc<CircuitNetworkClient>,
    tunnel_proxy: Arc<TunnelProxy>,
) {
    let mut events = transport.subscribe();
    loop {
        match events.recv().await {
            Ok(datagram) => {
                let Ok(frame) = Frame::decode(&datagram.bytes) else {
                    debug!(source = ?datagram.source, "dropped malformed inbound datagram");
                    continue;
                };
                match frame.prefix.service {
                    SERVICE_HANDSHAKE => handshake.handle_frame(frame.message_type, frame.payload).await,
                    SERVICE_CIRCUIT => network.handle_frame(frame.message_type, frame.payload).await,
                    SERVICE_TUNNEL => {
                        if frame.message_type == TUNNEL_DATA_MSG_TYPE {
                            tunnel_proxy.handle_frame(frame.payload).await;
                        } else {
                            debug!(message_type = frame.message_type, "dropped unknown tunnel message type");
                        }
                    }
                    other => debug!(service = other, "dropped frame for unknown service"),
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "dispatch loop lagged behind inbound datagrams");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}
