use std::net::SocketAddrV4;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use tunnelmesh_circuit::encrypt_layers;
use tunnelmesh_peer::PeerTable;
use tunnelmesh_transport::UdpTransport;
use tunnelmesh_wire::{Frame, Prefix, TunnelDataPayload, SERVICE_TUNNEL, TUNNEL_DATA_MSG_TYPE};

use crate::error::{Result, TunnelError};

/// Shared plumbing every [`TunnelStream`] needs to reach the network:
/// the circuit manager (for layered encryption and byte counters), the
/// transport (for the actual send), and the peer table (to resolve the
/// entry hop's public key to a physical address).
pub struct TunnelIo {
    pub circmgr: Arc<tunnelmesh_circmgr::CircuitManager>,
    pub transport: Arc<UdpTransport>,
    pub peers: Arc<Mutex<PeerTable>>,
    pub community_id: [u8; 20],
}

/// Inbound decrypted payloads destined for a stream are pushed here by
/// whichever task dispatches received frames (`spec.md` §4.10: "reads pull
/// from an inbox populated when decrypted datagrams matching this stream
/// arrive").
pub(crate) const INBOX_CAPACITY: usize = 256;

/// A bidirectional byte stream bound to one circuit and one remote
/// endpoint (`spec.md` §3, §4.10). Life-bound by its circuit: once the
/// circuit is gone, writes fail but any already-queued inbound bytes can
/// still be read.
pub struct TunnelStream {
    stream_id: u16,
    circuit_id: u32,
    remote: SocketAddrV4,
    io: Arc<TunnelIo>,
    inbox: Mutex<mpsc::Receiver<Vec<u8>>>,
    sent: AtomicU64,
    received: AtomicU64,
    closed: AtomicBool,
}

impl TunnelStream {
    pub(crate) fn new(
        stream_id: u16,
        circuit_id: u32,
        remote: SocketAddrV4,
        io: Arc<TunnelIo>,
    ) -> (Self, mpsc::Sender<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let stream = TunnelStream {
            stream_id,
            circuit_id,
            remote,
            io,
            inbox: Mutex::new(rx),
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        };
        (stream, tx)
    }

    pub fn stream_id(&self) -> u16 {
        self.stream_id
    }

    pub fn circuit_id(&self) -> u32 {
        self.circuit_id
    }

    pub fn remote(&self) -> SocketAddrV4 {
        self.remote
    }

    pub fn bytes_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// Onion-encrypts `data` across the bound circuit's hops and sends it
    /// to the entry hop's physical address.
    pub async fn write(&self, data: &[u8]) -> Result<usize> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(TunnelError::StreamClosed(self.stream_id));
        }
        let circuit_id = self.circuit_id;
        let payload_len = data.len();
        let (ciphertext, entry_key) = self
            .io
            .circmgr
            .with_circuit(circuit_id, move |circuit| {
                let ciphertext = encrypt_layers(circuit, data)?;
                circuit.record_bytes_sent(payload_len as u64);
                let entry_key = circuit.hops()[0].relay_public_key;
                Ok((ciphertext, entry_key))
            })
            .await?;

        let entry_addr = {
            let table = self.io.peers.lock().await;
            table
                .get(&entry_key)
                .map(|p| SocketAddrV4::new(p.ipv4.into(), p.port))
                .ok_or(TunnelError::NoCircuit)?
        };

        let wire_payload = TunnelDataPayload {
            stream_id: self.stream_id,
            ciphertext,
        }
        .encode();
        let frame = Frame::encode(Prefix::new(self.io.community_id, SERVICE_TUNNEL), TUNNEL_DATA_MSG_TYPE, &wire_payload);
        self.io.transport.send(&frame, entry_addr).await.map_err(|_| TunnelError::NoCircuit)?;

        self.sent.fetch_add(payload_len as u64, Ordering::Relaxed);
        Ok(payload_len)
    }

    /// Waits for the next decrypted payload addressed to this stream, or
    /// `None` once the stream is closed and drained.
    pub async fn read(&self) -> Option<Vec<u8>> {
        let bytes = self.inbox.lock().await.recv().await?;
        self.received.fetch_add(bytes.len() as u64, Ordering::Relaxed);
        Some(bytes)
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}
