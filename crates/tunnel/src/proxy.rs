use std::collections::HashMap;
use std::net::SocketAddrV4;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use tunnelmesh_circuit::decrypt_layers;
use tunnelmesh_wire::TunnelDataPayload;

use crate::error::{Result, TunnelError};
use crate::stream::{TunnelIo, TunnelStream};

/// Owns the stream table and allocates stream-ids monotonically with
/// wraparound-and-collision-check (`spec.md` §4.10), mirroring the
/// monotonic-id-with-wraparound allocation used elsewhere in this corpus
/// for circuit-ids.
pub struct TunnelProxy {
    io: Arc<TunnelIo>,
    next_id: AtomicU16,
    streams: Mutex<HashMap<u16, (Arc<TunnelStream>, mpsc::Sender<Vec<u8>>)>>,
}

impl TunnelProxy {
    pub fn new(io: Arc<TunnelIo>) -> Self {
        TunnelProxy {
            io,
            next_id: AtomicU16::new(1),
            streams: Mutex::new(HashMap::new()),
        }
    }

    pub async fn stream_count(&self) -> usize {
        self.streams.lock().await.len()
    }

    /// Allocates a stream-id, skipping any already in use, and wrapping
    /// back to 1 when exhausted (0 is reserved as "no stream").
    async fn allocate_id(&self, streams: &HashMap<u16, (Arc<TunnelStream>, mpsc::Sender<Vec<u8>>)>) -> Result<u16> {
        let start = self.next_id.load(Ordering::Relaxed);
        let mut candidate = start;
        loop {
            if candidate != 0 && !streams.contains_key(&candidate) {
                let next = candidate.wrapping_add(1);
                self.next_id.store(if next == 0 { 1 } else { next }, Ordering::Relaxed);
                return Ok(candidate);
            }
            candidate = candidate.wrapping_add(1);
            if candidate == 0 {
                candidate = 1;
            }
            if candidate == start {
                return Err(TunnelError::StreamIdsExhausted);
            }
        }
    }

    /// Opens a new stream bound to `circuit_id`, reaching `remote` once
    /// data is written.
    pub async fn open_stream(&self, circuit_id: u32, remote: SocketAddrV4) -> Result<Arc<TunnelStream>> {
        let mut streams = self.streams.lock().await;
        let stream_id = self.allocate_id(&streams).await?;
        let (stream, inbox_tx) = TunnelStream::new(stream_id, circuit_id, remote, self.io.clone());
        let stream = Arc::new(stream);
        streams.insert(stream_id, (stream.clone(), inbox_tx));
        debug!(stream_id, circuit_id, "tunnel stream opened");
        Ok(stream)
    }

    pub async fn get_stream(&self, stream_id: u16) -> Option<Arc<TunnelStream>> {
        self.streams.lock().await.get(&stream_id).map(|(s, _)| s.clone())
    }

    /// Delivers a decrypted payload to the matching stream's inbox; bytes
    /// for an unknown or closed stream are dropped rather than erroring
    /// (mirrors the netclient's unmatched-frame handling).
    pub async fn deliver(&self, stream_id: u16, bytes: Vec<u8>) {
        let streams = self.streams.lock().await;
        if let Some((_, tx)) = streams.get(&stream_id) {
            let _ = tx.send(bytes).await;
        } else {
            debug!(stream_id, "dropping payload for unknown tunnel stream");
        }
    }

    /// Disposes the stream and releases its id (`spec.md` §4.10).
    pub async fn close_stream(&self, stream_id: u16) -> Result<()> {
        let mut streams = self.streams.lock().await;
        let (stream, _) = streams.remove(&stream_id).ok_or(TunnelError::UnknownStream(stream_id))?;
        stream.mark_closed();
        Ok(())
    }

    /// Decodes an inbound onion-wrapped tunnel-data frame, peels it with
    /// its stream's bound circuit, and delivers the recovered plaintext
    /// (`spec.md` §2: "Application bytes write to a Tunnel Stream ... the
    /// network may reorder datagrams"). Frames for an unknown stream or
    /// that fail to decrypt are dropped rather than erroring, mirroring
    /// `deliver`'s unmatched-stream handling.
    pub async fn handle_frame(&self, payload: &[u8]) {
        let Ok(data) = TunnelDataPayload::decode(payload) else {
            debug!("dropped malformed tunnel-data frame");
            return;
        };
        let Some(stream) = self.get_stream(data.stream_id).await else {
            debug!(stream_id = data.stream_id, "dropping tunnel frame for unknown stream");
            return;
        };
        let circuit_id = stream.circuit_id();
        let plaintext = self
            .io
            .circmgr
            .with_circuit(circuit_id, move |circuit| {
                Ok(decrypt_layers(circuit, &data.ciphertext)?)
            })
            .await;
        match plaintext {
            Ok(bytes) => self.deliver(stream.stream_id(), bytes).await,
            Err(err) => debug!(stream_id = stream.stream_id(), %err, "failed to peel tunnel frame"),
        }
    }

    /// Closes every outstanding stream (`spec.md` §4.10 "stop closes all
    /// outstanding streams").
    pub async fn stop(&self) {
        let mut streams = self.streams.lock().await;
        for (stream, _) in streams.values() {
            stream.mark_closed();
        }
        streams.clear();
    }
}
