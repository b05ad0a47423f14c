use std::net::SocketAddrV4;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::warn;

use crate::error::{Result, TunnelError};
use crate::pool::{CircuitConnectionPool, CircuitLease};
use crate::proxy::TunnelProxy;
use crate::stream::TunnelStream;

/// Socket-like handle returned by [`Connector::connect`], matching the
/// upstream connector contract (`spec.md` §6): `read`/`write`/`close`,
/// `connected()`, `remote_endpoint()`. Either backed by a tunnel stream or,
/// on fallback, a direct TCP connection.
pub struct Socket {
    remote: SocketAddrV4,
    backing: SocketBacking,
    pool: Option<Arc<CircuitConnectionPool>>,
    proxy: Option<Arc<TunnelProxy>>,
    lease: Option<CircuitLease>,
}

enum SocketBacking {
    Tunneled(Arc<TunnelStream>),
    Direct(TcpStream),
}

impl Socket {
    pub fn remote_endpoint(&self) -> SocketAddrV4 {
        self.remote
    }

    pub fn connected(&self) -> bool {
        match &self.backing {
            SocketBacking::Tunneled(stream) => !stream.is_closed(),
            SocketBacking::Direct(_) => true,
        }
    }

    pub async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        match &mut self.backing {
            SocketBacking::Tunneled(stream) => stream.write(buf).await,
            SocketBacking::Direct(tcp) => tcp
                .write_all(buf)
                .await
                .map(|_| buf.len())
                .map_err(|_| TunnelError::NoCircuit),
        }
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match &mut self.backing {
            SocketBacking::Tunneled(stream) => {
                let stream_id = stream.stream_id();
                let data = stream.read().await.ok_or(TunnelError::StreamClosed(stream_id))?;
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            SocketBacking::Direct(tcp) => tcp.read(buf).await.map_err(|_| TunnelError::NoCircuit),
        }
    }

    /// Closes the stream (if tunneled) and returns the underlying circuit
    /// to the pool as healthy.
    pub async fn close(&mut self) {
        if let SocketBacking::Tunneled(stream) = &self.backing {
            if let Some(proxy) = &self.proxy {
                let _ = proxy.close_stream(stream.stream_id()).await;
            }
        }
        if let (Some(pool), Some(lease)) = (self.pool.take(), self.lease.take()) {
            pool.release(lease, true).await;
        }
    }
}

/// Outbound connection path (`spec.md` §4.10): the integration point for
/// the torrent engine. Acquires a circuit, opens a tunnel stream, and
/// wraps it as a [`Socket`]; retries on failure, falling back to a direct
/// connection if configured and the retry budget is exhausted.
pub struct Connector {
    pool: Arc<CircuitConnectionPool>,
    proxy: Arc<TunnelProxy>,
    allow_direct_fallback: bool,
    circuit_routing_enabled: AtomicBool,
}

const MAX_CONNECT_ATTEMPTS: u32 = 3;

impl Connector {
    pub fn new(pool: Arc<CircuitConnectionPool>, proxy: Arc<TunnelProxy>, allow_direct_fallback: bool) -> Self {
        Connector {
            pool,
            proxy,
            allow_direct_fallback,
            circuit_routing_enabled: AtomicBool::new(true),
        }
    }

    /// Runtime toggle: when disabled, all traffic routes to the direct
    /// connector regardless of the fallback setting (`spec.md` §4.10).
    pub fn set_circuit_routing_enabled(&self, enabled: bool) {
        self.circuit_routing_enabled.store(enabled, Ordering::Relaxed);
    }

    pub async fn connect(&self, remote: SocketAddrV4) -> Result<Socket> {
        if !self.circuit_routing_enabled.load(Ordering::Relaxed) {
            return self.connect_direct(remote).await;
        }

        let mut last_err = None;
        for attempt in 0..MAX_CONNECT_ATTEMPTS {
            match self.connect_tunneled(remote).await {
                Ok(socket) => return Ok(socket),
                Err(err) => {
                    warn!(attempt, error = %err, "tunneled connect attempt failed");
                    last_err = Some(err);
                    if attempt + 1 < MAX_CONNECT_ATTEMPTS {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                    }
                }
            }
        }

        if self.allow_direct_fallback {
            self.connect_direct(remote).await
        } else {
            Err(last_err.unwrap_or(TunnelError::NoCircuit))
        }
    }

    async fn connect_tunneled(&self, remote: SocketAddrV4) -> Result<Socket> {
        let lease = self.pool.acquire().await?;
        let stream = self.proxy.open_stream(lease.circuit_id(), remote).await?;
        Ok(Socket {
            remote,
            backing: SocketBacking::Tunneled(stream),
            pool: Some(self.pool.clone()),
            proxy: Some(self.proxy.clone()),
            lease: Some(lease),
        })
    }

    async fn connect_direct(&self, remote: SocketAddrV4) -> Result<Socket> {
        let tcp = TcpStream::connect(remote).await.map_err(|_| TunnelError::NoCircuit)?;
        Ok(Socket {
            remote,
            backing: SocketBacking::Direct(tcp),
            pool: None,
            proxy: None,
            lease: None,
        })
    }
}

/// `100ms * 2^attempt + 0-100ms jitter` (`spec.md` §4.10).
fn backoff_delay(attempt: u32) -> Duration {
    let base = Duration::from_millis(100 * 2u64.pow(attempt));
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..100));
    base + jitter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_before_jitter() {
        assert!(backoff_delay(0) >= Duration::from_millis(100));
        assert!(backoff_delay(0) < Duration::from_millis(200));
        assert!(backoff_delay(1) >= Duration::from_millis(200));
        assert!(backoff_delay(1) < Duration::from_millis(300));
        assert!(backoff_delay(2) >= Duration::from_millis(400));
        assert!(backoff_delay(2) < Duration::from_millis(500));
    }
}
