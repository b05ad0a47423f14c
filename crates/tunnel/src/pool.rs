use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use tunnelmesh_circmgr::CircuitManager;

use crate::error::{Result, TunnelError};

/// A checked-out circuit. Dropping it without calling
/// [`CircuitConnectionPool::release`] simply returns the concurrency
/// permit without returning the circuit to the idle queue — equivalent to
/// releasing with `healthy = false`.
pub struct CircuitLease {
    circuit_id: u32,
    _permit: OwnedSemaphorePermit,
}

impl CircuitLease {
    pub fn circuit_id(&self) -> u32 {
        self.circuit_id
    }
}

/// Bounded pool of circuits backing the tunnel proxy (`spec.md` §4.10). A
/// binary semaphore with capacity `max_concurrent_circuits` gates
/// acquisition; idle, healthy circuits are reused before a new one is
/// built.
pub struct CircuitConnectionPool {
    circmgr: Arc<CircuitManager>,
    semaphore: Arc<Semaphore>,
    idle: Mutex<VecDeque<u32>>,
    in_use: Mutex<HashSet<u32>>,
    acquire_timeout: Duration,
}

impl CircuitConnectionPool {
    pub fn new(circmgr: Arc<CircuitManager>) -> Self {
        let capacity = circmgr.config().max_concurrent_circuits.max(1);
        let acquire_timeout = circmgr.config().circuit_establishment_timeout;
        CircuitConnectionPool {
            circmgr,
            semaphore: Arc::new(Semaphore::new(capacity)),
            idle: Mutex::new(VecDeque::new()),
            in_use: Mutex::new(HashSet::new()),
            acquire_timeout,
        }
    }

    /// Returns a healthy circuit: an idle pooled one if present, otherwise
    /// an existing `Established` circuit not currently checked out,
    /// otherwise a freshly built one. Fails with `Pool/Timeout` if none of
    /// that completes within the configured establishment timeout.
    pub async fn acquire(&self) -> Result<CircuitLease> {
        let permit = tokio::time::timeout(self.acquire_timeout, self.semaphore.clone().acquire_owned())
            .await
            .map_err(|_| TunnelError::PoolTimeout)?
            .expect("semaphore is never closed");

        if let Some(id) = self.take_healthy_idle().await {
            self.in_use.lock().await.insert(id);
            return Ok(CircuitLease { circuit_id: id, _permit: permit });
        }

        let excluded = self.in_use.lock().await.clone();
        if let Some(id) = self.circmgr.first_established_excluding(&excluded).await {
            self.in_use.lock().await.insert(id);
            return Ok(CircuitLease { circuit_id: id, _permit: permit });
        }

        let hop_count = self.circmgr.config().default_hops;
        let new_id = tokio::time::timeout(self.acquire_timeout, self.circmgr.create_circuit(hop_count))
            .await
            .map_err(|_| TunnelError::PoolTimeout)?
            .map_err(TunnelError::from)?;
        self.in_use.lock().await.insert(new_id);
        Ok(CircuitLease { circuit_id: new_id, _permit: permit })
    }

    /// Pops idle circuits until a healthy one is found, discarding stale
    /// ones along the way.
    async fn take_healthy_idle(&self) -> Option<u32> {
        loop {
            let candidate = self.idle.lock().await.pop_front()?;
            if self.circmgr.is_healthy(candidate).await {
                return Some(candidate);
            }
            debug!(circuit_id = candidate, "discarding unhealthy idle circuit");
        }
    }

    /// Returns a circuit to the pool. Healthy, still-`Established` circuits
    /// go back to the idle queue; otherwise the circuit is closed
    /// (`spec.md` §4.10).
    pub async fn release(&self, lease: CircuitLease, healthy: bool) {
        let circuit_id = lease.circuit_id;
        self.in_use.lock().await.remove(&circuit_id);

        if healthy && self.circmgr.is_healthy(circuit_id).await {
            self.idle.lock().await.push_back(circuit_id);
        } else if let Err(err) = self.circmgr.close_circuit(circuit_id).await {
            warn!(circuit_id, error = %err, "failed to close discarded circuit");
        }
        // `lease._permit` drops here, returning the concurrency slot.
    }

    /// Evicts idle circuits that have gone unhealthy since being pooled
    /// (`spec.md` §4.10 health-aware selection).
    pub async fn sweep_unhealthy(&self) {
        let stale: Vec<u32> = self.idle.lock().await.iter().copied().collect();
        let mut still_healthy = VecDeque::new();
        for id in stale {
            if self.circmgr.is_healthy(id).await {
                still_healthy.push_back(id);
            } else {
                debug!(circuit_id = id, "evicting unhealthy idle circuit");
            }
        }
        *self.idle.lock().await = still_healthy;
    }

    /// Runs [`sweep_unhealthy`](Self::sweep_unhealthy) on `interval`,
    /// forever. Spawned only when a health monitor is configured
    /// (`spec.md` §4.10: "When a Health Monitor is attached").
    pub async fn run_health_monitor(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            self.sweep_unhealthy().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex as TokioMutex;
    use tunnelmesh_circmgr::CircMgrConfig;
    use tunnelmesh_netclient::CircuitNetworkClient;
    use tunnelmesh_peer::PeerTable;
    use tunnelmesh_transport::UdpTransport;

    async fn test_manager(mut config: CircMgrConfig) -> Arc<CircuitManager> {
        config.circuit_establishment_timeout = Duration::from_millis(100);
        let transport = Arc::new(UdpTransport::start(0).await.unwrap());
        let network = Arc::new(CircuitNetworkClient::new(transport, [0u8; 20]).with_timeout(Duration::from_millis(20)));
        let peers = Arc::new(TokioMutex::new(PeerTable::new(16)));
        Arc::new(CircuitManager::new(config, peers, network))
    }

    #[tokio::test]
    async fn acquire_times_out_with_no_relays_available() {
        let manager = test_manager(CircMgrConfig::default()).await;
        let pool = CircuitConnectionPool::new(manager);
        let result = pool.acquire().await;
        assert!(matches!(result, Err(TunnelError::PoolTimeout) | Err(TunnelError::CircMgr(_))));
    }

    #[tokio::test]
    async fn semaphore_bounds_concurrent_acquisitions() {
        let mut config = CircMgrConfig::default();
        config.max_concurrent_circuits = 1;
        let manager = test_manager(config).await;
        let pool = Arc::new(CircuitConnectionPool::new(manager));
        assert_eq!(pool.semaphore.available_permits(), 1);
    }
}
