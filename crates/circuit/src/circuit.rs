use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::error::{CircuitError, Result};
use crate::hop::Hop;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Creating,
    Established,
    Failed,
    Closed,
}

/// A multi-hop onion-routing circuit (`spec.md` §4.6). Hops are appended in
/// construction order (entry = 0 … exit = N-1); layered encryption later
/// traverses them in reverse (`spec.md` §4.9). `id` is the 32-bit IPv8
/// circuit-id carried on the wire; `uuid` is an internal handle with no wire
/// representation, letting callers distinguish circuits across id reuse
/// after a process restart (`spec.md` §3).
pub struct Circuit {
    pub id: u32,
    pub uuid: Uuid,
    pub target_hops: usize,
    state: CircuitState,
    hops: Vec<Hop>,
    fail_reason: Option<String>,
    created_at: Instant,
    expires_at: Instant,
    last_activity: Instant,
    bytes_sent: u64,
    bytes_received: u64,
    rtt_ms: Option<u32>,
}

impl Circuit {
    pub fn new(id: u32, target_hops: usize, lifetime: Duration) -> Self {
        let now = Instant::now();
        Circuit {
            id,
            uuid: Uuid::new_v4(),
            target_hops,
            state: CircuitState::Creating,
            hops: Vec::with_capacity(target_hops),
            fail_reason: None,
            created_at: now,
            expires_at: now + lifetime,
            last_activity: now,
            bytes_sent: 0,
            bytes_received: 0,
            rtt_ms: None,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    pub fn hops(&self) -> &[Hop] {
        &self.hops
    }

    pub fn hops_mut(&mut self) -> &mut [Hop] {
        &mut self.hops
    }

    pub fn fail_reason(&self) -> Option<&str> {
        self.fail_reason.as_deref()
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Appends a hop, only while `state == Creating` and below the target
    /// hop count (`spec.md` §4.6).
    pub fn add_hop(&mut self, hop: Hop) -> Result<()> {
        if self.state != CircuitState::Creating {
            return Err(CircuitError::NotCreating);
        }
        if self.hops.len() >= self.target_hops {
            return Err(CircuitError::HopCountReached);
        }
        self.hops.push(hop);
        self.touch();
        Ok(())
    }

    /// Requires `hop_count == target` and every hop disposed-free (key
    /// exchange complete is implied by a hop existing at all in this
    /// model: a `Hop` is only constructed once its shared secret is
    /// derived).
    pub fn mark_established(&mut self) -> Result<()> {
        if self.hops.len() != self.target_hops || self.hops.iter().any(Hop::is_disposed) {
            return Err(CircuitError::NotReadyForEstablishment);
        }
        self.state = CircuitState::Established;
        self.touch();
        Ok(())
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.state = CircuitState::Failed;
        self.fail_reason = Some(reason.into());
    }

    pub fn record_bytes_sent(&mut self, n: u64) {
        self.bytes_sent += n;
        self.touch();
    }

    pub fn record_bytes_received(&mut self, n: u64) {
        self.bytes_received += n;
        self.touch();
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub fn record_rtt(&mut self, rtt_ms: u32) {
        self.rtt_ms = Some(rtt_ms);
        self.touch();
    }

    pub fn rtt_ms(&self) -> Option<u32> {
        self.rtt_ms
    }

    pub fn set_expiration(&mut self, expires_at: Instant) {
        self.expires_at = expires_at;
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Disposes each hop, zeroing its AEAD key, and sets `state = Closed`.
    /// Double-close is a no-op (`spec.md` §4.6).
    pub fn close(&mut self) {
        if self.state == CircuitState::Closed {
            return;
        }
        for hop in &mut self.hops {
            hop.dispose();
        }
        self.state = CircuitState::Closed;
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.state == CircuitState::Closed {
            return Err(CircuitError::Disposed);
        }
        Ok(())
    }

    /// Guard used before any add-hop/encrypt/decrypt operation
    /// (`spec.md` §4.6: "attempts to add hops or encrypt/decrypt after
    /// close fail with `Circuit/Disposed`").
    pub fn check_not_disposed(&self) -> Result<()> {
        self.ensure_usable()
    }
}
