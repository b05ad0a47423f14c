use std::collections::HashMap;
use std::time::Instant;

use tracing::debug;

use crate::error::{PeerError, Result};
use crate::peer::Peer;

/// Default bound on the number of peers retained in a [`PeerTable`]
/// (`spec.md` §4.4). Once full, the peer with the oldest `last_seen` is
/// evicted to make room for a new one.
pub const DEFAULT_MAX_PEERS: usize = 2048;

/// Bounded table of known peers, keyed by public key, with LRU-by-last-seen
/// eviction once it reaches `max_peers` (`spec.md` §4.4). Not `Send`-shared
/// itself; callers wrap it in a `Mutex` or `RwLock` as their concurrency
/// model requires.
pub struct PeerTable {
    peers: HashMap<[u8; 32], Peer>,
    max_peers: usize,
    last_refresh: Option<Instant>,
}

impl PeerTable {
    pub fn new(max_peers: usize) -> Self {
        PeerTable {
            peers: HashMap::new(),
            max_peers,
            last_refresh: None,
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Inserts or updates a peer. If the table is full and `public_key` is
    /// not already present, the least-recently-seen peer is evicted first.
    pub fn insert(&mut self, peer: Peer) {
        let key = peer.public_key;
        if !self.peers.contains_key(&key) && self.peers.len() >= self.max_peers {
            if let Some(victim) = self.lru_key() {
                debug!(?victim, "evicting least-recently-seen peer to make room");
                self.peers.remove(&victim);
            }
        }
        self.peers.insert(key, peer);
    }

    pub fn remove(&mut self, public_key: &[u8; 32]) -> Option<Peer> {
        self.peers.remove(public_key)
    }

    pub fn get(&self, public_key: &[u8; 32]) -> Option<&Peer> {
        self.peers.get(public_key)
    }

    pub fn get_mut(&mut self, public_key: &[u8; 32]) -> Option<&mut Peer> {
        self.peers.get_mut(public_key)
    }

    pub fn contains(&self, public_key: &[u8; 32]) -> bool {
        self.peers.contains_key(public_key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    /// Peers currently eligible as relay candidates: handshake complete and
    /// not demoted by repeated failures (`spec.md` §4.4/§4.5).
    pub fn iter_relay_candidates(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values().filter(|p| p.is_relay_candidate())
    }

    pub fn mark_refreshed(&mut self) {
        self.last_refresh = Some(Instant::now());
    }

    pub fn last_refresh(&self) -> Option<Instant> {
        self.last_refresh
    }

    /// Fails with [`PeerError::TableFull`] instead of evicting, for callers
    /// that want an explicit-capacity insert rather than LRU churn.
    pub fn try_insert_no_evict(&mut self, peer: Peer) -> Result<()> {
        if !self.peers.contains_key(&peer.public_key) && self.peers.len() >= self.max_peers {
            return Err(PeerError::TableFull(self.max_peers));
        }
        self.peers.insert(peer.public_key, peer);
        Ok(())
    }

    fn lru_key(&self) -> Option<[u8; 32]> {
        self.peers
            .values()
            .min_by_key(|p| p.last_seen)
            .map(|p| p.public_key)
    }
}

impl Default for PeerTable {
    fn default() -> Self {
        PeerTable::new(DEFAULT_MAX_PEERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer_with_key(byte: u8) -> Peer {
        Peer::new([byte; 32], 0x0A000001, 6421)
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let mut table = PeerTable::new(8);
        table.insert(peer_with_key(1));
        assert!(table.contains(&[1u8; 32]));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn eviction_removes_least_recently_seen() {
        let mut table = PeerTable::new(2);
        let mut first = peer_with_key(1);
        first.last_seen = Instant::now() - std::time::Duration::from_secs(100);
        table.insert(first);
        table.insert(peer_with_key(2));

        // table full: inserting a third peer evicts key 1 (oldest last_seen)
        table.insert(peer_with_key(3));

        assert_eq!(table.len(), 2);
        assert!(!table.contains(&[1u8; 32]));
        assert!(table.contains(&[2u8; 32]));
        assert!(table.contains(&[3u8; 32]));
    }

    #[test]
    fn try_insert_no_evict_errors_when_full() {
        let mut table = PeerTable::new(1);
        table.try_insert_no_evict(peer_with_key(1)).unwrap();
        let err = table.try_insert_no_evict(peer_with_key(2)).unwrap_err();
        assert!(matches!(err, PeerError::TableFull(1)));
    }

    #[test]
    fn relay_candidates_filters_incomplete_handshakes() {
        let mut table = PeerTable::new(8);
        let mut a = peer_with_key(1);
        a.handshake_complete = true;
        a.relay_candidate = true;
        let b = peer_with_key(2);
        table.insert(a);
        table.insert(b);

        let candidates: Vec<_> = table.iter_relay_candidates().collect();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].public_key, [1u8; 32]);
    }

    #[test]
    fn mark_refreshed_sets_timestamp() {
        let mut table = PeerTable::new(8);
        assert!(table.last_refresh().is_none());
        table.mark_refreshed();
        assert!(table.last_refresh().is_some());
    }
}
