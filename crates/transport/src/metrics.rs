use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic, lock-free transport counters (`spec.md` §4.1). Safe to read
/// from any task; only the receive loop and `send` increment them.
#[derive(Default)]
pub struct TransportMetrics {
    pub datagrams_sent: AtomicU64,
    pub datagrams_received: AtomicU64,
    pub send_errors: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,
}

impl TransportMetrics {
    pub fn record_sent(&self, bytes: usize) {
        self.datagrams_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self, bytes: usize) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TransportMetricsSnapshot {
        TransportMetricsSnapshot {
            datagrams_sent: self.datagrams_sent.load(Ordering::Relaxed),
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransportMetricsSnapshot {
    pub datagrams_sent: u64,
    pub datagrams_received: u64,
    pub send_errors: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let m = TransportMetrics::default();
        assert_eq!(m.snapshot(), TransportMetricsSnapshot::default());
    }

    #[test]
    fn record_sent_increments_both_counters() {
        let m = TransportMetrics::default();
        m.record_sent(10);
        m.record_sent(5);
        let snap = m.snapshot();
        assert_eq!(snap.datagrams_sent, 2);
        assert_eq!(snap.bytes_sent, 15);
    }

    #[test]
    fn record_send_error_does_not_touch_sent_counters() {
        let m = TransportMetrics::default();
        m.record_send_error();
        let snap = m.snapshot();
        assert_eq!(snap.send_errors, 1);
        assert_eq!(snap.datagrams_sent, 0);
    }
}
