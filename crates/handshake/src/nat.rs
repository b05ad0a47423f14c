use tunnelmesh_peer::NatType;

/// Minimum number of puncture attempts required before NAT type is
/// classified (`spec.md` §4.5). Below this, classification stays
/// `Unknown`.
pub const MIN_ATTEMPTS_FOR_CLASSIFICATION: u32 = 3;

/// Running tally of puncture outcomes for one peer, used to infer its NAT
/// behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct PunctureStats {
    pub successes: u32,
    pub failures: u32,
}

impl PunctureStats {
    pub fn attempts(&self) -> u32 {
        self.successes + self.failures
    }

    pub fn failure_rate(&self) -> f64 {
        let attempts = self.attempts();
        if attempts == 0 {
            0.0
        } else {
            self.failures as f64 / attempts as f64
        }
    }

    pub fn record_success(&mut self) {
        self.successes += 1;
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    /// Classifies NAT behavior once enough samples exist (`spec.md` §4.5):
    /// failure rate ≥ 0.5 ⇒ Symmetric; < 0.2 with some successes ⇒
    /// PortRestrictedCone; otherwise RestrictedCone.
    pub fn classify(&self) -> NatType {
        if self.attempts() < MIN_ATTEMPTS_FOR_CLASSIFICATION {
            return NatType::Unknown;
        }
        if self.failure_rate() >= 0.5 {
            NatType::Symmetric
        } else if self.failure_rate() < 0.2 && self.successes > 0 {
            NatType::PortRestrictedCone
        } else {
            NatType::RestrictedCone
        }
    }
}

/// Symmetric peers may still serve as direct circuit relays but are never
/// chosen as puncture targets for other peers' NAT traversal.
pub fn eligible_as_puncture_target(nat_type: NatType) -> bool {
    !matches!(nat_type, NatType::Symmetric)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fewer_than_three_attempts_stays_unknown() {
        let mut stats = PunctureStats::default();
        stats.record_success();
        stats.record_failure();
        assert_eq!(stats.classify(), NatType::Unknown);
    }

    #[test]
    fn high_failure_rate_classifies_symmetric() {
        let mut stats = PunctureStats::default();
        stats.record_success();
        stats.record_failure();
        stats.record_failure();
        assert_eq!(stats.classify(), NatType::Symmetric);
    }

    #[test]
    fn low_failure_rate_with_successes_classifies_port_restricted_cone() {
        let mut stats = PunctureStats::default();
        for _ in 0..9 {
            stats.record_success();
        }
        stats.record_failure();
        assert_eq!(stats.classify(), NatType::PortRestrictedCone);
    }

    #[test]
    fn middling_failure_rate_classifies_restricted_cone() {
        let mut stats = PunctureStats::default();
        stats.record_success();
        stats.record_success();
        stats.record_success();
        stats.record_failure();
        // failure_rate = 0.25, not >= 0.5 and not < 0.2
        assert_eq!(stats.classify(), NatType::RestrictedCone);
    }

    #[test]
    fn symmetric_peers_are_not_puncture_targets() {
        assert!(!eligible_as_puncture_target(NatType::Symmetric));
        assert!(eligible_as_puncture_target(NatType::RestrictedCone));
        assert!(eligible_as_puncture_target(NatType::PortRestrictedCone));
        assert!(eligible_as_puncture_target(NatType::Unknown));
    }
}
