use std::time::Duration;

/// Circuit manager configuration (`spec.md` §6 "Configuration inputs",
/// §4.8). Kept as a plain struct rather than threaded through a config
/// file itself — `tunnelmesh-config` owns persistence and converts into
/// this type.
#[derive(Debug, Clone, Copy)]
pub struct CircMgrConfig {
    pub min_hops: usize,
    pub max_hops: usize,
    pub default_hops: usize,
    pub min_concurrent_circuits: usize,
    pub max_concurrent_circuits: usize,
    pub circuit_lifetime: Duration,
    pub circuit_establishment_timeout: Duration,
    pub min_relay_reliability: f64,
    pub prefer_high_bandwidth_relays: bool,
    pub prefer_low_latency_relays: bool,
    pub heartbeat_timeout: Duration,
    pub maintenance_interval: Duration,
}

/// Minimum circuit lifetime accepted anywhere in the system (`spec.md`
/// §3: "minimum 60 s").
pub const MIN_CIRCUIT_LIFETIME: Duration = Duration::from_secs(60);

impl Default for CircMgrConfig {
    fn default() -> Self {
        CircMgrConfig {
            min_hops: 1,
            max_hops: 3,
            default_hops: 3,
            min_concurrent_circuits: 2,
            max_concurrent_circuits: 3,
            circuit_lifetime: Duration::from_secs(600),
            circuit_establishment_timeout: Duration::from_secs(30),
            min_relay_reliability: 0.7,
            prefer_high_bandwidth_relays: true,
            prefer_low_latency_relays: false,
            heartbeat_timeout: Duration::from_secs(90),
            maintenance_interval: Duration::from_secs(5),
        }
    }
}
