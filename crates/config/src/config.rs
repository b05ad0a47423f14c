use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ConfigError, Result};

fn default_hops() -> usize {
    3
}
fn default_min_hops() -> usize {
    1
}
fn default_max_hops() -> usize {
    3
}
fn default_min_concurrent_circuits() -> usize {
    2
}
fn default_max_concurrent_circuits() -> usize {
    3
}
fn default_circuit_lifetime_seconds() -> u64 {
    600
}
fn default_circuit_establishment_timeout_seconds() -> u64 {
    30
}
fn default_min_relay_reliability() -> f64 {
    0.7
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_circuit_health_check_interval_seconds() -> u64 {
    30
}
fn default_bootstrap_timeout_seconds() -> u64 {
    10
}
fn default_bootstrap_refresh_interval_seconds() -> u64 {
    60
}

/// Every configuration item recognized by the core (`spec.md` §6
/// "Configuration inputs"). Environment variables and CLI flags are
/// explicitly out of scope for this type; the demonstration CLI may expose
/// a thin flag surface of its own, translated into this struct at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_hops")]
    pub default_hops: usize,
    #[serde(default = "default_min_hops")]
    pub min_hops: usize,
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,

    #[serde(default = "default_min_concurrent_circuits")]
    pub min_concurrent_circuits: usize,
    #[serde(default = "default_max_concurrent_circuits")]
    pub max_concurrent_circuits: usize,

    #[serde(default = "default_circuit_lifetime_seconds")]
    pub circuit_lifetime_seconds: u64,
    #[serde(default = "default_circuit_establishment_timeout_seconds")]
    pub circuit_establishment_timeout_seconds: u64,

    #[serde(default = "default_min_relay_reliability")]
    pub min_relay_reliability: f64,
    #[serde(default = "default_true")]
    pub prefer_high_bandwidth_relays: bool,
    #[serde(default = "default_false")]
    pub prefer_low_latency_relays: bool,

    #[serde(default = "default_false")]
    pub allow_non_anonymous_fallback: bool,

    #[serde(default = "default_true")]
    pub enable_circuit_health_monitoring: bool,
    #[serde(default = "default_circuit_health_check_interval_seconds")]
    pub circuit_health_check_interval_seconds: u64,

    /// How long the initial bootstrap pass waits for at least one
    /// intro-handshake to complete before proceeding with partial results
    /// (`spec.md` §4.4).
    #[serde(default = "default_bootstrap_timeout_seconds")]
    pub bootstrap_timeout_seconds: u64,
    /// Interval between periodic liveness reprobes of known peers
    /// (`spec.md` §4.4, default 60 s).
    #[serde(default = "default_bootstrap_refresh_interval_seconds")]
    pub bootstrap_refresh_interval_seconds: u64,

    /// Where this instance was loaded from, if anywhere. Not serialized.
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            default_hops: default_hops(),
            min_hops: default_min_hops(),
            max_hops: default_max_hops(),
            min_concurrent_circuits: default_min_concurrent_circuits(),
            max_concurrent_circuits: default_max_concurrent_circuits(),
            circuit_lifetime_seconds: default_circuit_lifetime_seconds(),
            circuit_establishment_timeout_seconds: default_circuit_establishment_timeout_seconds(),
            min_relay_reliability: default_min_relay_reliability(),
            prefer_high_bandwidth_relays: default_true(),
            prefer_low_latency_relays: default_false(),
            allow_non_anonymous_fallback: default_false(),
            enable_circuit_health_monitoring: default_true(),
            circuit_health_check_interval_seconds: default_circuit_health_check_interval_seconds(),
            bootstrap_timeout_seconds: default_bootstrap_timeout_seconds(),
            bootstrap_refresh_interval_seconds: default_bootstrap_refresh_interval_seconds(),
            config_path: None,
        }
    }
}

impl Config {
    /// Loads from `path` if it exists, logging at `info`; otherwise falls
    /// back to defaults without treating a missing file as an error.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load_from(path) {
            Ok(config) => config,
            Err(err) => {
                info!(?path, error = %err, "no usable config file found, using defaults");
                let mut config = Config::default();
                config.config_path = Some(path.to_path_buf());
                config
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let mut config: Config = serde_json::from_str(&content).map_err(ConfigError::ParseError)?;
        config.config_path = Some(path.to_path_buf());
        info!(?path, "loaded config");
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = self
            .config_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("tunnelmesh.json"));
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(ConfigError::CreateDirError)?;
            }
        }
        let content = serde_json::to_string_pretty(self).map_err(ConfigError::ParseError)?;
        std::fs::write(path, content).map_err(ConfigError::WriteError)?;
        info!(?path, "saved config");
        Ok(())
    }
}
