//! Configuration inputs for the anonymity core (C12, `spec.md` §6).
//!
//! There is no environment-variable or CLI-flag layer here by design: this
//! crate reads and writes a single JSON file and leaves flag parsing to
//! whatever binary embeds it.

mod config;
mod error;

pub use config::Config;
pub use error::{ConfigError, Result};

use std::path::PathBuf;

/// Default path for the config file: `tunnelmesh/config.json` under the
/// user's home directory, falling back to the current directory if `HOME`
/// is unset. This crate carries no keystore or platform-dirs dependency of
/// its own, unlike the settings it's modeled on, so the fallback stays
/// deliberately simple.
pub fn default_config_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join("tunnelmesh").join("config.json"),
        None => PathBuf::from("tunnelmesh").join("config.json"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_path_ends_with_expected_suffix() {
        let path = default_config_path();
        assert!(path.ends_with("tunnelmesh/config.json"));
    }
}
