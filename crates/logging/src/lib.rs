//! Structured logging setup (C11), shared by the daemon and the
//! demonstration CLI.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs a `tracing_subscriber` registry with an env-filter layer and a
/// human-readable formatter. Honors `RUST_LOG` when set; otherwise defaults
/// to `info` everywhere and `debug` for this workspace's own crates.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tunnelmesh=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}
