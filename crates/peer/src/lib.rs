//! Peer table and bootstrap endpoints (C4).

mod bootstrap;
mod error;
mod peer;
mod table;

pub use bootstrap::{
    validate_bootstrap_list, BootstrapEndpoint, BOOTSTRAP_ENDPOINTS, BOOTSTRAP_PORT_MAX,
    BOOTSTRAP_PORT_MIN,
};
pub use error::{PeerError, Result};
pub use peer::{NatType, Peer, CONSECUTIVE_FAILURE_THRESHOLD};
pub use table::{PeerTable, DEFAULT_MAX_PEERS};
