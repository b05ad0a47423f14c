//! Top-level wiring for one node: binds the transport and assembles every
//! layer from the UDP transport up through the tunnel connector behind a
//! single [`NetworkContext`] facade.

mod context;
mod error;
mod status;

pub use context::NetworkContext;
pub use error::{DaemonError, Result};
pub use status::{NodeStatus, NodeStatusCell};
