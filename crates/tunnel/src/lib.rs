//! Tunnel Stream, Tunnel Proxy, Circuit Connection Pool, and the outbound
//! connector (C10).

mod connector;
mod error;
mod pool;
mod proxy;
mod stream;

pub use connector::{Connector, Socket};
pub use error::{Result, TunnelError};
pub use pool::{CircuitConnectionPool, CircuitLease};
pub use proxy::TunnelProxy;
pub use stream::{TunnelIo, TunnelStream};
