//! UDP transport (C1): bind/send/receive and lock-free metrics.

mod error;
mod metrics;
mod udp;

pub use error::{Result, TransportError};
pub use metrics::{TransportMetrics, TransportMetricsSnapshot};
pub use udp::{Datagram, UdpTransport, MAX_DATAGRAM_LEN};
