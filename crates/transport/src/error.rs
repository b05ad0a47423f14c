/// `Transport/BindError`, `Transport/SendError` (`spec.md` §7). Bind
/// failures are fatal to startup; send failures are surfaced to the caller
/// but only increment a counter at the transport layer itself — they never
/// abort the receive loop.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("failed to bind UDP socket on port {port}: {source}")]
    BindError { port: u16, source: std::io::Error },
    #[error("send failed: {0}")]
    SendError(std::io::Error),
    #[error("datagram of {0} bytes exceeds the 65507-byte UDP payload limit")]
    DatagramTooLarge(usize),
}

pub type Result<T> = std::result::Result<T, TransportError>;
