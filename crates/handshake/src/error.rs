use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("handshake timed out before reaching a terminal state")]
    TimedOut,
    #[error("handshake is already in a terminal state")]
    AlreadyTerminal,
    #[error("received a puncture for an unknown identifier {0}")]
    UnknownIdentifier(u16),
}

pub type Result<T> = std::result::Result<T, HandshakeError>;
