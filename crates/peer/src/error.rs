use thiserror::Error;

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("bootstrap port {0} is outside the accepted range 6421..=6528")]
    BootstrapPortOutOfRange(u16),
    #[error("peer table is at capacity ({0})")]
    TableFull(usize),
}

pub type Result<T> = std::result::Result<T, PeerError>;
