use thiserror::Error;

/// `Pool/Timeout`, `Tunnel/NoCircuit` (`spec.md` §7).
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("pool acquire timed out waiting for a usable circuit")]
    PoolTimeout,
    #[error("no circuit available and direct-connection fallback is disabled")]
    NoCircuit,
    #[error("stream-id space is exhausted")]
    StreamIdsExhausted,
    #[error("unknown stream id {0}")]
    UnknownStream(u16),
    #[error("stream {0} is already closed")]
    StreamClosed(u16),
    #[error(transparent)]
    CircMgr(#[from] tunnelmesh_circmgr::CircMgrError),
    #[error(transparent)]
    Circuit(#[from] tunnelmesh_circuit::CircuitError),
}

pub type Result<T> = std::result::Result<T, TunnelError>;
