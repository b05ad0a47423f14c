use thiserror::Error;

/// `Circuit/NoRelay`, `Circuit/LimitReached`, `Network/Timeout` (`spec.md`
/// §7). The circuit manager isolates every failure to the single circuit
/// under construction; callers decide whether to retry.
#[derive(Debug, Error)]
pub enum CircMgrError {
    #[error("no eligible relay for hop {0}")]
    NoRelay(usize),
    #[error("active circuit count has reached the configured limit")]
    LimitReached,
    #[error("requested hop count {requested} outside configured range {min}..={max}")]
    HopCountOutOfRange { requested: usize, min: usize, max: usize },
    #[error("circuit construction exceeded its establishment deadline")]
    EstablishmentTimeout,
    #[error(transparent)]
    Network(#[from] tunnelmesh_netclient::NetworkError),
    #[error(transparent)]
    Circuit(#[from] tunnelmesh_circuit::CircuitError),
    #[error("unknown circuit id {0}")]
    UnknownCircuit(u32),
}

pub type Result<T> = std::result::Result<T, CircMgrError>;
