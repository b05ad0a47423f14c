use thiserror::Error;
use tunnelmesh_crypto::EncryptError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CircuitError {
    #[error("circuit is already disposed")]
    Disposed,
    #[error("hop key exchange is not complete")]
    KeyExchangeIncomplete,
    #[error("cannot add hop: circuit is not in the Creating state")]
    NotCreating,
    #[error("cannot add hop: target hop count already reached")]
    HopCountReached,
    #[error("mark-established requires hop-count == target and every key exchange complete")]
    NotReadyForEstablishment,
    #[error("circuit is not in the Established state")]
    NotEstablished,
    #[error("hop index {0} out of range")]
    HopIndexOutOfRange(usize),
    #[error(transparent)]
    Encrypt(#[from] EncryptError),
}

pub type Result<T> = std::result::Result<T, CircuitError>;
