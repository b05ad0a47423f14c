use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("request timed out waiting for a response")]
    Timeout,
    #[error("transport send failed: {0}")]
    Transport(#[from] tunnelmesh_transport::TransportError),
}

pub type Result<T> = std::result::Result<T, NetworkError>;
