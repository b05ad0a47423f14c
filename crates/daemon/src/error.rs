use thiserror::Error;

use tunnelmesh_circmgr::CircMgrError;
use tunnelmesh_config::ConfigError;
use tunnelmesh_peer::PeerError;
use tunnelmesh_transport::TransportError;
use tunnelmesh_tunnel::TunnelError;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("circuit manager error: {0}")]
    CircMgr(#[from] CircMgrError),

    #[error("tunnel error: {0}")]
    Tunnel(#[from] TunnelError),

    #[error("bootstrap list is invalid: {0}")]
    Bootstrap(#[from] PeerError),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
