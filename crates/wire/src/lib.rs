//! Bit-exact wire codec for the handshake and circuit subprotocols
//! (`spec.md` §4.2). All multi-byte integers are big-endian; every message
//! carries a 23-byte community/service prefix.

mod circuit_msg;
mod error;
mod frame;
mod handshake_msg;
mod prefix;
mod tunnel_msg;

pub use circuit_msg::*;
pub use error::{CodecError, Result};
pub use frame::Frame;
pub use handshake_msg::*;
pub use prefix::{Prefix, PREFIX_LEN, PROTOCOL_VERSION, SERVICE_CIRCUIT, SERVICE_HANDSHAKE, SERVICE_TUNNEL};
pub use tunnel_msg::{TunnelDataPayload, TUNNEL_DATA_MSG_TYPE};
