use tunnelmesh_bytes::{Reader, Writer};

use crate::error::{CodecError, Result};

/// The protocol version byte every message starts with (`spec.md` §4.2).
pub const PROTOCOL_VERSION: u8 = 0x02;

/// Total length of the community/service prefix in bytes.
pub const PREFIX_LEN: usize = 23;

/// `service` byte identifying the handshake subprotocol. Message-type bytes
/// are only unambiguous once disambiguated by this field, since the
/// handshake and circuit subprotocols both start numbering at 0x01
/// (`spec.md` §4.2).
pub const SERVICE_HANDSHAKE: u8 = 0x01;

/// `service` byte identifying the circuit subprotocol.
pub const SERVICE_CIRCUIT: u8 = 0x02;

/// `service` byte identifying onion-wrapped tunnel data (`spec.md` §2,
/// "Application bytes write to a Tunnel Stream").
pub const SERVICE_TUNNEL: u8 = 0x03;

/// The 23-byte community/service prefix that precedes every message:
/// version byte, 20-byte community id, 1 service byte, 1 reserved byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prefix {
    pub community_id: [u8; 20],
    pub service: u8,
    pub reserved: u8,
}

impl Prefix {
    pub fn new(community_id: [u8; 20], service: u8) -> Self {
        Prefix {
            community_id,
            service,
            reserved: 0,
        }
    }

    pub fn encode(&self, w: &mut Writer) {
        w.write_u8(PROTOCOL_VERSION);
        w.write_raw(&self.community_id);
        w.write_u8(self.service);
        w.write_u8(self.reserved);
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let version = r.take_u8()?;
        if version != PROTOCOL_VERSION {
            return Err(CodecError::UnexpectedVersion(version));
        }
        let mut community_id = [0u8; 20];
        community_id.copy_from_slice(r.take_n(20)?);
        let service = r.take_u8()?;
        let reserved = r.take_u8()?;
        Ok(Prefix {
            community_id,
            service,
            reserved,
        })
    }
}
