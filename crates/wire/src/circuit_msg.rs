use tunnelmesh_bytes::{Reader, Writer};

use crate::error::{CodecError, Result};

/// Message-type byte within the circuit subprotocol (`spec.md` §4.2). These
/// values overlap with [`crate::handshake_msg::HandshakeMsgType`]'s byte
/// values by design — the two message families are distinguished by the
/// prefix's `service` byte, not by a single shared type space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitMsgType {
    Create = 0x02,
    Created = 0x03,
    Extend = 0x04,
    Extended = 0x05,
    Destroy = 0x08,
}

impl CircuitMsgType {
    pub fn from_byte(b: u8) -> Result<Self> {
        match b {
            0x02 => Ok(CircuitMsgType::Create),
            0x03 => Ok(CircuitMsgType::Created),
            0x04 => Ok(CircuitMsgType::Extend),
            0x05 => Ok(CircuitMsgType::Extended),
            0x08 => Ok(CircuitMsgType::Destroy),
            other => Err(CodecError::UnknownMessageType(other)),
        }
    }
}

fn read_pubkey_field(r: &mut Reader<'_>) -> Result<[u8; 32]> {
    let slice = r.take_u16_len_prefixed()?;
    if slice.len() != 32 {
        return Err(CodecError::InvalidPublicKeyLength(slice.len()));
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(slice);
    Ok(arr)
}

fn write_pubkey_field(w: &mut Writer, key: &[u8; 32]) {
    w.write_u16_len_prefixed(key).expect("32 bytes fits in a u16 length prefix");
}

/// circuit-id (4) | identifier (2) | node-public-key (len=32|32B) |
/// ephemeral-pubkey (len=32|32B). 74 bytes total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePayload {
    pub circuit_id: u32,
    pub identifier: u16,
    pub node_public_key: [u8; 32],
    pub ephemeral_pubkey: [u8; 32],
}

impl CreatePayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(74);
        w.write_u32(self.circuit_id);
        w.write_u16(self.identifier);
        write_pubkey_field(&mut w, &self.node_public_key);
        write_pubkey_field(&mut w, &self.ephemeral_pubkey);
        w.into_vec()
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data);
        let circuit_id = r.take_u32()?;
        let identifier = r.take_u16()?;
        let node_public_key = read_pubkey_field(&mut r)?;
        let ephemeral_pubkey = read_pubkey_field(&mut r)?;
        Ok(CreatePayload {
            circuit_id,
            identifier,
            node_public_key,
            ephemeral_pubkey,
        })
    }
}

/// circuit-id (4) | identifier (2) | ephemeral-pubkey (len=32|32B) | auth
/// (fixed 32B, no length prefix) | candidates (trailing remainder). Shared
/// by CREATED and EXTENDED, which carry identical fields (`spec.md` §4.2).
/// The fixed-width `auth` field is deliberately not length-prefixed, unlike
/// its sibling `ephemeral_pubkey` (`spec.md` §9 Open Question ii).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPayload {
    pub circuit_id: u32,
    pub identifier: u16,
    pub ephemeral_pubkey: [u8; 32],
    pub auth: [u8; 32],
    pub candidates: Vec<u8>,
}

impl CreatedPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(72 + self.candidates.len());
        w.write_u32(self.circuit_id);
        w.write_u16(self.identifier);
        write_pubkey_field(&mut w, &self.ephemeral_pubkey);
        w.write_raw(&self.auth);
        w.write_raw(&self.candidates);
        w.into_vec()
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data);
        let circuit_id = r.take_u32()?;
        let identifier = r.take_u16()?;
        let ephemeral_pubkey = read_pubkey_field(&mut r)?;
        let auth = r.take_array_32()?;
        let candidates = r.take_rest().to_vec();
        Ok(CreatedPayload {
            circuit_id,
            identifier,
            ephemeral_pubkey,
            auth,
            candidates,
        })
    }
}

/// `ExtendedPayload` is wire-identical to `CreatedPayload` (`spec.md` §4.2),
/// but kept as a distinct type so callers cannot mix up which exchange a
/// response belongs to.
pub type ExtendedPayload = CreatedPayload;

/// circuit-id (4) | node-public-key (len=32|32B) | ipv4 (4) | port (2) |
/// identifier (2). 46 bytes total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendPayload {
    pub circuit_id: u32,
    pub node_public_key: [u8; 32],
    pub ipv4: u32,
    pub port: u16,
    pub identifier: u16,
}

impl ExtendPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(46);
        w.write_u32(self.circuit_id);
        write_pubkey_field(&mut w, &self.node_public_key);
        w.write_u32(self.ipv4);
        w.write_u16(self.port);
        w.write_u16(self.identifier);
        w.into_vec()
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data);
        let circuit_id = r.take_u32()?;
        let node_public_key = read_pubkey_field(&mut r)?;
        let ipv4 = r.take_u32()?;
        let port = r.take_u16()?;
        let identifier = r.take_u16()?;
        Ok(ExtendPayload {
            circuit_id,
            node_public_key,
            ipv4,
            port,
            identifier,
        })
    }
}

/// circuit-id (4) | reason (2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestroyPayload {
    pub circuit_id: u32,
    pub reason: u16,
}

impl DestroyPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(6);
        w.write_u32(self.circuit_id);
        w.write_u16(self.reason);
        w.into_vec()
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data);
        let circuit_id = r.take_u32()?;
        let reason = r.take_u16()?;
        Ok(DestroyPayload { circuit_id, reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq_bytes(start: u8, count: usize) -> Vec<u8> {
        (0..count).map(|i| start.wrapping_add(i as u8)).collect()
    }

    fn arr32(bytes: &[u8]) -> [u8; 32] {
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        arr
    }

    /// Scenario 1 of `spec.md` §8: EXTEND encode with concrete byte fixture.
    #[test]
    fn extend_encode_matches_fixture() {
        let payload = ExtendPayload {
            circuit_id: 0x0000_0042,
            node_public_key: arr32(&seq_bytes(0x00, 32)),
            ipv4: 0x0A00_0001,
            port: 0x1AE1,
            identifier: 0x1234,
        };
        let bytes = payload.encode();
        assert_eq!(bytes.len(), 46);
        assert_eq!(&bytes[0..4], &[0x00, 0x00, 0x00, 0x42]);
        assert_eq!(&bytes[38..42], &[0x0A, 0x00, 0x00, 0x01]);
        assert_eq!(&bytes[42..44], &[0x1A, 0xE1]);
        assert_eq!(&bytes[44..46], &[0x12, 0x34]);
    }

    #[test]
    fn extend_roundtrip() {
        let payload = ExtendPayload {
            circuit_id: 42,
            node_public_key: [5u8; 32],
            ipv4: 0x7F000001,
            port: 443,
            identifier: 99,
        };
        let decoded = ExtendPayload::decode(&payload.encode()).unwrap();
        assert_eq!(decoded, payload);
    }

    /// Scenario 2 of `spec.md` §8: CREATED parse with concrete byte fixture.
    #[test]
    fn created_parse_matches_fixture() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&7u32.to_be_bytes());
        bytes.extend_from_slice(&9u16.to_be_bytes());
        bytes.extend_from_slice(&32u16.to_be_bytes());
        bytes.extend_from_slice(&seq_bytes(0x01, 32));
        bytes.extend_from_slice(&seq_bytes(0x21, 32));
        assert_eq!(bytes.len(), 72);

        let decoded = CreatedPayload::decode(&bytes).unwrap();
        assert_eq!(decoded.circuit_id, 7);
        assert_eq!(decoded.identifier, 9);
        assert_eq!(decoded.ephemeral_pubkey, arr32(&seq_bytes(0x01, 32)));
        assert_eq!(decoded.auth, arr32(&seq_bytes(0x21, 32)));
        assert!(decoded.candidates.is_empty());
    }

    #[test]
    fn created_roundtrip_with_candidates() {
        let payload = CreatedPayload {
            circuit_id: 1,
            identifier: 2,
            ephemeral_pubkey: [3u8; 32],
            auth: [4u8; 32],
            candidates: vec![9, 9, 9],
        };
        let decoded = CreatedPayload::decode(&payload.encode()).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn create_roundtrip_is_74_bytes() {
        let payload = CreatePayload {
            circuit_id: 1,
            identifier: 2,
            node_public_key: [1u8; 32],
            ephemeral_pubkey: [2u8; 32],
        };
        let bytes = payload.encode();
        assert_eq!(bytes.len(), 74);
        assert_eq!(CreatePayload::decode(&bytes).unwrap(), payload);
    }

    #[test]
    fn create_rejects_non_32_byte_public_key() {
        let mut w = Writer::new();
        w.write_u32(1);
        w.write_u16(2);
        w.write_u16_len_prefixed(&[1, 2, 3]).unwrap();
        w.write_u16_len_prefixed(&[4u8; 32]).unwrap();
        let bytes = w.into_vec();
        assert!(matches!(
            CreatePayload::decode(&bytes),
            Err(CodecError::InvalidPublicKeyLength(3))
        ));
    }

    #[test]
    fn destroy_roundtrip() {
        let payload = DestroyPayload {
            circuit_id: 5,
            reason: 2,
        };
        let bytes = payload.encode();
        assert_eq!(bytes.len(), 6);
        assert_eq!(DestroyPayload::decode(&bytes).unwrap(), payload);
    }

    #[test]
    fn circuit_msg_type_roundtrip() {
        assert_eq!(CircuitMsgType::from_byte(0x02).unwrap(), CircuitMsgType::Create);
        assert_eq!(CircuitMsgType::from_byte(0x08).unwrap(), CircuitMsgType::Destroy);
        assert!(CircuitMsgType::from_byte(0xFF).is_err());
    }

    #[test]
    fn truncated_extend_is_rejected() {
        let bytes = vec![0u8; 10];
        assert!(ExtendPayload::decode(&bytes).is_err());
    }
}
