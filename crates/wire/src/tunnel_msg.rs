use tunnelmesh_bytes::{Reader, Writer};

use crate::error::Result;

/// Message-type byte for onion-wrapped application data carried over a
/// tunnel stream (`spec.md` §2: "Application bytes write to a Tunnel
/// Stream ... sent as onion-wrapped datagrams via C1"). The distilled wire
/// layout only gives bit-exact detail for the handshake and circuit
/// subprotocols; tunnel data reuses the same prefix/frame shape under its
/// own service byte and message type.
pub const TUNNEL_DATA_MSG_TYPE: u8 = 0x01;

/// stream-id (2) | ciphertext (remainder). The ciphertext is the output of
/// `circuit::encrypt_layers`, already `nonce || ciphertext || tag` per hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelDataPayload {
    pub stream_id: u16,
    pub ciphertext: Vec<u8>,
}

impl TunnelDataPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(2 + self.ciphertext.len());
        w.write_u16(self.stream_id);
        w.write_raw(&self.ciphertext);
        w.into_vec()
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data);
        let stream_id = r.take_u16()?;
        let ciphertext = r.take_rest().to_vec();
        Ok(TunnelDataPayload { stream_id, ciphertext })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tunnel_data_roundtrip() {
        let payload = TunnelDataPayload {
            stream_id: 42,
            ciphertext: vec![1, 2, 3, 4],
        };
        let decoded = TunnelDataPayload::decode(&payload.encode()).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn empty_ciphertext_roundtrips() {
        let payload = TunnelDataPayload {
            stream_id: 0,
            ciphertext: vec![],
        };
        let decoded = TunnelDataPayload::decode(&payload.encode()).unwrap();
        assert_eq!(decoded, payload);
    }
}
