use tunnelmesh_bytes::{Reader, Writer};

use crate::error::Result;
use crate::prefix::Prefix;

/// A decoded datagram: the community/service prefix, the message-type byte,
/// and the undecoded payload bytes. Components that only dispatch by
/// message type (`spec.md` §2 "dispatched to C5/C7 by message type") work
/// with `Frame` directly before handing the payload to the matching
/// handshake or circuit payload decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<'a> {
    pub prefix: Prefix,
    pub message_type: u8,
    pub payload: &'a [u8],
}

impl<'a> Frame<'a> {
    pub fn decode(data: &'a [u8]) -> Result<Self> {
        let mut r = Reader::new(data);
        let prefix = Prefix::decode(&mut r)?;
        let message_type = r.take_u8()?;
        let payload = r.take_rest();
        Ok(Frame {
            prefix,
            message_type,
            payload,
        })
    }

    pub fn encode(prefix: Prefix, message_type: u8, payload: &[u8]) -> Vec<u8> {
        let mut w = Writer::with_capacity(crate::prefix::PREFIX_LEN + 1 + payload.len());
        prefix.encode(&mut w);
        w.write_u8(message_type);
        w.write_raw(payload);
        w.into_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_msg::{CircuitMsgType, DestroyPayload};

    #[test]
    fn frame_roundtrip() {
        let prefix = Prefix::new([1u8; 20], 2);
        let payload = DestroyPayload {
            circuit_id: 9,
            reason: 1,
        }
        .encode();
        let bytes = Frame::encode(prefix, CircuitMsgType::Destroy as u8, &payload);
        let frame = Frame::decode(&bytes).unwrap();
        assert_eq!(frame.prefix, prefix);
        assert_eq!(frame.message_type, CircuitMsgType::Destroy as u8);
        assert_eq!(frame.payload, payload.as_slice());
    }

    #[test]
    fn frame_decode_rejects_truncated_prefix() {
        assert!(Frame::decode(&[0u8; 5]).is_err());
    }
}
