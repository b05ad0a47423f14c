use tunnelmesh_bytes::BytesError;

/// `Codec/Invalid` in `spec.md` §7 — malformed frames are dropped, never
/// panicked on.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("truncated or malformed frame: {0}")]
    Truncated(#[from] BytesError),
    #[error("unknown message type byte {0:#04x}")]
    UnknownMessageType(u8),
    #[error("unexpected prefix version byte {0:#04x}")]
    UnexpectedVersion(u8),
    #[error("public key field must be exactly 32 bytes, got {0}")]
    InvalidPublicKeyLength(usize),
    #[error("trailing bytes after decoding a fixed-length payload")]
    TrailingBytes,
}

pub type Result<T> = std::result::Result<T, CodecError>;
