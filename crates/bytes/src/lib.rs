//! Big-endian byte-reading and byte-writing primitives for the wire codec.
//!
//! Every multi-byte integer on the wire is big-endian. Length-prefixed byte
//! strings carry a 2-byte big-endian length. These primitives never panic on
//! malformed input; truncated reads return [`BytesError::Truncated`].

mod reader;
mod writer;

pub use reader::Reader;
pub use writer::Writer;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum BytesError {
    #[error("unexpected end of input: wanted {wanted} bytes, {available} available")]
    Truncated { wanted: usize, available: usize },
    #[error("length-prefixed field too long: {0} bytes")]
    TooLong(usize),
}

pub type Result<T> = std::result::Result<T, BytesError>;
