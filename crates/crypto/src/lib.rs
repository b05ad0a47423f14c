//! TunnelMesh Cryptography
//!
//! Ed25519 identity, X25519 key agreement, HKDF-SHA256 key derivation,
//! ChaCha20-Poly1305 AEAD, and encrypted-at-rest identity storage.

mod encrypt;
mod keys;
mod storage;

pub use encrypt::*;
pub use keys::*;
pub use storage::SeedStore;
