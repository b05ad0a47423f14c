use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EncryptError {
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("invalid key length")]
    InvalidKey,
    #[error("ciphertext too short")]
    CiphertextTooShort,
    #[error("nonce counter exhausted")]
    CounterExhausted,
}

/// Builds the 12-byte AEAD nonce for a given direction counter: a
/// little-endian u64 in the first 8 bytes, the remaining 4 bytes zero
/// (`spec.md` §4.3).
pub fn counter_nonce(counter: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[..8].copy_from_slice(&counter.to_le_bytes());
    nonce
}

/// Derives a 32-byte AEAD key from an X25519 shared secret via HKDF-SHA256
/// with `info = "hop-encryption-{hop_index}"` (`spec.md` §4.3/§3).
pub fn derive_hop_key(shared_secret: &[u8; 32], hop_index: u8) -> [u8; 32] {
    let hkdf = Hkdf::<Sha256>::new(None, shared_secret);
    let info = format!("hop-encryption-{}", hop_index);
    let mut key = [0u8; 32];
    hkdf.expand(info.as_bytes(), &mut key)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    key
}

/// ChaCha20-Poly1305 encrypt under an explicit nonce. Returns
/// `ciphertext || tag` only; callers that need the `nonce || ciphertext ||
/// tag` wire layout prepend the nonce themselves (see `crates/circuit`'s
/// `Hop::encrypt` and [`encrypt_at_rest`]).
pub fn aead_encrypt(key: &[u8; 32], nonce: &[u8; 12], plaintext: &[u8]) -> Result<Vec<u8>, EncryptError> {
    let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| EncryptError::InvalidKey)?;
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| EncryptError::EncryptionFailed)
}

/// ChaCha20-Poly1305 decrypt under an explicit nonce, given `ciphertext ||
/// tag`.
pub fn aead_decrypt(key: &[u8; 32], nonce: &[u8; 12], ciphertext: &[u8]) -> Result<Vec<u8>, EncryptError> {
    let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| EncryptError::InvalidKey)?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| EncryptError::DecryptionFailed)
}

/// Encrypts `plaintext` at rest under `key` with a random nonce, producing
/// `nonce || ciphertext || tag` (`spec.md` §4.3 Secure Storage). A random
/// nonce is appropriate here because storage is a single write each time,
/// not a counter-bounded direction like per-hop traffic.
pub fn encrypt_at_rest(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, EncryptError> {
    use rand::RngCore;
    let mut nonce_bytes = [0u8; 12];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let ciphertext = aead_encrypt(key, &nonce_bytes, plaintext)?;
    let mut out = Vec::with_capacity(12 + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypts a `nonce || ciphertext || tag` blob produced by
/// [`encrypt_at_rest`].
pub fn decrypt_at_rest(key: &[u8; 32], data: &[u8]) -> Result<Vec<u8>, EncryptError> {
    if data.len() < 12 {
        return Err(EncryptError::CiphertextTooShort);
    }
    let mut nonce = [0u8; 12];
    nonce.copy_from_slice(&data[..12]);
    aead_decrypt(key, &nonce, &data[12..])
}
