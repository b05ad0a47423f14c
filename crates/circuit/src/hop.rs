use tunnelmesh_crypto::{aead_decrypt, aead_encrypt, counter_nonce, derive_hop_key, EncryptError};

use crate::error::{CircuitError, Result};

/// One hop of a circuit: the relay's identity, the negotiated AEAD key, and
/// independent send/receive nonce counters (`spec.md` §4.6).
pub struct Hop {
    pub relay_public_key: [u8; 32],
    key: [u8; 32],
    send_counter: u64,
    recv_counter: u64,
    disposed: bool,
}

impl Hop {
    /// Derives the hop's AEAD key from the X25519 shared secret via HKDF
    /// (`spec.md` §4.3), keyed by the hop's position in the circuit.
    pub fn new(relay_public_key: [u8; 32], shared_secret: &[u8; 32], hop_index: u8) -> Self {
        Hop {
            relay_public_key,
            key: derive_hop_key(shared_secret, hop_index),
            send_counter: 0,
            recv_counter: 0,
            disposed: false,
        }
    }

    /// Encrypts one layer, producing `nonce || ciphertext || tag`. The
    /// send counter advances monotonically and refuses to wrap
    /// (`spec.md` §8: "hop counters at u64::MAX refuse to encrypt").
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        if self.disposed {
            return Err(CircuitError::Disposed);
        }
        if self.send_counter == u64::MAX {
            return Err(CircuitError::Encrypt(EncryptError::CounterExhausted));
        }
        let nonce = counter_nonce(self.send_counter);
        let ciphertext = aead_encrypt(&self.key, &nonce, plaintext)?;
        self.send_counter += 1;

        let mut out = Vec::with_capacity(12 + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypts one layer. The first 12 bytes of `data` are the nonce
    /// (`spec.md` §4.6).
    pub fn decrypt(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        if self.disposed {
            return Err(CircuitError::Disposed);
        }
        if data.len() < 12 {
            return Err(CircuitError::Encrypt(EncryptError::CiphertextTooShort));
        }
        let mut nonce = [0u8; 12];
        nonce.copy_from_slice(&data[..12]);
        let plaintext = aead_decrypt(&self.key, &nonce, &data[12..])?;
        self.recv_counter += 1;
        Ok(plaintext)
    }

    /// Zeroes the AEAD key and marks the hop unusable. Idempotent.
    pub fn dispose(&mut self) {
        self.key = [0u8; 32];
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_hop() -> Hop {
        Hop::new([1u8; 32], &[2u8; 32], 0)
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let mut sender = test_hop();
        let mut receiver = test_hop();
        let wire = sender.encrypt(b"payload").unwrap();
        let plaintext = receiver.decrypt(&wire).unwrap();
        assert_eq!(plaintext, b"payload");
    }

    #[test]
    fn send_counter_advances_each_call() {
        let mut hop = test_hop();
        let first = hop.encrypt(b"a").unwrap();
        let second = hop.encrypt(b"a").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn decrypt_rejects_short_input() {
        let mut hop = test_hop();
        assert!(matches!(
            hop.decrypt(&[0u8; 4]),
            Err(CircuitError::Encrypt(EncryptError::CiphertextTooShort))
        ));
    }

    #[test]
    fn dispose_zeroes_key_and_blocks_further_use() {
        let mut hop = test_hop();
        hop.dispose();
        assert!(hop.is_disposed());
        assert_eq!(hop.encrypt(b"x"), Err(CircuitError::Disposed));
    }

    #[test]
    fn dispose_is_idempotent() {
        let mut hop = test_hop();
        hop.dispose();
        hop.dispose();
        assert!(hop.is_disposed());
    }

    #[test]
    fn counter_at_max_refuses_to_encrypt() {
        let mut hop = test_hop();
        hop.send_counter = u64::MAX;
        assert!(matches!(
            hop.encrypt(b"x"),
            Err(CircuitError::Encrypt(EncryptError::CounterExhausted))
        ));
    }
}
