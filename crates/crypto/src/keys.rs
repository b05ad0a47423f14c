use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha1::{Digest as Sha1Digest, Sha1};
use sha2::{Digest as Sha2Digest, Sha256};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

/// Ed25519 keypair used for long-term node identity and signing.
pub struct SigningKeypair {
    pub signing_key: SigningKey,
    pub verifying_key: VerifyingKey,
}

impl Clone for SigningKeypair {
    fn clone(&self) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&self.signing_key.to_bytes()),
            verifying_key: self.verifying_key,
        }
    }
}

impl SigningKeypair {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    pub fn secret_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(secret);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    pub fn sign(&self, data: &[u8]) -> [u8; 64] {
        let signature: Signature = self.signing_key.sign(data);
        signature.to_bytes()
    }
}

/// Verify an Ed25519 signature over `data` using a raw 32-byte public key.
pub fn verify_signature(pubkey: &[u8; 32], data: &[u8], signature: &[u8; 64]) -> bool {
    let verifying_key = match VerifyingKey::from_bytes(pubkey) {
        Ok(vk) => vk,
        Err(_) => return false,
    };
    let signature = Signature::from_bytes(signature);
    verifying_key.verify(data, &signature).is_ok()
}

/// X25519 keypair used for per-hop key agreement.
pub struct EncryptionKeypair {
    pub secret: StaticSecret,
    pub public: X25519PublicKey,
}

impl Clone for EncryptionKeypair {
    fn clone(&self) -> Self {
        let secret_bytes = self.secret.as_bytes();
        let secret = StaticSecret::from(*secret_bytes);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }
}

impl EncryptionKeypair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    pub fn secret_key_bytes(&self) -> [u8; 32] {
        *self.secret.as_bytes()
    }

    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        let secret = StaticSecret::from(*secret);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// X25519 Diffie-Hellman agreement: `agree(our_private, their_public)`.
    pub fn diffie_hellman(&self, their_public: &[u8; 32]) -> [u8; 32] {
        let their_public = X25519PublicKey::from(*their_public);
        let shared = self.secret.diffie_hellman(&their_public);
        *shared.as_bytes()
    }
}

/// The node's long-term identity: an Ed25519 signing keypair plus a derived
/// peer-id. A fresh X25519 keypair is generated per hop/circuit rather than
/// carried on the identity (`spec.md` §4.6 hop key exchange is per-circuit).
pub struct Identity {
    pub signing: SigningKeypair,
}

impl Identity {
    pub fn generate() -> Self {
        Self {
            signing: SigningKeypair::generate(),
        }
    }

    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        Self {
            signing: SigningKeypair::from_secret_bytes(secret),
        }
    }

    pub fn pubkey(&self) -> [u8; 32] {
        self.signing.public_key_bytes()
    }

    /// 40-hex-char SHA-1 peer-id of the raw public key (`spec.md` §3).
    pub fn peer_id(&self) -> String {
        peer_id_of(&self.pubkey())
    }
}

/// Derive the 40-hex-char SHA-1 peer-id of a raw Ed25519 public key.
pub fn peer_id_of(pubkey: &[u8; 32]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(pubkey);
    let digest: [u8; 20] = hasher.finalize().into();
    hex::encode(digest)
}

/// SHA-256 of arbitrary data, used where the corpus hashes shared secrets.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_keypair_roundtrip() {
        let kp = SigningKeypair::generate();
        let restored = SigningKeypair::from_secret_bytes(&kp.secret_key_bytes());
        assert_eq!(restored.public_key_bytes(), kp.public_key_bytes());
    }

    #[test]
    fn sign_and_verify() {
        let kp = SigningKeypair::generate();
        let data = b"circuit-id:42";
        let sig = kp.sign(data);
        assert!(verify_signature(&kp.public_key_bytes(), data, &sig));
        assert!(!verify_signature(&kp.public_key_bytes(), b"tampered", &sig));
    }

    #[test]
    fn encryption_keypair_roundtrip() {
        let kp = EncryptionKeypair::generate();
        let restored = EncryptionKeypair::from_secret_bytes(&kp.secret_key_bytes());
        assert_eq!(restored.public_key_bytes(), kp.public_key_bytes());
    }

    #[test]
    fn diffie_hellman_agrees() {
        let alice = EncryptionKeypair::generate();
        let bob = EncryptionKeypair::generate();
        let alice_shared = alice.diffie_hellman(&bob.public_key_bytes());
        let bob_shared = bob.diffie_hellman(&alice.public_key_bytes());
        assert_eq!(alice_shared, bob_shared);
    }

    #[test]
    fn peer_id_is_40_hex_chars() {
        let id = Identity::generate();
        let peer_id = id.peer_id();
        assert_eq!(peer_id.len(), 40);
        assert!(peer_id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn peer_id_is_deterministic() {
        let pubkey = [7u8; 32];
        assert_eq!(peer_id_of(&pubkey), peer_id_of(&pubkey));
    }

    #[test]
    fn peer_id_differs_by_pubkey() {
        assert_ne!(peer_id_of(&[1u8; 32]), peer_id_of(&[2u8; 32]));
    }
}
