use std::fs;
use std::path::Path;

use crate::encrypt::{decrypt_at_rest, encrypt_at_rest};

/// Persists an Ed25519 seed encrypted-at-rest under a caller-supplied
/// 32-byte key (`spec.md` §4.3). Corrupt files, wrong-key decryption, and
/// missing files all surface as "no key present" rather than an error —
/// callers cannot distinguish "never stored" from "unreadable" and should
/// not need to.
pub struct SeedStore;

impl SeedStore {
    /// Atomically stores `seed` encrypted under `key` at `path`. Writes to a
    /// sibling temp file first and renames over the destination so a reader
    /// never observes a partially written file.
    pub fn store(path: &Path, key: &[u8; 32], seed: &[u8; 32]) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let blob = encrypt_at_rest(key, seed).expect("encryption under a valid key cannot fail");
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, &blob)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Loads and decrypts the seed at `path` under `key`. Returns `None` for
    /// a missing file, a corrupt file, or a wrong key — never an error.
    pub fn load(path: &Path, key: &[u8; 32]) -> Option<[u8; 32]> {
        let blob = fs::read(path).ok()?;
        let plaintext = decrypt_at_rest(key, &blob).ok()?;
        if plaintext.len() != 32 {
            return None;
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&plaintext);
        Some(seed)
    }
}
