//! The key file: 128 bytes of random secret material plus the pure
//! derivation functions the rest of the system consumes.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;

use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha512;
use zeroize::Zeroize;

use sfs_core::{ChunkHash, ChunkKey, DbKey, SfsError, SfsResult, StorageAddress};

/// Exact size of the secret material on disk.
pub const SECRET_LEN: usize = 128;

const INFO_DB_KEY: &[u8] = b"shardfs v1 db key";
const INFO_CHUNK_KEY: &[u8] = b"shardfs v1 chunk key";
const INFO_CHUNK_NAME: &[u8] = b"shardfs v1 chunk name";

/// Secret state behind every derived key and storage address.
///
/// All three derivations are deterministic: the same secret and content
/// hash always yield the same key and address.
pub struct KeyFile {
    secret: [u8; SECRET_LEN],
}

impl KeyFile {
    /// Generate fresh random secret material.
    pub fn generate() -> Self {
        let mut secret = [0u8; SECRET_LEN];
        rand::thread_rng().fill_bytes(&mut secret);
        Self { secret }
    }

    pub fn from_bytes(secret: [u8; SECRET_LEN]) -> Self {
        Self { secret }
    }

    /// Load a key file; fails unless it is exactly [`SECRET_LEN`] bytes.
    pub fn load(path: &Path) -> SfsResult<Self> {
        let raw = fs::read(path)?;
        if raw.len() != SECRET_LEN {
            return Err(SfsError::Validation(format!(
                "key file {} must be {} bytes, got {}",
                path.display(),
                SECRET_LEN,
                raw.len()
            )));
        }
        let mut secret = [0u8; SECRET_LEN];
        secret.copy_from_slice(&raw);
        Ok(Self { secret })
    }

    /// Write the secret to a new file. Refuses to overwrite: losing an old
    /// secret makes every existing chunk unreadable.
    pub fn save(&self, path: &Path) -> SfsResult<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        file.write_all(&self.secret)?;
        Ok(())
    }

    /// Key for the encrypted database envelope.
    pub fn db_key(&self) -> DbKey {
        let mut okm = [0u8; 32];
        self.expand(INFO_DB_KEY, &[], &mut okm);
        DbKey::from_bytes(okm)
    }

    /// Symmetric key for the chunk with the given plaintext content hash.
    pub fn chunk_key(&self, hash: &ChunkHash) -> ChunkKey {
        let mut okm = [0u8; 32];
        self.expand(INFO_CHUNK_KEY, hash.as_bytes(), &mut okm);
        ChunkKey::from_bytes(okm)
    }

    /// On-disk storage address for the chunk with the given content hash.
    pub fn chunk_storage_address(&self, hash: &ChunkHash) -> StorageAddress {
        let mut okm = [0u8; 64];
        self.expand(INFO_CHUNK_NAME, hash.as_bytes(), &mut okm);
        StorageAddress::from_bytes(okm)
    }

    fn expand(&self, domain: &[u8], input: &[u8], okm: &mut [u8]) {
        let hk = Hkdf::<Sha512>::new(None, &self.secret);
        let mut info = Vec::with_capacity(domain.len() + input.len());
        info.extend_from_slice(domain);
        info.extend_from_slice(input);
        hk.expand(&info, okm)
            .unwrap_or_else(|_| unreachable!("output length is far below the HKDF limit"));
    }
}

impl Drop for KeyFile {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl fmt::Debug for KeyFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyFile")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_hash(fill: u8) -> ChunkHash {
        ChunkHash::from_bytes([fill; 64])
    }

    #[test]
    fn derivations_are_deterministic() {
        let k = KeyFile::from_bytes([3u8; SECRET_LEN]);
        let h = test_hash(9);

        assert_eq!(k.db_key(), k.db_key());
        assert_eq!(k.chunk_key(&h), k.chunk_key(&h));
        assert_eq!(k.chunk_storage_address(&h), k.chunk_storage_address(&h));
    }

    #[test]
    fn different_hashes_get_different_material() {
        let k = KeyFile::from_bytes([3u8; SECRET_LEN]);
        assert_ne!(k.chunk_key(&test_hash(1)), k.chunk_key(&test_hash(2)));
        assert_ne!(
            k.chunk_storage_address(&test_hash(1)),
            k.chunk_storage_address(&test_hash(2))
        );
    }

    #[test]
    fn domains_are_separated() {
        // the address derivation must not leak the chunk key
        let k = KeyFile::from_bytes([3u8; SECRET_LEN]);
        let h = test_hash(7);
        let addr = k.chunk_storage_address(&h);
        let key = k.chunk_key(&h);
        assert_ne!(&addr.as_bytes()[..32], key.as_bytes().as_slice());
    }

    #[test]
    fn different_secrets_get_different_material() {
        let a = KeyFile::from_bytes([1u8; SECRET_LEN]);
        let b = KeyFile::from_bytes([2u8; SECRET_LEN]);
        let h = test_hash(7);
        assert_ne!(a.db_key(), b.db_key());
        assert_ne!(a.chunk_key(&h), b.chunk_key(&h));
        assert_ne!(a.chunk_storage_address(&h), b.chunk_storage_address(&h));
    }

    #[test]
    fn save_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.keyfile");

        let k = KeyFile::generate();
        k.save(&path).unwrap();
        assert!(k.save(&path).is_err());

        let loaded = KeyFile::load(&path).unwrap();
        assert_eq!(loaded.db_key(), k.db_key());
    }

    #[test]
    fn load_rejects_wrong_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.keyfile");
        fs::write(&path, [0u8; 17]).unwrap();

        assert!(matches!(
            KeyFile::load(&path),
            Err(SfsError::Validation(_))
        ));
    }
}
