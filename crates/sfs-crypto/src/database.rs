//! Encrypted metadata database: `nonce || ciphertext` on disk.
//!
//! The tree serializes to JSON and is sealed with XChaCha20-Poly1305
//! under the db key. No version tag, no plaintext header. A missing file
//! is the valid "first run" state, not an error; the writer replaces the
//! file in place (not atomically — the loader's error taxonomy lets a
//! reader distinguish a half-written file from tampering).

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use tracing::debug;

use sfs_core::{DbKey, FileTree, SfsError, SfsResult};

use crate::NONCE_SIZE;

/// Serialize and encrypt `tree`, overwriting `path`.
pub fn save(path: &Path, key: &DbKey, tree: &FileTree) -> SfsResult<()> {
    let plaintext =
        serde_json::to_vec(tree).map_err(|e| SfsError::Database(format!("serialize: {e}")))?;

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_ref())
        .map_err(|e| SfsError::Database(format!("encrypt: {e}")))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    fs::write(path, &out)?;

    debug!(path = %path.display(), entries = tree.len(), "database saved");
    Ok(())
}

/// Load, verify, and decode the tree at `path`.
///
/// - missing file → empty tree (first run)
/// - shorter than the envelope minimum → [`SfsError::TruncatedDatabase`]
/// - failed AEAD verification → [`SfsError::AuthenticationFailed`]
pub fn load(path: &Path, key: &DbKey) -> SfsResult<FileTree> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no database file, starting empty");
            return Ok(FileTree::new());
        }
        Err(e) => return Err(e.into()),
    };

    if raw.len() < NONCE_SIZE + 1 {
        return Err(SfsError::TruncatedDatabase);
    }
    let (nonce_bytes, ciphertext) = raw.split_at(NONCE_SIZE);
    let nonce = XNonce::from_slice(nonce_bytes);

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| SfsError::AuthenticationFailed)?;

    let tree = serde_json::from_slice(&plaintext)
        .map_err(|e| SfsError::Database(format!("deserialize: {e}")))?;
    debug!(path = %path.display(), "database loaded");
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfs_core::{Child, Node, NodeKind, ROOT};

    fn test_key(fill: u8) -> DbKey {
        DbKey::from_bytes([fill; 32])
    }

    fn sample_tree() -> FileTree {
        let mut tree = FileTree::new();
        tree.insert(
            ROOT.to_string(),
            Node {
                size: 0,
                mtime: 1700000000,
                kind: NodeKind::Folder {
                    children: vec![Child {
                        name: "x".into(),
                        is_file: true,
                    }],
                },
            },
        );
        tree.insert(
            "x".to_string(),
            Node {
                size: 0,
                mtime: 1700000001,
                kind: NodeKind::File { chunks: vec![] },
            },
        );
        tree
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        let key = test_key(1);
        let tree = sample_tree();

        save(&path, &key, &tree).unwrap();
        let loaded = load(&path, &key).unwrap();
        assert_eq!(loaded, tree);
    }

    #[test]
    fn missing_file_is_an_empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        let tree = load(&dir.path().join("nope"), &test_key(1)).unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn truncated_file_is_distinct_from_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        fs::write(&path, [0u8; NONCE_SIZE]).unwrap(); // nonce but no ciphertext

        assert!(matches!(
            load(&path, &test_key(1)),
            Err(SfsError::TruncatedDatabase)
        ));
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        save(&path, &test_key(1), &sample_tree()).unwrap();

        assert!(matches!(
            load(&path, &test_key(2)),
            Err(SfsError::AuthenticationFailed)
        ));
    }

    #[test]
    fn any_single_byte_flip_fails_authentication() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        let key = test_key(1);
        save(&path, &key, &sample_tree()).unwrap();

        let original = fs::read(&path).unwrap();
        // flip one byte in the nonce, the ciphertext body, and the tag
        for pos in [0, NONCE_SIZE + 2, original.len() - 1] {
            let mut tampered = original.clone();
            tampered[pos] ^= 0xFF;
            fs::write(&path, &tampered).unwrap();
            assert!(
                matches!(load(&path, &key), Err(SfsError::AuthenticationFailed)),
                "flip at {pos} must fail verification"
            );
        }
    }
}
