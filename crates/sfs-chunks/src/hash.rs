//! SHA-512 content hashing of chunk windows.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha512};

use sfs_core::{ChunkHash, SfsResult};

use crate::CHUNK_SIZE;

/// Hash one plaintext window (at most [`CHUNK_SIZE`] bytes).
pub fn hash_window(data: &[u8]) -> ChunkHash {
    let digest = Sha512::digest(data);
    // SHA-512 output is always 64 bytes
    ChunkHash::from_slice(digest.as_slice())
        .unwrap_or_else(|_| unreachable!("sha512 digest is 64 bytes"))
}

/// Read a file in [`CHUNK_SIZE`]-aligned windows and hash each one.
///
/// Returns the ordered chunk hash list and the total byte count read.
/// A zero-byte file yields an empty list.
pub fn hash_file_chunks(path: &Path) -> SfsResult<(Vec<ChunkHash>, u64)> {
    let mut file = File::open(path)?;
    let mut chunks = Vec::new();
    let mut total: u64 = 0;
    let mut window = vec![0u8; CHUNK_SIZE as usize];

    loop {
        // fill one window; a short read does not mean EOF
        let mut filled = 0;
        while filled < window.len() {
            let n = file.read(&mut window[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            break;
        }

        chunks.push(hash_window(&window[..filled]));
        total += filled as u64;

        if filled < window.len() {
            break; // trailing partial chunk
        }
    }

    Ok((chunks, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn window_hash_matches_known_vector() {
        // sha512("") — the canonical empty-input digest
        let h = hash_window(b"");
        assert_eq!(
            h.to_hex(),
            "cf83e1357eefb8bdf1542850d66d8007d620e4050b5715dc83f4a921d36ce9ce\
             47d0d13c5d85f2b0ff8318d2877eec2f63b931bd47417a81a538327af927da3e"
        );
    }

    #[test]
    fn empty_file_has_no_chunk_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        File::create(&path).unwrap();

        let (chunks, total) = hash_file_chunks(&path).unwrap();
        assert!(chunks.is_empty());
        assert_eq!(total, 0);
    }

    #[test]
    fn small_file_is_one_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small");
        File::create(&path)
            .unwrap()
            .write_all(b"hello shardfs")
            .unwrap();

        let (chunks, total) = hash_file_chunks(&path).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(total, 13);
        assert_eq!(chunks[0], hash_window(b"hello shardfs"));
    }
}
