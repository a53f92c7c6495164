//! Seekable per-chunk keystream transform.
//!
//! A chunk is stored as `plaintext XOR keystream(chunk key)`. The views
//! read arbitrary byte ranges, so the keystream must be positionable at
//! any global offset in O(1); ChaCha20 derives its block counter
//! algebraically from the offset, which is exactly that. The same call
//! encrypts and decrypts.
//!
//! The nonce is fixed at zero: every chunk key is itself derived from the
//! chunk's content hash, so no two distinct plaintexts ever share a
//! (key, nonce) pair — and identical chunks *must* produce identical
//! ciphertext for deduplication to work.

use chacha20::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use chacha20::ChaCha20;

use sfs_core::ChunkKey;

/// Transform `buf` in place with the keystream for `key`, positioned
/// `global_offset` bytes into the stream. Self-inverse.
pub fn apply(buf: &mut [u8], global_offset: u64, key: &ChunkKey) {
    let nonce = [0u8; 12];
    let mut cipher = ChaCha20::new(key.as_bytes().into(), &nonce.into());
    cipher.seek(global_offset);
    cipher.apply_keystream(buf);
}
