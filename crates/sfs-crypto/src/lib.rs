//! sfs-crypto: key material and the two encryption layers of shardfs
//!
//! Key hierarchy (all derivations HKDF-SHA512 over the key-file secret,
//! domain-separated by info string):
//! ```text
//! key-file secret (128 random bytes, on disk)
//!   ├── db key (32 bytes)                      — XChaCha20-Poly1305 database envelope
//!   ├── chunk key(content hash) (32 bytes)     — ChaCha20 keystream for that chunk
//!   └── storage address(content hash) (64 bytes) — on-disk chunk file name
//! ```
//!
//! The per-chunk derivations are deterministic in the content hash, so
//! identical plaintext chunks share one stored object (dedup) and the
//! reverse index can be rebuilt bit-identically by any holder of the key
//! file.

pub mod database;
pub mod keyfile;
pub mod reverse;
pub mod stream;

pub use keyfile::{KeyFile, SECRET_LEN};
pub use reverse::{ReverseEntry, ReverseIndex};

/// XChaCha20-Poly1305 nonce length for the database envelope.
pub const NONCE_SIZE: usize = 24;

/// Poly1305 tag length.
pub const TAG_SIZE: usize = 16;
