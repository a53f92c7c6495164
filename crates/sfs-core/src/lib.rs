//! sfs-core: shared types for shardfs
//!
//! The metadata tree (`FileTree`) describes a plaintext directory tree as
//! scanned from disk: one node per file or folder, keyed by its path
//! relative to the scan root (the root itself is the literal `"."`).
//! File nodes carry the ordered list of SHA-512 content hashes of their
//! fixed-capacity chunks; everything else in the system (chunk storage
//! names, per-chunk keys, the reverse index) is derived from those hashes.

pub mod error;
pub mod types;

pub use error::{SfsError, SfsResult};
pub use types::{Child, ChunkHash, ChunkKey, DbKey, FileTree, Node, NodeKind, StorageAddress, ROOT};
