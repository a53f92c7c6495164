//! sfs-chunks: chunk layout arithmetic and SHA-512 content hashing
//!
//! A plaintext file is a sequence of fixed-capacity chunks: every chunk is
//! exactly [`CHUNK_SIZE`] bytes except possibly the last. The layout
//! functions here are the single source of truth for how many chunks a
//! file has and how large each one is; the scanner, the reverse index, and
//! both filesystem views all call them instead of recomputing.

pub mod hash;
pub mod layout;

pub use hash::{hash_file_chunks, hash_window};
pub use layout::{chunk_count, chunk_size};

/// Plaintext chunk capacity C in bytes (8 MiB).
pub const CHUNK_SIZE: u64 = 8 * 1024 * 1024;

/// Largest single read the mount transport will hand to a view.
pub const BUFFER_SIZE: usize = 128 * 1024;

// The plaintext read path stitches across chunk boundaries in a loop, but
// the handle-cache reuse heuristic is tuned for reads narrower than one
// chunk.
const _: () = assert!(BUFFER_SIZE as u64 <= CHUNK_SIZE);
