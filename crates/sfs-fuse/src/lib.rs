//! sfs-fuse: the two filesystem personalities of shardfs
//!
//! - [`plain::PlainFs`] exposes the metadata tree as plaintext files and
//!   folders, decrypting chunk files from a chunk store on read.
//! - [`chunkview::ChunkFs`] exposes the same data the other way around: a
//!   flat 256-bucket directory of encrypted chunk files, produced on the
//!   fly from the plaintext source tree, so a sync tool can move chunks
//!   without ever seeing plaintext.
//!
//! Both views are transport-independent: `getattr`/`readdir`/`open`/`read`
//! return plain values, and the optional [`mount`] module (feature
//! `fuse`) adapts them to a fuse3 mount.

pub mod chunkview;
pub mod handle_cache;
pub mod plain;
pub mod vfs;

#[cfg(feature = "fuse")]
pub mod mount;

pub use chunkview::{ChunkFile, ChunkFs, REVERSE_MTIME};
pub use plain::{PlainFile, PlainFs, ReloadStatus, DEFAULT_RELOAD_INTERVAL};
pub use vfs::{Attr, DirEntry, EntryKind, VfsError};

#[cfg(feature = "fuse")]
pub use mount::{mount_chunks, mount_plain};
