//! The chunk (reverse) view: encrypted chunks synthesized from plaintext.
//!
//! Presents the same data as the plaintext tree, but shaped like a chunk
//! store: 256 two-hex-char bucket folders, each holding 128-hex-char
//! chunk files. Every read encrypts the corresponding window of the
//! plaintext source file on the fly, so a sync tool pointed at this mount
//! uploads exactly what an at-rest chunk store would contain without the
//! plaintext ever touching it.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;

use sfs_chunks::CHUNK_SIZE;
use sfs_core::{ChunkKey, SfsError, SfsResult};
use sfs_crypto::{database, stream, KeyFile, ReverseIndex};

use crate::vfs::{Attr, DirEntry, EntryKind, VfsError};

/// Fixed mtime reported for every entry in the chunk view. Chunk names
/// already change whenever content changes, so a real timestamp would
/// only make sync tools re-examine files needlessly.
pub const REVERSE_MTIME: u64 = 1_490_656_554;

/// Size reported for the bucket folders.
const DIR_SIZE: u64 = 4096;

pub struct ChunkFs {
    index: ReverseIndex,
    root: PathBuf,
}

impl ChunkFs {
    /// Load the database and build the reverse index over `root`, the
    /// plaintext directory the database was scanned from.
    ///
    /// A quick sanity probe confirms `root` really is that directory: the
    /// first indexed path must exist under it. Mounting the view over the
    /// wrong directory would otherwise serve garbage chunks.
    pub fn new(db_path: &Path, keyfile: &KeyFile, root: &Path) -> SfsResult<Self> {
        let tree = database::load(db_path, &keyfile.db_key())?;
        let index = ReverseIndex::build(&tree, keyfile);

        if let Some((_, entry)) = index.iter().next() {
            if !root.join(&entry.path).is_file() {
                return Err(SfsError::Validation(format!(
                    "{} does not contain {}: wrong source directory for this database?",
                    root.display(),
                    entry.path
                )));
            }
        }

        debug!(chunks = index.len(), "chunk view ready");
        Ok(Self {
            index,
            root: root.to_path_buf(),
        })
    }

    /// Attributes for any name. Never fails: unknown names are reported
    /// as folders, so bucket folders need no bookkeeping and probes by
    /// sync tools always get an answer.
    pub fn getattr(&self, name: &str) -> Attr {
        match self.index.lookup(name) {
            Ok(entry) => Attr {
                size: entry.size,
                mtime: REVERSE_MTIME,
                kind: EntryKind::File,
            },
            Err(_) => Attr {
                size: DIR_SIZE,
                mtime: REVERSE_MTIME,
                kind: EntryKind::Dir,
            },
        }
    }

    /// List the root (all 256 buckets) or one bucket's chunk files.
    pub fn readdir(&self, name: &str) -> Result<Vec<DirEntry>, VfsError> {
        let name = name.trim_start_matches('/');
        if name.is_empty() || name == "." {
            return Ok((0u16..256)
                .map(|b| DirEntry {
                    name: format!("{b:02x}"),
                    kind: EntryKind::Dir,
                })
                .collect());
        }
        if name.len() == 2 && name.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Ok(self
                .index
                .names_with_prefix(name)
                .into_iter()
                .map(|hex| DirEntry {
                    name: hex,
                    kind: EntryKind::File,
                })
                .collect());
        }
        Err(VfsError::NotFound(name.to_string()))
    }

    /// Open a chunk file for reading. The source plaintext file must
    /// still exist; the index may be ahead of a deletion on disk.
    pub fn open(&self, name: &str) -> Result<ChunkFile, VfsError> {
        let entry = self
            .index
            .lookup(name)
            .map_err(|_| VfsError::NotFound(name.to_string()))?;
        let source = self.root.join(&entry.path);
        if !source.is_file() {
            return Err(VfsError::NotFound(name.to_string()));
        }
        Ok(ChunkFile {
            source,
            chunk_nr: entry.chunk_nr,
            key: entry.key.clone(),
            size: entry.size,
        })
    }
}

/// One openable chunk file, encrypted on the fly from its source window.
pub struct ChunkFile {
    source: PathBuf,
    chunk_nr: usize,
    key: ChunkKey,
    /// Stored length of this chunk; reads are clamped to it.
    size: u64,
}

impl ChunkFile {
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read up to `len` encrypted bytes at `chunk_off` within the chunk.
    ///
    /// Reads the matching plaintext window and encrypts it in place. The
    /// clamp to the recorded chunk size keeps the output stable even if
    /// the source file grew since the last scan.
    pub fn read(&self, chunk_off: u64, len: usize) -> Result<Vec<u8>, VfsError> {
        if chunk_off >= self.size {
            return Ok(Vec::new());
        }
        let take = (len as u64).min(self.size - chunk_off) as usize;

        let mut file = File::open(&self.source)?;
        file.seek(SeekFrom::Start(
            (self.chunk_nr as u64) * CHUNK_SIZE + chunk_off,
        ))?;

        let mut buf = vec![0u8; take];
        let mut filled = 0;
        while filled < take {
            let n = file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);

        stream::apply(&mut buf, chunk_off, &self.key);
        Ok(buf)
    }
}
