//! The plaintext view: the metadata tree as a readable file hierarchy.
//!
//! Attribute and listing calls answer straight from the loaded tree
//! snapshot. Reads locate the encrypted chunk files in the chunk store
//! (`<chunk_dir>/<2-hex>/<128-hex>`), decrypt in place, and stitch across
//! chunk boundaries. Directory listings double as the trigger for a
//! rate-limited database reload, so a freshly scanned tree shows up
//! without remounting.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, warn};

use sfs_chunks::CHUNK_SIZE;
use sfs_core::{ChunkKey, FileTree, SfsError, SfsResult, ROOT};
use sfs_crypto::{database, stream, KeyFile};

use crate::handle_cache::HandleCache;
use crate::vfs::{Attr, DirEntry, EntryKind, VfsError};

/// How often a directory listing may trigger a database reload attempt.
pub const DEFAULT_RELOAD_INTERVAL: Duration = Duration::from_secs(300);

/// Bucket names probed to confirm a path is really a chunk store.
const PROBE_BUCKETS: [&str; 6] = ["00", "47", "83", "a0", "de", "ff"];

/// Outcome of one reload attempt (see [`PlainFs::maybe_reload`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadStatus {
    /// A newer database was loaded and swapped in.
    Reloaded,
    /// The rate-limit interval has not elapsed yet.
    Throttled,
    /// The database file is missing; state untouched.
    NoFile,
    /// The database file's mtime matches the loaded one.
    Unchanged,
    /// Loading failed (e.g. mid-write); the previous tree stays in effect.
    LoadFailed,
}

struct DbState {
    tree: Arc<FileTree>,
    last_attempt: Option<Instant>,
    /// mtime of the last *successfully* loaded database file.
    last_db_mtime: Option<SystemTime>,
}

pub struct PlainFs {
    keyfile: KeyFile,
    db_path: PathBuf,
    chunk_dir: PathBuf,
    reload_interval: Duration,
    state: Mutex<DbState>,
}

impl PlainFs {
    /// Load the database and verify the chunk store layout. Both failures
    /// are fatal: without a tree or a chunk store there is nothing to
    /// serve.
    pub fn new(
        db_path: &Path,
        keyfile: KeyFile,
        chunk_dir: &Path,
        reload_interval: Duration,
    ) -> SfsResult<Self> {
        for bucket in PROBE_BUCKETS {
            if !chunk_dir.join(bucket).is_dir() {
                return Err(SfsError::Validation(format!(
                    "{} is not a chunk store: missing bucket folder {bucket}",
                    chunk_dir.display()
                )));
            }
        }

        let tree = database::load(db_path, &keyfile.db_key())?;
        let mtime = fs::metadata(db_path).ok().and_then(|m| m.modified().ok());
        debug!(entries = tree.len(), "plaintext view ready");

        Ok(Self {
            keyfile,
            db_path: db_path.to_path_buf(),
            chunk_dir: chunk_dir.to_path_buf(),
            reload_interval,
            state: Mutex::new(DbState {
                tree: Arc::new(tree),
                last_attempt: None,
                last_db_mtime: mtime,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, DbState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current tree snapshot. Immutable once published; a reload swaps
    /// the whole `Arc` rather than mutating in place.
    pub fn tree(&self) -> Arc<FileTree> {
        self.lock().tree.clone()
    }

    pub fn getattr(&self, name: &str) -> Result<Attr, VfsError> {
        let name = normalize(name);
        let tree = self.tree();
        let node = tree
            .get(name)
            .ok_or_else(|| VfsError::NotFound(name.to_string()))?;
        Ok(Attr {
            size: node.size,
            mtime: node.mtime,
            kind: if node.is_file() {
                EntryKind::File
            } else {
                EntryKind::Dir
            },
        })
    }

    /// List a folder. Also the reload trigger: cheap, frequent, and safe
    /// to rate-limit (a dedicated timer thread would buy nothing here).
    pub fn readdir(&self, name: &str) -> Result<Vec<DirEntry>, VfsError> {
        self.maybe_reload();

        let name = normalize(name);
        let tree = self.tree();
        let node = tree
            .get(name)
            .ok_or_else(|| VfsError::NotFound(name.to_string()))?;
        let children = node
            .children()
            .ok_or_else(|| VfsError::NotADirectory(name.to_string()))?;

        Ok(children
            .iter()
            .map(|c| DirEntry {
                name: c.name.clone(),
                kind: if c.is_file {
                    EntryKind::File
                } else {
                    EntryKind::Dir
                },
            })
            .collect())
    }

    /// Open a file and precompute, per chunk, its derived key and storage
    /// name — the read path must never re-derive them per call.
    pub fn open(&self, name: &str) -> Result<PlainFile, VfsError> {
        let name = normalize(name);
        let tree = self.tree();
        let node = tree
            .get(name)
            .ok_or_else(|| VfsError::NotFound(name.to_string()))?;
        let chunks = node
            .chunks()
            .ok_or_else(|| VfsError::NotFound(name.to_string()))?;

        let refs = chunks
            .iter()
            .map(|hash| ChunkRef {
                key: self.keyfile.chunk_key(hash),
                name: self.keyfile.chunk_storage_address(hash).to_hex(),
            })
            .collect();

        Ok(PlainFile {
            size: node.size,
            chunk_dir: self.chunk_dir.clone(),
            chunks: refs,
            cache: HandleCache::new(),
        })
    }

    /// Rate-limited reload attempt. At most one attempt per interval,
    /// successful or not; the lock also keeps concurrent listing calls
    /// from racing a second redundant reload.
    pub fn maybe_reload(&self) -> ReloadStatus {
        let mut state = self.lock();

        if let Some(at) = state.last_attempt {
            if at.elapsed() < self.reload_interval {
                return ReloadStatus::Throttled;
            }
        }
        state.last_attempt = Some(Instant::now());

        let mtime = match fs::metadata(&self.db_path).and_then(|m| m.modified()) {
            Ok(mtime) => mtime,
            Err(_) => {
                debug!(path = %self.db_path.display(), "database file missing, keeping tree");
                return ReloadStatus::NoFile;
            }
        };
        if Some(mtime) == state.last_db_mtime {
            return ReloadStatus::Unchanged;
        }

        let tree = match database::load(&self.db_path, &self.keyfile.db_key()) {
            Ok(tree) => tree,
            Err(e) => {
                // likely a scanner mid-write; the next interval retries
                warn!(error = %e, "database reload failed, keeping previous tree");
                return ReloadStatus::LoadFailed;
            }
        };

        state.tree = Arc::new(tree);
        // only now may the mtime be recorded; recording it before the swap
        // would make a transient bad write skip the next reload entirely
        state.last_db_mtime = Some(mtime);
        debug!("database reloaded");
        ReloadStatus::Reloaded
    }
}

/// Per-chunk material precomputed at open time.
struct ChunkRef {
    key: ChunkKey,
    /// 128-char hex storage address; also the chunk's file name.
    name: String,
}

/// An open plaintext file, backed by encrypted chunk files.
pub struct PlainFile {
    size: u64,
    chunk_dir: PathBuf,
    chunks: Vec<ChunkRef>,
    cache: HandleCache,
}

impl PlainFile {
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read up to `len` plaintext bytes at `offset`.
    ///
    /// Walks chunk by chunk, decrypting each piece in place at its offset
    /// within the chunk; a request is stitched across as many chunk
    /// boundaries as it crosses. Returns fewer bytes only at end of file
    /// or when the underlying chunk file comes up short.
    pub fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>, VfsError> {
        if self.size < 1 {
            return Ok(Vec::new());
        }

        let mut out = Vec::with_capacity(len);
        let mut pos = offset;
        let mut remaining = len;

        while remaining > 0 {
            let chunk_nr = (pos / CHUNK_SIZE) as usize;
            let chunk_off = pos % CHUNK_SIZE;

            // callers may probe slightly past the last byte; that is EOF,
            // not an error
            if chunk_nr >= self.chunks.len() {
                break;
            }
            let chunk = &self.chunks[chunk_nr];
            let path = self.chunk_dir.join(&chunk.name[..2]).join(&chunk.name);

            let take = remaining.min((CHUNK_SIZE - chunk_off) as usize);
            let start = out.len();
            out.resize(start + take, 0);

            let n = match self.cache.read_at(&path, chunk_nr, chunk_off, &mut out[start..]) {
                Ok(n) => n,
                Err(e) => {
                    warn!(chunk = %chunk.name, chunk_nr, error = %e, "chunk read failed");
                    return Err(e.into());
                }
            };
            out.truncate(start + n);
            stream::apply(&mut out[start..], chunk_off, &chunk.key);

            if n < take {
                break; // chunk file ended early; nothing more to stitch
            }
            pos += n as u64;
            remaining -= n;
        }

        Ok(out)
    }

    /// Close all cached chunk handles (logical file released).
    pub fn release(&self) {
        self.cache.release_all();
    }
}

/// The transport hands the root over as an empty name.
fn normalize(name: &str) -> &str {
    let name = name.trim_start_matches('/');
    if name.is_empty() {
        ROOT
    } else {
        name
    }
}
