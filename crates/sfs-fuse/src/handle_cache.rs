//! Bounded cache of open chunk-file handles.
//!
//! Opening and seeking a chunk file for every 128 KiB read is the
//! dominant cost of the plaintext read path; sequential readers hit the
//! same chunk at a predictable offset, so a handle whose position already
//! matches can be reused without an open or a seek. Eviction is a fixed
//! round-robin rotation over the slots — deliberately not LRU, matching
//! the established on-disk access pattern this cache was tuned against.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

/// Number of cached handles per open logical file.
pub const CACHE_SLOTS: usize = 12;

struct Slot {
    file: File,
    /// Chunk index this handle currently points into.
    chunk_nr: usize,
    /// Offset within that chunk the next read will start at.
    next_offset: u64,
}

struct Inner {
    slots: Vec<Option<Slot>>,
    next_evict: usize,
}

pub struct HandleCache {
    inner: Mutex<Inner>,
}

impl Default for HandleCache {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: (0..CACHE_SLOTS).map(|_| None).collect(),
                next_evict: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Read from the chunk file at `path` into `buf`, positioned
    /// `chunk_off` bytes into chunk `chunk_nr`.
    ///
    /// A cached handle is reused only when both the chunk index and the
    /// expected next offset match; otherwise the next slot in rotation is
    /// evicted and a fresh handle opened and seeked. A failed read
    /// invalidates only the slot it used, so the following read reopens
    /// cleanly.
    pub fn read_at(
        &self,
        path: &Path,
        chunk_nr: usize,
        chunk_off: u64,
        buf: &mut [u8],
    ) -> std::io::Result<usize> {
        let mut inner = self.lock();

        // perfect-match reuse: no open, no seek
        for i in 0..CACHE_SLOTS {
            let matched = matches!(
                &inner.slots[i],
                Some(s) if s.chunk_nr == chunk_nr && s.next_offset == chunk_off
            );
            if !matched {
                continue;
            }
            let result = match inner.slots[i].as_mut() {
                Some(slot) => {
                    let r = slot.file.read(buf);
                    if let Ok(n) = &r {
                        slot.next_offset = chunk_off + *n as u64;
                    }
                    r
                }
                None => continue,
            };
            if result.is_err() {
                debug!(slot = i, chunk_nr, "read via cached handle failed, dropping slot");
                inner.slots[i] = None;
            }
            return result;
        }

        // miss: evict the next slot in rotation and open fresh
        let idx = inner.next_evict;
        inner.next_evict = (idx + 1) % CACHE_SLOTS;
        inner.slots[idx] = None;

        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(chunk_off))?;
        let n = file.read(buf)?;
        inner.slots[idx] = Some(Slot {
            file,
            chunk_nr,
            next_offset: chunk_off + n as u64,
        });
        Ok(n)
    }

    /// Close every cached handle (logical file released).
    pub fn release_all(&self) {
        let mut inner = self.lock();
        for slot in inner.slots.iter_mut() {
            *slot = None;
        }
    }
}
