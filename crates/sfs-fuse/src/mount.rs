//! fuse3 transport: adapts the two views to kernel filesystem calls.
//!
//! Both views answer the same four questions (attributes, listing, open,
//! read), so a single [`PathFilesystem`] adapter serves either one through
//! the [`View`] trait. Everything is read-only; any mutating call the
//! kernel sends is answered by fuse3's default `ENOSYS`.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use fuse3::path::prelude::*;
use fuse3::{Errno, FileType, MountOptions};
use futures_util::stream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use sfs_chunks::BUFFER_SIZE;

use crate::chunkview::{ChunkFile, ChunkFs};
use crate::plain::{PlainFile, PlainFs};
use crate::vfs::{Attr, DirEntry, EntryKind, VfsError};

/// TTL for dentry/attr cache entries (FUSE kernel cache)
const ATTR_TTL: Duration = Duration::from_secs(5);

const PERM_FILE: u16 = 0o444; // r--r--r--
const PERM_DIR: u16 = 0o555; // r-xr-xr-x

// ── View abstraction ──────────────────────────────────────────────────────

/// The call surface a mounted view must provide.
pub trait View: Send + Sync + 'static {
    type Handle: Send + Sync + 'static;

    fn attr(&self, path: &str) -> Result<Attr, VfsError>;
    fn entries(&self, path: &str) -> Result<Vec<DirEntry>, VfsError>;
    fn open(&self, path: &str) -> Result<Self::Handle, VfsError>;
    fn read(&self, handle: &Self::Handle, offset: u64, len: usize) -> Result<Vec<u8>, VfsError>;
    fn release(&self, handle: &Self::Handle) {
        let _ = handle;
    }
}

impl View for PlainFs {
    type Handle = PlainFile;

    fn attr(&self, path: &str) -> Result<Attr, VfsError> {
        self.getattr(path)
    }

    fn entries(&self, path: &str) -> Result<Vec<DirEntry>, VfsError> {
        self.readdir(path)
    }

    fn open(&self, path: &str) -> Result<Self::Handle, VfsError> {
        PlainFs::open(self, path)
    }

    fn read(&self, handle: &Self::Handle, offset: u64, len: usize) -> Result<Vec<u8>, VfsError> {
        handle.read(offset, len)
    }

    fn release(&self, handle: &Self::Handle) {
        handle.release();
    }
}

impl View for ChunkFs {
    type Handle = ChunkFile;

    fn attr(&self, path: &str) -> Result<Attr, VfsError> {
        Ok(self.getattr(path))
    }

    fn entries(&self, path: &str) -> Result<Vec<DirEntry>, VfsError> {
        self.readdir(path)
    }

    fn open(&self, path: &str) -> Result<Self::Handle, VfsError> {
        ChunkFs::open(self, path)
    }

    fn read(&self, handle: &Self::Handle, offset: u64, len: usize) -> Result<Vec<u8>, VfsError> {
        handle.read(offset, len)
    }
}

// ── SfsMount ──────────────────────────────────────────────────────────────

/// The FUSE driver: one view plus a file-handle table.
pub struct SfsMount<V: View> {
    view: V,
    uid: u32,
    gid: u32,
    /// Open file handles: fh → view handle
    handles: Mutex<HashMap<u64, Arc<V::Handle>>>,
    /// Monotonically increasing file-handle counter
    next_fh: AtomicU64,
}

impl<V: View> SfsMount<V> {
    pub fn new(view: V) -> Self {
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        SfsMount {
            view,
            uid,
            gid,
            handles: Mutex::new(HashMap::new()),
            next_fh: AtomicU64::new(1),
        }
    }

    fn file_attr(&self, attr: &Attr) -> FileAttr {
        let mtime = UNIX_EPOCH + Duration::from_secs(attr.mtime);
        let is_dir = attr.kind == EntryKind::Dir;
        FileAttr {
            size: attr.size,
            blocks: attr.size.div_ceil(512),
            atime: mtime,
            mtime,
            ctime: mtime,
            #[cfg(target_os = "macos")]
            crtime: mtime,
            kind: if is_dir {
                FileType::Directory
            } else {
                FileType::RegularFile
            },
            perm: if is_dir { PERM_DIR } else { PERM_FILE },
            nlink: if is_dir { 2 } else { 1 },
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: 4096,
            #[cfg(target_os = "macos")]
            flags: 0,
        }
    }
}

fn errno(e: VfsError) -> Errno {
    match e {
        VfsError::NotFound(_) => Errno::from(libc::ENOENT),
        VfsError::NotADirectory(_) => Errno::from(libc::ENOTDIR),
        VfsError::Io(_) => Errno::from(libc::EIO),
    }
}

fn path_str(path: &OsStr) -> fuse3::Result<&str> {
    path.to_str().ok_or_else(|| Errno::from(libc::ENOENT))
}

impl<V: View> PathFilesystem for SfsMount<V> {
    async fn init(&self, _req: Request) -> fuse3::Result<ReplyInit> {
        debug!("shardfs mount init");
        Ok(ReplyInit {
            max_write: NonZeroU32::new(BUFFER_SIZE as u32).unwrap(),
        })
    }

    async fn destroy(&self, _req: Request) {
        info!("shardfs unmounted");
    }

    async fn getattr(
        &self,
        _req: Request,
        path: Option<&OsStr>,
        _fh: Option<u64>,
        _flags: u32,
    ) -> fuse3::Result<ReplyAttr> {
        let path = path_str(path.ok_or_else(|| Errno::from(libc::ENOENT))?)?;
        let attr = self.view.attr(path).map_err(errno)?;
        Ok(ReplyAttr {
            ttl: ATTR_TTL,
            attr: self.file_attr(&attr),
        })
    }

    async fn lookup(&self, _req: Request, parent: &OsStr, name: &OsStr) -> fuse3::Result<ReplyEntry> {
        let parent = path_str(parent)?;
        let name = path_str(name)?;
        let full = format!("{}/{}", parent.trim_end_matches('/'), name);

        let attr = self.view.attr(&full).map_err(errno)?;
        Ok(ReplyEntry {
            ttl: ATTR_TTL,
            attr: self.file_attr(&attr),
        })
    }

    type DirEntryStream<'a>
        = stream::Iter<std::vec::IntoIter<fuse3::Result<DirectoryEntry>>>
    where
        Self: 'a;

    type DirEntryPlusStream<'a>
        = stream::Iter<std::vec::IntoIter<fuse3::Result<DirectoryEntryPlus>>>
    where
        Self: 'a;

    async fn readdir<'a>(
        &'a self,
        _req: Request,
        path: &'a OsStr,
        _fh: u64,
        offset: i64,
    ) -> fuse3::Result<ReplyDirectory<Self::DirEntryStream<'a>>> {
        let path = path_str(path)?;
        let children = self.view.entries(path).map_err(errno)?;

        let mut entries: Vec<fuse3::Result<DirectoryEntry>> = Vec::new();
        if offset == 0 {
            entries.push(Ok(DirectoryEntry {
                kind: FileType::Directory,
                name: ".".into(),
                offset: 1,
            }));
        }
        if offset <= 1 {
            entries.push(Ok(DirectoryEntry {
                kind: FileType::Directory,
                name: "..".into(),
                offset: 2,
            }));
        }

        let mut next_offset = 3i64;
        for child in children {
            if next_offset > offset {
                entries.push(Ok(DirectoryEntry {
                    kind: if child.kind == EntryKind::Dir {
                        FileType::Directory
                    } else {
                        FileType::RegularFile
                    },
                    name: child.name.into(),
                    offset: next_offset,
                }));
            }
            next_offset += 1;
        }

        Ok(ReplyDirectory {
            entries: stream::iter(entries),
        })
    }

    async fn readdirplus<'a>(
        &'a self,
        _req: Request,
        path: &'a OsStr,
        _fh: u64,
        offset: u64,
        _lock_owner: u64,
    ) -> fuse3::Result<ReplyDirectoryPlus<Self::DirEntryPlusStream<'a>>> {
        let dir = path_str(path)?;
        let children = self.view.entries(dir).map_err(errno)?;
        let dir_attr = self.view.attr(dir).map_err(errno)?;
        let dir_attr = self.file_attr(&dir_attr);
        let offset = offset as i64;

        let mut entries: Vec<fuse3::Result<DirectoryEntryPlus>> = Vec::new();
        if offset == 0 {
            entries.push(Ok(DirectoryEntryPlus {
                kind: FileType::Directory,
                name: ".".into(),
                offset: 1,
                attr: dir_attr,
                entry_ttl: ATTR_TTL,
                attr_ttl: ATTR_TTL,
            }));
        }
        if offset <= 1 {
            entries.push(Ok(DirectoryEntryPlus {
                kind: FileType::Directory,
                name: "..".into(),
                offset: 2,
                attr: dir_attr,
                entry_ttl: ATTR_TTL,
                attr_ttl: ATTR_TTL,
            }));
        }

        let mut next_offset = 3i64;
        for child in children {
            if next_offset > offset {
                let full = format!("{}/{}", dir.trim_end_matches('/'), child.name);
                let attr = self.view.attr(&full).map_err(errno)?;
                entries.push(Ok(DirectoryEntryPlus {
                    kind: if child.kind == EntryKind::Dir {
                        FileType::Directory
                    } else {
                        FileType::RegularFile
                    },
                    name: child.name.into(),
                    offset: next_offset,
                    attr: self.file_attr(&attr),
                    entry_ttl: ATTR_TTL,
                    attr_ttl: ATTR_TTL,
                }));
            }
            next_offset += 1;
        }

        Ok(ReplyDirectoryPlus {
            entries: stream::iter(entries),
        })
    }

    async fn opendir(&self, _req: Request, _path: &OsStr, _flags: u32) -> fuse3::Result<ReplyOpen> {
        Ok(ReplyOpen { fh: 0, flags: 0 })
    }

    async fn open(&self, _req: Request, path: &OsStr, _flags: u32) -> fuse3::Result<ReplyOpen> {
        let path = path_str(path)?;
        let handle = self.view.open(path).map_err(|e| {
            debug!(path, "open failed: {e}");
            errno(e)
        })?;

        let fh = self.next_fh.fetch_add(1, Ordering::Relaxed);
        self.handles.lock().await.insert(fh, Arc::new(handle));
        Ok(ReplyOpen { fh, flags: 0 })
    }

    async fn read(
        &self,
        _req: Request,
        _path: Option<&OsStr>,
        fh: u64,
        offset: u64,
        size: u32,
    ) -> fuse3::Result<ReplyData> {
        let handle = {
            let handles = self.handles.lock().await;
            handles
                .get(&fh)
                .cloned()
                .ok_or_else(|| Errno::from(libc::EBADF))?
        };

        let data = self.view.read(&handle, offset, size as usize).map_err(|e| {
            warn!(fh, offset, "read failed: {e}");
            errno(e)
        })?;
        Ok(ReplyData {
            data: Bytes::from(data),
        })
    }

    async fn release(
        &self,
        _req: Request,
        _path: Option<&OsStr>,
        fh: u64,
        _flags: u32,
        _lock_owner: u64,
        _flush: bool,
    ) -> fuse3::Result<()> {
        if let Some(handle) = self.handles.lock().await.remove(&fh) {
            self.view.release(&handle);
        }
        Ok(())
    }

    async fn flush(
        &self,
        _req: Request,
        _path: Option<&OsStr>,
        _fh: u64,
        _lock_owner: u64,
    ) -> fuse3::Result<()> {
        Ok(())
    }

    async fn statfs(&self, _req: Request, _path: &OsStr) -> fuse3::Result<ReplyStatFs> {
        Ok(ReplyStatFs {
            blocks: 1 << 30, // fake 4T
            bfree: 1 << 29,
            bavail: 1 << 29,
            files: 1 << 20,
            ffree: 1 << 19,
            bsize: 4096,
            namelen: 255,
            frsize: 4096,
        })
    }
}

// ── Public mount API ──────────────────────────────────────────────────────

/// Mount a view and block until unmounted (e.g. via `fusermount3 -u`).
async fn mount_view<V: View>(
    view: V,
    mountpoint: &Path,
    allow_other: bool,
) -> std::io::Result<()> {
    let mut opts = MountOptions::default();
    opts.fs_name("shardfs");
    opts.read_only(true);
    opts.force_readdir_plus(true);
    if allow_other {
        opts.allow_other(true);
    }

    info!(mountpoint = %mountpoint.display(), "mounting shardfs (unprivileged via fusermount3)");

    let handle = Session::new(opts)
        .mount_with_unprivileged(SfsMount::new(view), mountpoint)
        .await?;

    handle.await
}

/// Mount the plaintext view. Call from an async context; returns when the
/// filesystem is unmounted.
pub async fn mount_plain(fs: PlainFs, mountpoint: &Path, allow_other: bool) -> std::io::Result<()> {
    mount_view(fs, mountpoint, allow_other).await
}

/// Mount the chunk (reverse) view.
pub async fn mount_chunks(fs: ChunkFs, mountpoint: &Path, allow_other: bool) -> std::io::Result<()> {
    mount_view(fs, mountpoint, allow_other).await
}
