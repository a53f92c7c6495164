//! sfs-scan: build a metadata tree from a plaintext directory.
//!
//! The scanner rebuilds the tree wholesale on every run; entries that
//! vanished from disk simply don't reappear. Rehashing is the only
//! expensive part, so a file whose size and mtime match the previous
//! tree keeps its old chunk list without being read.

mod summary;

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

use tracing::{debug, warn};
use walkdir::WalkDir;

use sfs_chunks::hash_file_chunks;
use sfs_core::{Child, FileTree, Node, NodeKind, SfsError, SfsResult, ROOT};

pub use summary::diff_summary;

/// Result of one scan.
#[derive(Debug)]
pub struct ScanOutcome {
    pub tree: FileTree,
    /// True iff the tree differs from the previous one in any entry.
    pub changed: bool,
    /// Human-readable account of what changed.
    pub summary: String,
}

/// Walk `root` and produce an updated tree, diffed against `previous`.
///
/// Paths are stored relative to `root` with `/` separators; the root
/// itself is `"."`. Symlinks and non-regular files are skipped.
pub fn scan(root: &Path, previous: &FileTree) -> SfsResult<ScanOutcome> {
    let mut tree = FileTree::new();
    // folder path → (mtime, children gathered during the walk)
    let mut folders: HashMap<String, (u64, Vec<Child>)> = HashMap::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(walk_error)?;
        let rel = match relative_path(root, entry.path()) {
            Some(rel) => rel,
            None => {
                warn!(path = %entry.path().display(), "skipping non-UTF-8 path");
                continue;
            }
        };

        let file_type = entry.file_type();
        let is_file = if file_type.is_dir() {
            false
        } else if file_type.is_file() {
            true
        } else {
            debug!(path = %rel, "skipping non-regular file");
            continue;
        };

        let meta = entry.metadata().map_err(walk_error)?;
        let mtime = unix_mtime(&meta);

        if is_file {
            tree.insert(rel.clone(), scan_file(entry.path(), &rel, meta.len(), mtime, previous)?);
        } else {
            folders.insert(rel.clone(), (mtime, Vec::new()));
        }

        // register with the parent folder's child list
        if rel != ROOT {
            let (name, parent) = split_parent(&rel);
            if let Some((_, children)) = folders.get_mut(parent) {
                children.push(Child {
                    name: name.to_string(),
                    is_file,
                });
            }
        }
    }

    for (path, (mtime, children)) in folders {
        tree.insert(
            path,
            Node {
                size: 0,
                mtime,
                kind: NodeKind::Folder { children },
            },
        );
    }

    let changed = tree != *previous;
    let summary = diff_summary(previous, &tree);
    debug!(entries = tree.len(), changed, "scan finished");

    Ok(ScanOutcome {
        tree,
        changed,
        summary,
    })
}

/// Hash one regular file, or copy the previous chunk list when size and
/// mtime both still match.
fn scan_file(
    path: &Path,
    rel: &str,
    stat_size: u64,
    mtime: u64,
    previous: &FileTree,
) -> SfsResult<Node> {
    if let Some(prev) = previous.get(rel) {
        if let Some(chunks) = prev.chunks() {
            if prev.size == stat_size && prev.mtime == mtime {
                return Ok(Node {
                    size: stat_size,
                    mtime,
                    kind: NodeKind::File {
                        chunks: chunks.to_vec(),
                    },
                });
            }
        }
    }

    debug!(path = %rel, size = stat_size, "hashing file");
    let (chunks, hashed_size) = hash_file_chunks(path)?;
    // use the byte count actually hashed; a file racing the scan keeps the
    // chunk-count invariant this way
    Ok(Node {
        size: hashed_size,
        mtime,
        kind: NodeKind::File { chunks },
    })
}

/// Path of `path` relative to `root` with `/` separators; `"."` for the
/// root itself. `None` for non-UTF-8 names.
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    if rel.as_os_str().is_empty() {
        return Some(ROOT.to_string());
    }
    let mut out = String::new();
    for part in rel.iter() {
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(part.to_str()?);
    }
    Some(out)
}

/// `"a/b/c"` → (`"c"`, `"a/b"`); top-level names get parent `"."`.
fn split_parent(rel: &str) -> (&str, &str) {
    match rel.rsplit_once('/') {
        Some((parent, name)) => (name, parent),
        None => (rel, ROOT),
    }
}

fn unix_mtime(meta: &std::fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn walk_error(e: walkdir::Error) -> SfsError {
    match e.into_io_error() {
        Some(io_err) => SfsError::Io(io_err),
        None => SfsError::Io(io::Error::other("directory walk failed")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfs_chunks::hash_window;
    use std::fs;

    fn make_root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        fs::write(dir.path().join("zero.bin"), b"").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.txt"), b"world!").unwrap();
        dir
    }

    #[test]
    fn rescan_of_unchanged_tree_is_not_a_change() {
        let root = make_root();

        let first = scan(root.path(), &FileTree::new()).unwrap();
        assert!(first.changed);

        let second = scan(root.path(), &first.tree).unwrap();
        assert!(!second.changed, "identical rescan must report no change");
        assert_eq!(second.tree, first.tree);
        assert_eq!(second.summary, "no changes");
    }

    #[test]
    fn tree_shape_matches_disk() {
        let root = make_root();
        let outcome = scan(root.path(), &FileTree::new()).unwrap();
        let tree = &outcome.tree;

        // ".", "a.txt", "zero.bin", "sub", "sub/b.txt"
        assert_eq!(tree.len(), 5);

        let top = tree.get(ROOT).unwrap();
        let children = top.children().unwrap();
        let names: Vec<&str> = children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["a.txt", "sub", "zero.bin"]); // sorted walk order

        let a = tree.get("a.txt").unwrap();
        assert_eq!(a.size, 5);
        assert_eq!(a.chunks().unwrap(), &[hash_window(b"hello")]);

        let b = tree.get("sub/b.txt").unwrap();
        assert_eq!(b.size, 6);
        assert_eq!(b.chunks().unwrap(), &[hash_window(b"world!")]);
    }

    #[test]
    fn zero_byte_file_has_empty_chunk_list() {
        let root = make_root();
        let outcome = scan(root.path(), &FileTree::new()).unwrap();
        let zero = outcome.tree.get("zero.bin").unwrap();
        assert_eq!(zero.size, 0);
        assert!(zero.chunks().unwrap().is_empty());
    }

    #[test]
    fn added_and_removed_files_flip_the_change_flag() {
        let root = make_root();
        let base = scan(root.path(), &FileTree::new()).unwrap();

        fs::write(root.path().join("new.txt"), b"fresh").unwrap();
        let added = scan(root.path(), &base.tree).unwrap();
        assert!(added.changed);
        assert!(added.tree.contains("new.txt"));
        assert!(added.summary.contains("new.txt"));

        fs::remove_file(root.path().join("new.txt")).unwrap();
        let removed = scan(root.path(), &added.tree).unwrap();
        assert!(removed.changed);
        assert!(!removed.tree.contains("new.txt"));
    }

    #[test]
    fn stale_tracked_entry_is_dropped() {
        let root = make_root();
        let base = scan(root.path(), &FileTree::new()).unwrap();

        // an entry the disk does not have disappears on rescan
        let mut with_ghost = base.tree.clone();
        with_ghost.insert(
            "ghost.txt".to_string(),
            Node {
                size: 1,
                mtime: 1,
                kind: NodeKind::File {
                    chunks: vec![hash_window(b"x")],
                },
            },
        );

        let rescan = scan(root.path(), &with_ghost).unwrap();
        assert!(rescan.changed);
        assert!(!rescan.tree.contains("ghost.txt"));
    }

    #[test]
    fn matching_size_and_mtime_skips_rehash() {
        let root = make_root();
        let base = scan(root.path(), &FileTree::new()).unwrap();

        // plant a bogus chunk list under the real size/mtime: if the
        // scanner honors the skip contract it copies the bogus list
        // instead of rereading the file
        let real = base.tree.get("a.txt").unwrap().clone();
        let bogus = hash_window(b"not the real content");
        let mut prev = base.tree.clone();
        prev.insert(
            "a.txt".to_string(),
            Node {
                size: real.size,
                mtime: real.mtime,
                kind: NodeKind::File { chunks: vec![bogus] },
            },
        );

        let rescan = scan(root.path(), &prev).unwrap();
        assert_eq!(rescan.tree.get("a.txt").unwrap().chunks().unwrap(), &[bogus]);
    }
}
