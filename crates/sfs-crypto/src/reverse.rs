//! Reverse index: storage address → plaintext location.
//!
//! The metadata tree answers "what chunks make up this file"; an external
//! sync tool asks the opposite question. The index is rebuilt in full from
//! a tree snapshot whenever a view loads one — never patched in place —
//! and is deterministic, so an independent rebuild from the same tree and
//! key file yields byte-identical addresses and keys.

use std::collections::HashMap;

use tracing::debug;

use sfs_chunks::chunk_size;
use sfs_core::{ChunkKey, FileTree, SfsError, SfsResult, StorageAddress};

use crate::KeyFile;

/// Where one stored chunk lands in the plaintext tree.
#[derive(Debug, Clone)]
pub struct ReverseEntry {
    /// Tree path of the plaintext file.
    pub path: String,
    /// Which chunk of that file this address holds.
    pub chunk_nr: usize,
    /// Derived key encrypting exactly this chunk.
    pub key: ChunkKey,
    /// Stored byte length, `chunk_size(chunk_nr, file size)`.
    pub size: u64,
}

#[derive(Debug, Default)]
pub struct ReverseIndex {
    entries: HashMap<StorageAddress, ReverseEntry>,
}

impl ReverseIndex {
    /// Build the full index for a tree snapshot.
    ///
    /// Empty files and zero-size trailing chunk indexes have no stored
    /// object and are skipped.
    pub fn build(tree: &FileTree, keyfile: &KeyFile) -> Self {
        let mut entries = HashMap::new();

        for (path, node) in tree.iter() {
            let chunks = match node.chunks() {
                Some(chunks) if node.size >= 1 => chunks,
                _ => continue,
            };
            for (chunk_nr, hash) in chunks.iter().enumerate() {
                let size = chunk_size(chunk_nr, node.size);
                if size < 1 {
                    continue;
                }
                entries.insert(
                    keyfile.chunk_storage_address(hash),
                    ReverseEntry {
                        path: path.clone(),
                        chunk_nr,
                        key: keyfile.chunk_key(hash),
                        size,
                    },
                );
            }
        }

        debug!(chunks = entries.len(), "reverse index built");
        Self { entries }
    }

    /// Resolve a chunk file name (the basename is 128 hex chars) to its
    /// plaintext location. Malformed names and unknown addresses are both
    /// an ordinary not-found outcome.
    pub fn lookup(&self, name: &str) -> SfsResult<&ReverseEntry> {
        let base = name.rsplit('/').next().unwrap_or(name);
        let address = StorageAddress::from_hex(base)
            .map_err(|_| SfsError::NotFound(name.to_string()))?;
        self.entries
            .get(&address)
            .ok_or_else(|| SfsError::NotFound(name.to_string()))
    }

    /// Hex names of all addresses in one two-hex-char bucket.
    pub fn names_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries
            .keys()
            .map(|addr| addr.to_hex())
            .filter(|hex| hex.starts_with(prefix))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StorageAddress, &ReverseEntry)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfs_chunks::CHUNK_SIZE;
    use sfs_core::{Child, ChunkHash, Node, NodeKind, ROOT};

    fn test_keyfile() -> KeyFile {
        KeyFile::from_bytes([42u8; crate::keyfile::SECRET_LEN])
    }

    fn hash(fill: u8) -> ChunkHash {
        ChunkHash::from_bytes([fill; 64])
    }

    /// Root folder, a two-chunk file, an empty file, and a subfolder.
    fn sample_tree() -> FileTree {
        let mut tree = FileTree::new();
        tree.insert(
            ROOT.to_string(),
            Node {
                size: 0,
                mtime: 1,
                kind: NodeKind::Folder {
                    children: vec![
                        Child { name: "big".into(), is_file: true },
                        Child { name: "empty".into(), is_file: true },
                        Child { name: "sub".into(), is_file: false },
                    ],
                },
            },
        );
        tree.insert(
            "big".to_string(),
            Node {
                size: CHUNK_SIZE + 5,
                mtime: 2,
                kind: NodeKind::File { chunks: vec![hash(1), hash(2)] },
            },
        );
        tree.insert(
            "empty".to_string(),
            Node {
                size: 0,
                mtime: 3,
                kind: NodeKind::File { chunks: vec![] },
            },
        );
        tree.insert(
            "sub".to_string(),
            Node {
                size: 0,
                mtime: 4,
                kind: NodeKind::Folder { children: vec![] },
            },
        );
        tree
    }

    #[test]
    fn indexes_exactly_the_stored_chunks() {
        let index = ReverseIndex::build(&sample_tree(), &test_keyfile());
        // two chunks of "big"; nothing for the empty file or folders
        assert_eq!(index.len(), 2);

        let k = test_keyfile();
        let entry = index.lookup(&k.chunk_storage_address(&hash(2)).to_hex()).unwrap();
        assert_eq!(entry.path, "big");
        assert_eq!(entry.chunk_nr, 1);
        assert_eq!(entry.size, 5);
        assert_eq!(entry.key, k.chunk_key(&hash(2)));

        let first = index.lookup(&k.chunk_storage_address(&hash(1)).to_hex()).unwrap();
        assert_eq!(first.chunk_nr, 0);
        assert_eq!(first.size, CHUNK_SIZE);
    }

    #[test]
    fn rebuild_is_deterministic() {
        let tree = sample_tree();
        let a = ReverseIndex::build(&tree, &test_keyfile());
        let b = ReverseIndex::build(&tree, &test_keyfile());

        assert_eq!(a.len(), b.len());
        for (addr, entry) in a.iter() {
            let other = b.lookup(&addr.to_hex()).unwrap();
            assert_eq!(other.path, entry.path);
            assert_eq!(other.chunk_nr, entry.chunk_nr);
            assert_eq!(other.key, entry.key);
            assert_eq!(other.size, entry.size);
        }
    }

    #[test]
    fn lookup_failures_are_not_found() {
        let index = ReverseIndex::build(&sample_tree(), &test_keyfile());

        // malformed hex, wrong length, and a valid-but-unknown address
        assert!(matches!(index.lookup("zz"), Err(SfsError::NotFound(_))));
        assert!(matches!(index.lookup("abcd"), Err(SfsError::NotFound(_))));
        let unknown = StorageAddress::from_bytes([0u8; 64]).to_hex();
        assert!(matches!(index.lookup(&unknown), Err(SfsError::NotFound(_))));
    }

    #[test]
    fn lookup_takes_full_paths() {
        let index = ReverseIndex::build(&sample_tree(), &test_keyfile());
        let k = test_keyfile();
        let hex = k.chunk_storage_address(&hash(1)).to_hex();
        let as_path = format!("{}/{}", &hex[..2], hex);
        assert!(index.lookup(&as_path).is_ok());
    }

    #[test]
    fn prefix_listing_partitions_the_index() {
        let index = ReverseIndex::build(&sample_tree(), &test_keyfile());
        let mut seen = 0;
        for b in 0u16..256 {
            seen += index.names_with_prefix(&format!("{b:02x}")).len();
        }
        assert_eq!(seen, index.len());
    }
}
