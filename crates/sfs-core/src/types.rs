//! Metadata tree types and fixed-size hash/key newtypes.
//!
//! 64-byte values (content hashes and derived storage addresses) serialize
//! as 128-char lowercase hex strings, which keeps the JSON payload of the
//! encrypted database human-debuggable and matches the on-disk chunk
//! file naming.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{SfsError, SfsResult};

/// Path of the scan root inside a [`FileTree`].
pub const ROOT: &str = ".";

/// Length of a content hash / storage address in bytes (SHA-512).
pub const HASH_LEN: usize = 64;

/// Length of a derived symmetric key in bytes.
pub const KEY_LEN: usize = 32;

// ── 64-byte identifiers ───────────────────────────────────────────────────

/// SHA-512 hash of one plaintext chunk. Identifies chunk *content*.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkHash([u8; HASH_LEN]);

/// Derived on-disk name of one encrypted chunk. Same shape as a
/// [`ChunkHash`] but a distinct identity domain: storage addresses are a
/// keyed function of the content hash, so leaking them reveals nothing
/// about plaintext content.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StorageAddress([u8; HASH_LEN]);

macro_rules! impl_hash64 {
    ($name:ident, $label:literal) => {
        impl $name {
            pub fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
                Self(bytes)
            }

            /// Build from a slice; errors unless it is exactly 64 bytes.
            pub fn from_slice(bytes: &[u8]) -> SfsResult<Self> {
                if bytes.len() != HASH_LEN {
                    return Err(SfsError::Validation(format!(
                        concat!($label, " must be {} bytes, got {}"),
                        HASH_LEN,
                        bytes.len()
                    )));
                }
                let mut out = [0u8; HASH_LEN];
                out.copy_from_slice(bytes);
                Ok(Self(out))
            }

            /// Parse a 128-char lowercase/uppercase hex string.
            pub fn from_hex(s: &str) -> SfsResult<Self> {
                let raw = hex::decode(s)
                    .map_err(|e| SfsError::Validation(format!(concat!("bad ", $label, " hex: {}"), e)))?;
                Self::from_slice(&raw)
            }

            /// Lowercase hex form (128 chars).
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // full hex is unwieldy in logs; the first 8 chars identify a chunk
                write!(f, concat!(stringify!($name), "({}..)"), &self.to_hex()[..8])
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

impl_hash64!(ChunkHash, "content hash");
impl_hash64!(StorageAddress, "storage address");

// ── Derived key material ──────────────────────────────────────────────────

/// A derived per-chunk symmetric key. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ChunkKey([u8; KEY_LEN]);

/// The database envelope key. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DbKey([u8; KEY_LEN]);

macro_rules! impl_key32 {
    ($name:ident) => {
        impl $name {
            pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("bytes", &"[REDACTED]")
                    .finish()
            }
        }
    };
}

impl_key32!(ChunkKey);
impl_key32!(DbKey);

// ── Metadata tree ─────────────────────────────────────────────────────────

/// One immediate child of a folder node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Child {
    pub name: String,
    pub is_file: bool,
}

/// File/folder payload of a [`Node`]. Exactly one variant per entry; a
/// file can never carry folder data or vice versa.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Ordered chunk content hashes, one per CHUNK_SIZE window.
    /// Invariant: `chunks.len() == ceil(size / CHUNK_SIZE)`; empty for a
    /// zero-byte file.
    File { chunks: Vec<ChunkHash> },
    /// Immediate children as the scan produced them.
    Folder { children: Vec<Child> },
}

/// One entry of the metadata tree. `size` and `mtime` are meaningful for
/// both variants (folders carry a nominal size of 0).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub size: u64,
    /// Unix seconds of last modification.
    pub mtime: u64,
    pub kind: NodeKind,
}

impl Node {
    pub fn is_file(&self) -> bool {
        matches!(self.kind, NodeKind::File { .. })
    }

    /// Chunk hash list of a file node; `None` for folders.
    pub fn chunks(&self) -> Option<&[ChunkHash]> {
        match &self.kind {
            NodeKind::File { chunks } => Some(chunks),
            NodeKind::Folder { .. } => None,
        }
    }

    /// Child list of a folder node; `None` for files.
    pub fn children(&self) -> Option<&[Child]> {
        match &self.kind {
            NodeKind::Folder { children } => Some(children),
            NodeKind::File { .. } => None,
        }
    }
}

/// The scanned plaintext tree: path (relative to the scan root, `"."` for
/// the root itself) → node. Created wholesale by the scanner, persisted by
/// the encrypted database, and read-only everywhere else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileTree {
    entries: HashMap<String, Node>,
}

impl FileTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&Node> {
        self.entries.get(path)
    }

    pub fn insert(&mut self, path: String, node: Node) {
        self.entries.insert(path, node);
    }

    pub fn remove(&mut self, path: &str) -> Option<Node> {
        self.entries.remove(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Node)> {
        self.entries.iter()
    }

    /// Sum of all file sizes (statfs accounting).
    pub fn total_size(&self) -> u64 {
        self.entries
            .values()
            .filter(|n| n.is_file())
            .map(|n| n.size)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hash(fill: u8) -> ChunkHash {
        ChunkHash::from_bytes([fill; HASH_LEN])
    }

    #[test]
    fn hash_hex_roundtrip() {
        let h = sample_hash(0xa7);
        let hex = h.to_hex();
        assert_eq!(hex.len(), 128);
        assert_eq!(ChunkHash::from_hex(&hex).unwrap(), h);
    }

    #[test]
    fn hash_rejects_bad_input() {
        assert!(ChunkHash::from_hex("zz").is_err());
        assert!(ChunkHash::from_hex("abcd").is_err()); // right charset, wrong length
        assert!(ChunkHash::from_slice(&[0u8; 63]).is_err());
    }

    #[test]
    fn tree_json_roundtrip() {
        let mut tree = FileTree::new();
        tree.insert(
            ROOT.to_string(),
            Node {
                size: 0,
                mtime: 1700000000,
                kind: NodeKind::Folder {
                    children: vec![Child {
                        name: "a.txt".to_string(),
                        is_file: true,
                    }],
                },
            },
        );
        tree.insert(
            "a.txt".to_string(),
            Node {
                size: 17,
                mtime: 1700000001,
                kind: NodeKind::File {
                    chunks: vec![sample_hash(1)],
                },
            },
        );

        let json = serde_json::to_vec(&tree).unwrap();
        let back: FileTree = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn key_debug_is_redacted() {
        let key = ChunkKey::from_bytes([7u8; KEY_LEN]);
        assert!(!format!("{key:?}").contains('7'));
    }
}
