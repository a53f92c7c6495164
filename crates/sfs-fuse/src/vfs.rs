//! Transport-independent filesystem call results.
//!
//! The mount layer (whatever delivers kernel filesystem calls) translates
//! these into its own attribute/entry/errno shapes; the views themselves
//! never depend on a particular transport.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// Attribute-query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attr {
    pub size: u64,
    /// Unix seconds.
    pub mtime: u64,
    pub kind: EntryKind,
}

/// One directory-listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// Per-call failures a view surfaces to its transport.
///
/// `NotFound` and `NotADirectory` are ordinary outcomes; `Io` means an
/// underlying open/seek/read failed. None of these tear the view down.
#[derive(Debug, Error)]
pub enum VfsError {
    #[error("no such entry: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
