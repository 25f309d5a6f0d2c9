//! Index (staging area) for git.
//!
//! Tracks which blob is staged for every path, including the stage 1-3
//! records a merge leaves behind for conflicted paths. The persisted form is
//! the `DIRC` index file git itself reads and writes.
//!
//! Layers, leaves first:
//! - [`IndexEntry`]: one staged path, immutable once built.
//! - [`IndexStore`]: entries ordered by `(path, stage)`, parse / serialize.
//! - [`Index`]: the manager tying a store to its backing file or
//!   [`Repository`] (object storage, working directory, index slot).
//! - [`Index::update_pathspecs`]: brings entries in line with the working tree.

pub mod conflict;
pub mod entry;
mod index;
mod options;
pub mod pathspec;
mod read;
mod repository;
mod store;
mod tree;
mod update;
pub mod workdir;
mod write;

pub use conflict::Conflict;
pub use entry::{EntryFlags, IndexEntry, StatData};
pub use error::{IndexError, ParseError};
pub use index::{Index, IndexSource};
pub use options::IndexOptions;
pub use pathspec::{GlobMatcher, PathspecMatcher};
pub use repository::{FileIndexSlot, IndexSlot, MemoryIndexSlot, Repository};
pub use store::{IndexStore, RawExtension};
pub use update::{UpdateDecision, UpdateSummary};
pub use workdir::{FileInfo, FsWorkingDirectory, MemoryWorkingDirectory, WorkdirError, WorkingDirectory};

mod error {
    use bstr::BString;

    use crate::workdir::WorkdirError;

    /// Why persisted index bytes were rejected. Parsing never yields a
    /// partially populated store.
    #[derive(Debug, thiserror::Error)]
    pub enum ParseError {
        #[error("invalid index header: {0}")]
        InvalidHeader(String),

        #[error("unsupported index version: {0}")]
        UnsupportedVersion(u32),

        #[error("index checksum mismatch")]
        ChecksumMismatch,

        #[error("index truncated at offset {offset}")]
        Truncated { offset: usize },

        #[error("invalid index entry at offset {offset}: {reason}")]
        InvalidEntry { offset: usize, reason: String },

        #[error("invalid extension '{sig}': {reason}")]
        InvalidExtension { sig: String, reason: String },

        #[error("index entries out of order at offset {offset}")]
        Unsorted { offset: usize },
    }

    #[derive(Debug, thiserror::Error)]
    pub enum IndexError {
        #[error(transparent)]
        Parse(#[from] ParseError),

        #[error("path not found in index: {0}")]
        NotFound(BString),

        #[error("entry position {index} out of range (index has {len} entries)")]
        OutOfRange { index: usize, len: usize },

        #[error("operation requires a repository")]
        NoRepository,

        #[error("index has no backing file or repository to read from or write to")]
        NoBackingStore,

        #[error("cannot write tree: {count} conflicted path(s) in index")]
        ConflictPresent { count: usize },

        #[error("precondition failed: {0}")]
        Precondition(String),

        #[error("invalid path '{path}': {reason}")]
        InvalidPath { path: BString, reason: &'static str },

        #[error("invalid entry: {0}")]
        InvalidEntry(String),

        #[error("invalid pathspec: {0}")]
        InvalidPathspec(String),

        #[error("update aborted at '{path}'")]
        Aborted { path: BString },

        #[error(transparent)]
        Lock(#[from] git_utils::UtilError),

        #[error(transparent)]
        Workdir(WorkdirError),

        #[error(transparent)]
        Odb(#[from] git_odb::OdbError),

        #[error(transparent)]
        Hash(#[from] git_hash::HashError),

        #[error(transparent)]
        Io(#[from] std::io::Error),
    }

    impl From<WorkdirError> for IndexError {
        fn from(err: WorkdirError) -> Self {
            match err {
                WorkdirError::NotFound(path) => IndexError::NotFound(path),
                other => IndexError::Workdir(other),
            }
        }
    }

    impl IndexError {
        pub fn is_not_found(&self) -> bool {
            matches!(self, IndexError::NotFound(_))
        }
    }
}

/// Merge stage for index entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Normal entry (stage 0).
    Normal,
    /// Common ancestor in a merge conflict (stage 1).
    Base,
    /// Our side of a merge conflict (stage 2).
    Ours,
    /// Their side of a merge conflict (stage 3).
    Theirs,
}

impl Stage {
    pub fn as_u8(&self) -> u8 {
        match self {
            Stage::Normal => 0,
            Stage::Base => 1,
            Stage::Ours => 2,
            Stage::Theirs => 3,
        }
    }

    pub fn from_u8(n: u8) -> Result<Self, IndexError> {
        match n {
            0 => Ok(Stage::Normal),
            1 => Ok(Stage::Base),
            2 => Ok(Stage::Ours),
            3 => Ok(Stage::Theirs),
            _ => Err(IndexError::InvalidEntry(format!("invalid stage: {n}"))),
        }
    }

    pub fn is_conflict(&self) -> bool {
        *self != Stage::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_order_matches_numbers() {
        assert!(Stage::Normal < Stage::Base);
        assert!(Stage::Ours < Stage::Theirs);
        for n in 0..4 {
            assert_eq!(Stage::from_u8(n).unwrap().as_u8(), n);
        }
        assert!(Stage::from_u8(4).is_err());
    }

    #[test]
    fn workdir_not_found_maps_to_not_found() {
        let err: IndexError = WorkdirError::NotFound("gone.txt".into()).into();
        assert!(err.is_not_found());
    }
}
