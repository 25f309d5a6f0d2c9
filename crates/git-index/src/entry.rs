//! Index entry types: IndexEntry, StatData, EntryFlags.

use bstr::{BStr, BString, ByteSlice};
use git_hash::ObjectId;
use git_odb::FileMode;

use crate::{IndexError, Stage};

/// A single staged path.
///
/// Entries are values: there are no setters, a changed entry is a new entry
/// that replaces the old one in the store. The builder methods consume `self`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    path: BString,
    oid: ObjectId,
    mode: FileMode,
    stage: Stage,
    stat: StatData,
    flags: EntryFlags,
}

impl IndexEntry {
    /// Build an entry after validating path and mode.
    ///
    /// A null `oid` means the content has not been hashed yet; the index
    /// fills it in from the working directory when the entry is added.
    pub fn new(
        path: impl Into<BString>,
        oid: ObjectId,
        mode: FileMode,
        stage: Stage,
    ) -> Result<Self, IndexError> {
        let path = path.into();
        validate_path(&path)?;
        if mode.is_tree() {
            return Err(IndexError::InvalidEntry(format!(
                "'{path}': directories cannot be staged"
            )));
        }
        Ok(Self {
            path,
            oid,
            mode,
            stage,
            stat: StatData::default(),
            flags: EntryFlags::default(),
        })
    }

    /// Parsed entries were validated by the reader.
    pub(crate) fn from_parts(
        path: BString,
        oid: ObjectId,
        mode: FileMode,
        stage: Stage,
        stat: StatData,
        flags: EntryFlags,
    ) -> Self {
        Self {
            path,
            oid,
            mode,
            stage,
            stat,
            flags,
        }
    }

    pub fn with_stat(self, stat: StatData) -> Self {
        Self { stat, ..self }
    }

    pub fn with_flags(self, flags: EntryFlags) -> Self {
        Self { flags, ..self }
    }

    pub fn with_stage(self, stage: Stage) -> Self {
        Self { stage, ..self }
    }

    /// Same entry pointing at freshly hashed content of `size` bytes.
    pub(crate) fn with_content(self, oid: ObjectId, size: usize) -> Self {
        let stat = StatData {
            size: size as u32,
            ..self.stat
        };
        Self { oid, stat, ..self }
    }

    pub fn path(&self) -> &BStr {
        self.path.as_bstr()
    }

    pub fn oid(&self) -> ObjectId {
        self.oid
    }

    pub fn mode(&self) -> FileMode {
        self.mode
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn stat(&self) -> &StatData {
        &self.stat
    }

    pub fn flags(&self) -> EntryFlags {
        self.flags
    }

    /// Size of the staged content as last recorded. Informational only.
    pub fn size(&self) -> u32 {
        self.stat.size
    }

    pub fn is_conflicted(&self) -> bool {
        self.stage.is_conflict()
    }
}

/// Reject paths git would refuse to stage.
///
/// Paths are repository-relative byte strings: non-empty, no NUL, no leading
/// or trailing `/`, and no empty, `.`, `..` or `.git` component.
pub fn validate_path(path: &[u8]) -> Result<(), IndexError> {
    let fail = |reason| {
        Err(IndexError::InvalidPath {
            path: BString::from(path),
            reason,
        })
    };

    if path.is_empty() {
        return fail("empty path");
    }
    if path.contains(&0) {
        return fail("embedded NUL byte");
    }
    if path.starts_with(b"/") || path.ends_with(b"/") {
        return fail("leading or trailing slash");
    }
    for component in path.split_str("/") {
        match component {
            b"" => return fail("empty path component"),
            b"." | b".." => return fail("relative path component"),
            c if c.eq_ignore_ascii_case(b".git") => return fail("'.git' component"),
            _ => {}
        }
    }
    Ok(())
}

/// File system stat data cached in the index.
///
/// Zero timestamps mean "unknown"; such entries are never considered fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatData {
    pub ctime_secs: u32,
    pub ctime_nsecs: u32,
    pub mtime_secs: u32,
    pub mtime_nsecs: u32,
    pub dev: u32,
    pub ino: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
}

impl StatData {
    #[cfg(unix)]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            ctime_secs: meta.ctime() as u32,
            ctime_nsecs: meta.ctime_nsec() as u32,
            mtime_secs: meta.mtime() as u32,
            mtime_nsecs: meta.mtime_nsec() as u32,
            dev: meta.dev() as u32,
            ino: meta.ino() as u32,
            uid: meta.uid(),
            gid: meta.gid(),
            size: meta.len() as u32,
        }
    }

    #[cfg(not(unix))]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        use std::time::UNIX_EPOCH;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .unwrap_or_default();
        Self {
            ctime_secs: mtime.as_secs() as u32,
            ctime_nsecs: mtime.subsec_nanos(),
            mtime_secs: mtime.as_secs() as u32,
            mtime_nsecs: mtime.subsec_nanos(),
            size: meta.len() as u32,
            ..Self::default()
        }
    }

    pub fn has_timestamps(&self) -> bool {
        self.mtime_secs != 0 || self.mtime_nsecs != 0
    }

    /// Staleness hint: does a fresh stat of the file still match what was
    /// recorded? Size and mtime must agree exactly; ctime, inode, device and
    /// owner are compared only when both sides know them.
    pub fn matches(&self, current: &StatData) -> bool {
        if !self.has_timestamps() || !current.has_timestamps() {
            return false;
        }
        if self.size != current.size
            || self.mtime_secs != current.mtime_secs
            || self.mtime_nsecs != current.mtime_nsecs
        {
            return false;
        }
        let agree = |a: u32, b: u32| a == 0 || b == 0 || a == b;
        agree(self.ctime_secs, current.ctime_secs)
            && agree(self.ino, current.ino)
            && agree(self.dev, current.dev)
            && agree(self.uid, current.uid)
            && agree(self.gid, current.gid)
    }
}

/// Entry flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryFlags {
    /// CE_VALID: assume the entry is unchanged.
    pub assume_valid: bool,
    /// CE_INTENT_TO_ADD: placeholder for `git add -N`.
    pub intent_to_add: bool,
    /// CE_SKIP_WORKTREE: the entry is not checked out.
    pub skip_worktree: bool,
}

impl EntryFlags {
    /// Extended flags need the version 3 on-disk layout.
    pub fn has_extended(&self) -> bool {
        self.intent_to_add || self.skip_worktree
    }
}
