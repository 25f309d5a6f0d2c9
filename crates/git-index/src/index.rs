//! The index manager: one store plus where it came from.

use std::fs::File;
use std::io;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use bstr::{BStr, ByteSlice};
use git_hash::{HashAlgorithm, ObjectId};
use git_odb::FileMode;
use git_utils::lockfile::LockFile;
use tracing::debug;

use crate::conflict::{self, Conflict};
use crate::entry::{validate_path, IndexEntry};
use crate::options::IndexOptions;
use crate::repository::Repository;
use crate::store::IndexStore;
use crate::{tree, IndexError, Stage};

/// Where [`Index::load`] reads from.
#[derive(Debug, Clone, Copy)]
pub enum IndexSource<'a> {
    /// Serialized index bytes. The index is not bound to any location.
    Bytes(&'a [u8]),
    /// An index file. A missing file is an empty index.
    File(&'a Path),
}

/// The staging area.
///
/// Owns exactly one [`IndexStore`]. Optionally bound to a [`Repository`],
/// which supplies object storage and the working directory, and to a
/// backing file. Queries take `&self`, mutations `&mut self`; every mutation
/// either applies completely or leaves the index untouched.
#[derive(Debug, Clone, Default)]
pub struct Index {
    store: IndexStore,
    repo: Option<Repository>,
    path: Option<PathBuf>,
}

/// Read the index file at `path`. A missing file is an empty store that
/// prefers `fresh_version`; an existing file keeps the version it was written with.
fn read_index_file(path: &Path, hash_algo: HashAlgorithm, fresh_version: u32) -> Result<IndexStore, IndexError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no index file, starting empty");
            let mut store = IndexStore::new(hash_algo);
            store.set_version(fresh_version);
            return Ok(store);
        }
        Err(e) => return Err(e.into()),
    };
    // Zero-length files cannot be mapped on every platform.
    if file.metadata()?.len() == 0 {
        return Ok(IndexStore::parse_with(&[], hash_algo)?);
    }
    // SAFETY: the map is only read while parsing; writers replace the file by
    // rename instead of modifying it in place.
    let data = unsafe { memmap2::Mmap::map(&file) }?;
    let store = IndexStore::parse_with(&data, hash_algo)?;
    debug!(path = %path.display(), entries = store.len(), version = store.version(), "read index file");
    Ok(store)
}

impl Index {
    /// An empty index bound to nothing.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hash_algo(hash_algo: HashAlgorithm) -> Self {
        Self {
            store: IndexStore::new(hash_algo),
            ..Self::default()
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, IndexError> {
        Ok(Self {
            store: IndexStore::parse(data)?,
            ..Self::default()
        })
    }

    /// Read the index file at `path` and remember it as the backing file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        Self::open_with(path, &IndexOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: &IndexOptions) -> Result<Self, IndexError> {
        let path = path.as_ref();
        let store = read_index_file(path, options.hash_algo, options.version)?;
        Ok(Self {
            store,
            repo: None,
            path: Some(path.to_path_buf()),
        })
    }

    /// Load the index kept in `repo`'s index slot and bind to the repository.
    pub fn from_repository(repo: Repository) -> Result<Self, IndexError> {
        let store = Self::load_slot(&repo)?;
        Ok(Self {
            store,
            repo: Some(repo),
            path: None,
        })
    }

    pub fn load(source: IndexSource<'_>) -> Result<Self, IndexError> {
        match source {
            IndexSource::Bytes(data) => Self::from_bytes(data),
            IndexSource::File(path) => Self::open(path),
        }
    }

    fn load_slot(repo: &Repository) -> Result<IndexStore, IndexError> {
        let hash_algo = repo.hash_algo();
        let store = match repo.slot().load()? {
            Some(data) => IndexStore::parse_with(&data, hash_algo)?,
            None => {
                let mut store = IndexStore::new(hash_algo);
                store.set_version(repo.options().version);
                store
            }
        };
        debug!(?repo, entries = store.len(), "loaded index from repository");
        Ok(store)
    }

    /// Re-read from the repository or the backing file, discarding unwritten
    /// changes. On failure the current contents are kept.
    pub fn refresh(&mut self) -> Result<(), IndexError> {
        let store = match (&self.repo, &self.path) {
            (Some(repo), _) => Self::load_slot(repo)?,
            (None, Some(path)) => read_index_file(path, self.store.hash_algo(), self.store.version())?,
            (None, None) => return Err(IndexError::NoBackingStore),
        };
        self.store = store;
        Ok(())
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn repository(&self) -> Option<&Repository> {
        self.repo.as_ref()
    }

    /// Backing file, if the index was opened from one.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn version(&self) -> u32 {
        self.store.version()
    }

    pub fn hash_algo(&self) -> HashAlgorithm {
        self.store.hash_algo()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// All entries in `(path, stage)` order.
    pub fn entries(&self) -> &[IndexEntry] {
        self.store.entries()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, IndexEntry> {
        self.store.entries().iter()
    }

    pub fn has_conflicts(&self) -> bool {
        self.store.has_conflicts()
    }

    pub fn entry_at(&self, index: usize) -> Result<&IndexEntry, IndexError> {
        self.store.entry_at(index)
    }

    /// The stage 0 entry for `path`. A malformed path is `InvalidPath`,
    /// an absent one `NotFound`.
    pub fn entry_by_path(&self, path: impl AsRef<[u8]>) -> Result<&IndexEntry, IndexError> {
        self.entry_by_path_and_stage(path, Stage::Normal)
    }

    pub fn entry_by_path_and_stage(&self, path: impl AsRef<[u8]>, stage: Stage) -> Result<&IndexEntry, IndexError> {
        let path = path.as_ref();
        validate_path(path)?;
        self.store
            .find_stage(path, stage)
            .ok_or_else(|| IndexError::NotFound(path.into()))
    }

    /// Every stage recorded for `path`.
    pub fn entries_for(&self, path: impl AsRef<[u8]>) -> &[IndexEntry] {
        self.store.entries_for(path.as_ref())
    }

    pub fn conflicted_paths(&self) -> Vec<&BStr> {
        self.store.conflicted_paths()
    }

    pub(crate) fn require_repo(&self) -> Result<&Repository, IndexError> {
        self.repo.as_ref().ok_or(IndexError::NoRepository)
    }

    /// Mode to stage for a working file. Without a trusted executable bit
    /// the bit is kept from the staged entry.
    pub(crate) fn effective_mode(&self, path: &BStr, mode: FileMode, trust_executable_bit: bool) -> FileMode {
        if trust_executable_bit || !mode.is_blob() {
            return mode;
        }
        self.store
            .find(path)
            .filter(|e| e.mode().is_blob())
            .map_or(mode, |e| e.mode())
    }

    pub(crate) fn store_mut(&mut self) -> &mut IndexStore {
        &mut self.store
    }

    fn check_algo(&self, entry: &IndexEntry) -> Result<(), IndexError> {
        if entry.oid().algorithm() != self.store.hash_algo() {
            return Err(IndexError::InvalidEntry(format!(
                "'{}' has a {} id but the index uses {}",
                entry.path(),
                entry.oid().algorithm(),
                self.store.hash_algo()
            )));
        }
        Ok(())
    }

    /// Stage `entry`, replacing the same `(path, stage)`.
    ///
    /// An entry carrying the null id has its content read from the working
    /// directory and stored first; a non-null id is trusted as given.
    pub fn add_entry(&mut self, entry: IndexEntry) -> Result<(), IndexError> {
        let entry = if entry.oid().is_null() {
            let repo = self.require_repo()?;
            let content = repo.require_workdir()?.read_file(entry.path())?;
            let oid = repo.odb().write_blob(&content)?;
            entry.with_content(oid, content.len())
        } else {
            entry
        };
        self.check_algo(&entry)?;
        debug!(path = %entry.path(), stage = entry.stage().as_u8(), "add entry");
        self.store.insert_or_replace(entry);
        Ok(())
    }

    /// Stage the working directory file at `path` as stage 0.
    pub fn add_file(&mut self, path: impl AsRef<[u8]>) -> Result<ObjectId, IndexError> {
        let path = BStr::new(path.as_ref());
        let repo = self.require_repo()?;
        let workdir = repo.require_workdir()?;
        validate_path(path)?;

        let info = workdir.file_info(path)?;
        let content = workdir.read_file(path)?;
        let oid = repo.odb().write_blob(&content)?;

        let mode = self.effective_mode(path, info.mode, repo.options().trust_executable_bit);
        let mut stat = info.stat;
        stat.size = content.len() as u32;

        let entry = IndexEntry::new(path, oid, mode, Stage::Normal)?.with_stat(stat);
        debug!(%path, %oid, "add file");
        self.store.insert_or_replace(entry);
        Ok(oid)
    }

    /// Stage in-memory `content` at `path`. Needs only object storage, so
    /// bare repositories work too.
    pub fn add_from_buffer(&mut self, path: impl AsRef<[u8]>, content: &[u8], mode: FileMode) -> Result<ObjectId, IndexError> {
        let path = BStr::new(path.as_ref());
        let repo = self.require_repo()?;
        validate_path(path)?;
        let probe = IndexEntry::new(path, repo.hash_algo().null_oid(), mode, Stage::Normal)?;

        let oid = repo.odb().write_blob(content)?;
        let entry = probe.with_content(oid, content.len());
        debug!(%path, %oid, "add from buffer");
        self.store.insert_or_replace(entry);
        Ok(oid)
    }

    /// Record a conflict for one path, replacing whatever was staged there.
    ///
    /// Each side is restaged as stage 1, 2 or 3 respectively; at least one
    /// side must be given and all sides must name the same path.
    pub fn add_conflict(
        &mut self,
        ancestor: Option<IndexEntry>,
        ours: Option<IndexEntry>,
        theirs: Option<IndexEntry>,
    ) -> Result<(), IndexError> {
        let sides: Vec<IndexEntry> = [(ancestor, Stage::Base), (ours, Stage::Ours), (theirs, Stage::Theirs)]
            .into_iter()
            .filter_map(|(entry, stage)| entry.map(|e| e.with_stage(stage)))
            .collect();

        let Some(first) = sides.first() else {
            return Err(IndexError::InvalidEntry("a conflict needs at least one side".into()));
        };
        let path = first.path().to_owned();
        for side in &sides {
            if side.path() != path.as_bstr() {
                return Err(IndexError::InvalidEntry(format!(
                    "conflict sides name different paths: '{path}' and '{}'",
                    side.path()
                )));
            }
            if side.oid().is_null() {
                return Err(IndexError::InvalidEntry(format!(
                    "conflict side for '{path}' has no object id"
                )));
            }
            self.check_algo(side)?;
        }

        debug!(%path, sides = sides.len(), "add conflict");
        self.store.remove(&path);
        for side in sides {
            self.store.insert_or_replace(side);
        }
        Ok(())
    }

    /// Remove every stage of `path`. Absent paths are not an error.
    pub fn remove_file(&mut self, path: impl AsRef<[u8]>) -> Result<usize, IndexError> {
        let path = path.as_ref();
        self.require_repo()?;
        validate_path(path)?;
        let removed = self.store.remove(path);
        debug!(path = %BStr::new(path), removed, "remove file");
        Ok(removed)
    }

    /// Drop the stage 1-3 entries of `path`.
    pub fn remove_conflict(&mut self, path: impl AsRef<[u8]>) -> Result<usize, IndexError> {
        let path = path.as_ref();
        validate_path(path)?;
        Ok(self.store.remove_conflict_stages(path))
    }

    /// Drop every entry. Nothing is persisted until [`Index::write`].
    pub fn clear(&mut self) {
        self.store.clear();
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, IndexError> {
        self.store.serialize()
    }

    /// Persist to the repository's index slot, or else to the backing file.
    pub fn write(&self) -> Result<(), IndexError> {
        let data = self.to_bytes()?;
        match (&self.repo, &self.path) {
            (Some(repo), _) => repo.slot().commit(&data)?,
            (None, Some(path)) => LockFile::write_atomically(path, &data)?,
            (None, None) => return Err(IndexError::NoBackingStore),
        }
        debug!(entries = self.len(), bytes = data.len(), "wrote index");
        Ok(())
    }

    /// Write to `path` atomically. The backing file stays what it was.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), IndexError> {
        let data = self.to_bytes()?;
        LockFile::write_atomically(path.as_ref(), &data)?;
        debug!(path = %path.as_ref().display(), "wrote index copy");
        Ok(())
    }

    /// Store the stage 0 entries as tree objects and return the root id.
    pub fn write_tree(&self) -> Result<ObjectId, IndexError> {
        let repo = self.require_repo()?;
        if self.store.has_conflicts() {
            return Err(IndexError::ConflictPresent {
                count: self.store.conflicted_paths().len(),
            });
        }
        tree::write_tree(self.store.entries(), repo.odb())
    }

    /// Replace all entries with the contents of tree `tree_id`.
    pub fn read_tree(&mut self, tree_id: &ObjectId) -> Result<(), IndexError> {
        let repo = self.require_repo()?;
        let entries = tree::read_tree(repo.odb(), tree_id)?;
        self.store.clear();
        self.store.replace_entries(entries);
        Ok(())
    }

    /// Conflicted paths with their sides, in path order.
    pub fn conflicts(&self) -> Vec<Conflict<'_>> {
        conflict::group(self.store.entries())
    }

    /// Call `visit(ancestor, ours, theirs)` for each conflicted path in path
    /// order until it breaks. Returns `Break` if it stopped early.
    pub fn enumerate_conflicts<F>(&self, mut visit: F) -> ControlFlow<()>
    where
        F: FnMut(Option<&IndexEntry>, Option<&IndexEntry>, Option<&IndexEntry>) -> ControlFlow<()>,
    {
        for c in self.conflicts() {
            if visit(c.ancestor, c.ours, c.theirs).is_break() {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }
}

impl<'a> IntoIterator for &'a Index {
    type Item = &'a IndexEntry;
    type IntoIter = std::slice::Iter<'a, IndexEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
