//! The collaborators an index works against.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use git_hash::HashAlgorithm;
use git_odb::{LooseObjectStore, MemoryObjectStore, ObjectStore};
use git_utils::lockfile::LockFile;
use tracing::debug;

use crate::options::IndexOptions;
use crate::pathspec::{GlobMatcher, PathspecMatcher};
use crate::workdir::{FsWorkingDirectory, WorkingDirectory};
use crate::IndexError;

/// Where a repository keeps its serialized index.
pub trait IndexSlot: Send + Sync {
    /// Current bytes, or `None` if no index has been written yet.
    fn load(&self) -> Result<Option<Vec<u8>>, IndexError>;

    /// Replace the stored index. Readers see the old or the new bytes, never a mix.
    fn commit(&self, data: &[u8]) -> Result<(), IndexError>;

    fn location(&self) -> Option<&Path> {
        None
    }
}

/// Index file on disk, replaced through `<path>.lock`.
#[derive(Debug, Clone)]
pub struct FileIndexSlot {
    path: PathBuf,
}

impl FileIndexSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl IndexSlot for FileIndexSlot {
    fn load(&self) -> Result<Option<Vec<u8>>, IndexError> {
        match fs::read(&self.path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn commit(&self, data: &[u8]) -> Result<(), IndexError> {
        LockFile::write_atomically(&self.path, data)?;
        Ok(())
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// Index bytes held in memory.
#[derive(Debug, Default)]
pub struct MemoryIndexSlot {
    data: RwLock<Option<Vec<u8>>>,
}

impl MemoryIndexSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bytes(data: Vec<u8>) -> Self {
        Self {
            data: RwLock::new(Some(data)),
        }
    }

    pub fn snapshot(&self) -> Option<Vec<u8>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl IndexSlot for MemoryIndexSlot {
    fn load(&self) -> Result<Option<Vec<u8>>, IndexError> {
        Ok(self.snapshot())
    }

    fn commit(&self, data: &[u8]) -> Result<(), IndexError> {
        *self.data.write().unwrap_or_else(PoisonError::into_inner) = Some(data.to_vec());
        Ok(())
    }
}

/// Object storage, working directory, index slot and pathspec matcher an
/// [`Index`](crate::Index) is bound to.
///
/// Cheap to clone; collaborators are shared. A repository without a working
/// directory is bare.
#[derive(Clone)]
pub struct Repository {
    odb: Arc<dyn ObjectStore>,
    workdir: Option<Arc<dyn WorkingDirectory>>,
    slot: Arc<dyn IndexSlot>,
    matcher: Arc<dyn PathspecMatcher>,
    options: IndexOptions,
}

impl Repository {
    /// A bare repository over `odb` and `slot`.
    pub fn new(odb: Arc<dyn ObjectStore>, slot: Arc<dyn IndexSlot>) -> Self {
        let options = IndexOptions {
            hash_algo: odb.hash_algo(),
            ..IndexOptions::default()
        };
        Self {
            odb,
            workdir: None,
            slot,
            matcher: Arc::new(GlobMatcher),
            options,
        }
    }

    /// Bare repository with in-memory objects and index.
    pub fn in_memory(hash_algo: HashAlgorithm) -> Self {
        Self::new(
            Arc::new(MemoryObjectStore::new(hash_algo)),
            Arc::new(MemoryIndexSlot::new()),
        )
    }

    /// Open the repository whose working tree is `root`, honouring the
    /// `GIT_INDEX_FILE`, `GIT_INDEX_VERSION` and `GIT_DEFAULT_HASH` overrides.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, IndexError> {
        Self::open_with(root, IndexOptions::from_env())
    }

    pub fn open_with(root: impl AsRef<Path>, options: IndexOptions) -> Result<Self, IndexError> {
        let root = root.as_ref();
        let git_dir = root.join(".git");
        if !git_dir.is_dir() {
            return Err(IndexError::Precondition(format!(
                "not a git repository: {}",
                root.display()
            )));
        }
        let index_path = match &options.index_file {
            Some(path) => root.join(path),
            None => git_dir.join("index"),
        };
        let workdir = FsWorkingDirectory::new(root).with_trust_executable_bit(options.trust_executable_bit);
        debug!(root = %root.display(), index = %index_path.display(), "opened repository");

        Ok(Self::from_git_dir(&git_dir, &index_path, options).with_workdir(Arc::new(workdir)))
    }

    /// Open a bare repository rooted at its git directory.
    pub fn open_bare(git_dir: impl AsRef<Path>, options: IndexOptions) -> Result<Self, IndexError> {
        let git_dir = git_dir.as_ref();
        if !git_dir.join("objects").is_dir() {
            return Err(IndexError::Precondition(format!(
                "not a git directory: {}",
                git_dir.display()
            )));
        }
        let index_path = match &options.index_file {
            Some(path) => git_dir.join(path),
            None => git_dir.join("index"),
        };
        debug!(git_dir = %git_dir.display(), "opened bare repository");
        Ok(Self::from_git_dir(git_dir, &index_path, options))
    }

    fn from_git_dir(git_dir: &Path, index_path: &Path, options: IndexOptions) -> Self {
        let odb = LooseObjectStore::open(git_dir.join("objects"), options.hash_algo);
        Self::new(Arc::new(odb), Arc::new(FileIndexSlot::new(index_path))).with_options(options)
    }

    pub fn with_workdir(mut self, workdir: Arc<dyn WorkingDirectory>) -> Self {
        self.workdir = Some(workdir);
        self
    }

    pub fn with_matcher(mut self, matcher: Arc<dyn PathspecMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_options(mut self, options: IndexOptions) -> Self {
        self.options = options;
        self
    }

    pub fn odb(&self) -> &dyn ObjectStore {
        self.odb.as_ref()
    }

    pub fn workdir(&self) -> Option<&dyn WorkingDirectory> {
        self.workdir.as_deref()
    }

    pub fn slot(&self) -> &dyn IndexSlot {
        self.slot.as_ref()
    }

    pub fn matcher(&self) -> &dyn PathspecMatcher {
        self.matcher.as_ref()
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    pub fn hash_algo(&self) -> HashAlgorithm {
        self.odb.hash_algo()
    }

    pub fn is_bare(&self) -> bool {
        self.workdir.is_none()
    }

    /// The working directory, or `Precondition` for a bare repository.
    pub(crate) fn require_workdir(&self) -> Result<&dyn WorkingDirectory, IndexError> {
        self.workdir()
            .ok_or_else(|| IndexError::Precondition("bare repository has no working directory".into()))
    }
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("hash_algo", &self.hash_algo())
            .field("bare", &self.is_bare())
            .field("index", &self.slot.location())
            .finish_non_exhaustive()
    }
}
