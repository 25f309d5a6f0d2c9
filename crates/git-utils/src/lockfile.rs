//! Single-writer file replacement.
//!
//! A writer creates `<path>.lock` exclusively, writes the new contents into it,
//! then renames it over `<path>`. Readers only ever observe the old or the new
//! file. A lock that is dropped without [`LockFile::commit`] is removed and the
//! target is left untouched.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::error::{LockError, UtilError};
use crate::Result;

const LOCK_SUFFIX: &str = ".lock";

/// RAII guard over `<path>.lock`.
pub struct LockFile {
    path: PathBuf,
    lock_path: PathBuf,
    file: Option<File>,
    committed: bool,
}

impl LockFile {
    /// Create `<path>.lock` with `create_new`, failing if another writer holds it.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut lock_name = path.clone().into_os_string();
        lock_name.push(LOCK_SUFFIX);
        let lock_path = PathBuf::from(lock_name);

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|e| {
                let err = if e.kind() == io::ErrorKind::AlreadyExists {
                    LockError::AlreadyLocked {
                        path: lock_path.clone(),
                    }
                } else {
                    LockError::Create {
                        path: lock_path.clone(),
                        source: e,
                    }
                };
                UtilError::Lock(err)
            })?;

        trace!(lock = %lock_path.display(), "lock acquired");
        Ok(Self {
            path,
            lock_path,
            file: Some(file),
            committed: false,
        })
    }

    /// Replace `path` with `data` in one step: lock, write, commit.
    pub fn write_atomically(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
        let mut lock = Self::acquire(path)?;
        lock.write_all(data)?;
        lock.commit()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Flush, fsync and rename the lock over the target.
    pub fn commit(mut self) -> Result<()> {
        let commit_err = |path: &Path, source: io::Error| {
            UtilError::Lock(LockError::Commit {
                path: path.to_path_buf(),
                source,
            })
        };

        if let Some(mut file) = self.file.take() {
            file.flush().map_err(|e| commit_err(&self.lock_path, e))?;
            file.sync_all().map_err(|e| commit_err(&self.lock_path, e))?;
        }

        fs::rename(&self.lock_path, &self.path).map_err(|e| commit_err(&self.lock_path, e))?;
        self.committed = true;
        trace!(path = %self.path.display(), "lock committed");
        Ok(())
    }

    /// Discard the pending contents. Dropping the guard does the same.
    pub fn rollback(mut self) -> Result<()> {
        self.file.take();
        self.committed = true;
        match fs::remove_file(&self.lock_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Write for LockFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("lock file already closed"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("lock file already closed"))?
            .flush()
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if !self.committed {
            self.file.take();
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_replaces_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("index");
        fs::write(&target, b"old").unwrap();

        let mut lock = LockFile::acquire(&target).unwrap();
        assert!(lock.lock_path().exists());
        lock.write_all(b"new").unwrap();
        lock.commit().unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"new");
        assert!(!dir.path().join("index.lock").exists());
    }

    #[test]
    fn dropped_lock_leaves_target_alone() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("index");
        fs::write(&target, b"original").unwrap();

        {
            let mut lock = LockFile::acquire(&target).unwrap();
            lock.write_all(b"half written").unwrap();
        }

        assert_eq!(fs::read(&target).unwrap(), b"original");
        assert!(!dir.path().join("index.lock").exists());
    }

    #[test]
    fn rollback_removes_lock() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("index");

        let lock = LockFile::acquire(&target).unwrap();
        lock.rollback().unwrap();

        assert!(!target.exists());
        assert!(!dir.path().join("index.lock").exists());
    }

    #[test]
    fn second_writer_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("index");

        let _held = LockFile::acquire(&target).unwrap();
        match LockFile::acquire(&target) {
            Err(UtilError::Lock(LockError::AlreadyLocked { .. })) => {}
            Err(e) => panic!("expected AlreadyLocked, got {e}"),
            Ok(_) => panic!("expected AlreadyLocked, got Ok"),
        }
        assert!(LockFile::write_atomically(&target, b"x").is_err());
        assert!(!target.exists());
    }

    #[test]
    fn write_atomically_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("fresh");

        LockFile::write_atomically(&target, b"created").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"created");
    }
}
