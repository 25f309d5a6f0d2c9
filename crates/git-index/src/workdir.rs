//! Working directory access.
//!
//! The index reads file content and metadata through [`WorkingDirectory`];
//! [`FsWorkingDirectory`] backs it with a checkout on disk and
//! [`MemoryWorkingDirectory`] with a map, for tests and embedding.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use bstr::{BStr, BString, ByteSlice, ByteVec};
use git_odb::FileMode;
use tracing::trace;
use walkdir::WalkDir;

use crate::entry::{validate_path, StatData};

#[derive(Debug, thiserror::Error)]
pub enum WorkdirError {
    #[error("no such file in the working directory: {0}")]
    NotFound(BString),

    #[error("path cannot be used in the working directory: {0}")]
    InvalidPath(BString),

    #[error("'{path}' cannot be staged: {reason}")]
    Unsupported { path: BString, reason: &'static str },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: BString,
        #[source]
        source: io::Error,
    },
}

/// Mode and stat data of a working directory file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    pub mode: FileMode,
    pub stat: StatData,
}

/// Read access to the files of a checkout, addressed by repository-relative path.
pub trait WorkingDirectory: Send + Sync {
    /// Content to stage for `path`: file bytes, or the target of a symlink.
    fn read_file(&self, path: &BStr) -> Result<Vec<u8>, WorkdirError>;

    fn file_info(&self, path: &BStr) -> Result<FileInfo, WorkdirError>;

    /// Every stageable file, sorted by path bytes.
    fn list_files(&self) -> Result<Vec<BString>, WorkdirError>;
}

/// A working directory on the local file system.
#[derive(Debug, Clone)]
pub struct FsWorkingDirectory {
    root: PathBuf,
    trust_executable_bit: bool,
}

impl FsWorkingDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            trust_executable_bit: cfg!(unix),
        }
    }

    /// With `false`, every regular file is staged as non-executable
    /// (`core.filemode = false`).
    pub fn with_trust_executable_bit(mut self, trust: bool) -> Self {
        self.trust_executable_bit = trust;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn fs_path(&self, path: &BStr) -> Result<PathBuf, WorkdirError> {
        validate_path(path).map_err(|_| WorkdirError::InvalidPath(path.to_owned()))?;
        let rel = path
            .to_path()
            .map_err(|_| WorkdirError::InvalidPath(path.to_owned()))?;
        Ok(self.root.join(rel))
    }

    fn metadata(&self, path: &BStr) -> Result<(PathBuf, fs::Metadata), WorkdirError> {
        let fs_path = self.fs_path(path)?;
        match fs::symlink_metadata(&fs_path) {
            // A tracked file replaced by a directory is gone as far as the index cares.
            Ok(meta) if meta.is_dir() => Err(WorkdirError::NotFound(path.to_owned())),
            Ok(meta) => Ok((fs_path, meta)),
            Err(e) => Err(io_error(path, e)),
        }
    }

    fn mode_of(&self, path: &BStr, meta: &fs::Metadata) -> Result<FileMode, WorkdirError> {
        let file_type = meta.file_type();
        if file_type.is_symlink() {
            return Ok(FileMode::Symlink);
        }
        if !file_type.is_file() {
            return Err(WorkdirError::Unsupported {
                path: path.to_owned(),
                reason: "not a regular file or symbolic link",
            });
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if self.trust_executable_bit && meta.permissions().mode() & 0o100 != 0 {
                return Ok(FileMode::Executable);
            }
        }
        Ok(FileMode::Regular)
    }
}

fn io_error(path: &BStr, source: io::Error) -> WorkdirError {
    if source.kind() == io::ErrorKind::NotFound {
        WorkdirError::NotFound(path.to_owned())
    } else {
        WorkdirError::Io {
            path: path.to_owned(),
            source,
        }
    }
}

impl WorkingDirectory for FsWorkingDirectory {
    fn read_file(&self, path: &BStr) -> Result<Vec<u8>, WorkdirError> {
        let (fs_path, meta) = self.metadata(path)?;
        if meta.file_type().is_symlink() {
            let target = fs::read_link(&fs_path).map_err(|e| io_error(path, e))?;
            return Vec::from_path_buf(target).map_err(|_| WorkdirError::Unsupported {
                path: path.to_owned(),
                reason: "symlink target is not representable as bytes",
            });
        }
        self.mode_of(path, &meta)?;
        fs::read(&fs_path).map_err(|e| io_error(path, e))
    }

    fn file_info(&self, path: &BStr) -> Result<FileInfo, WorkdirError> {
        let (_, meta) = self.metadata(path)?;
        Ok(FileInfo {
            mode: self.mode_of(path, &meta)?,
            stat: StatData::from_metadata(&meta),
        })
    }

    fn list_files(&self) -> Result<Vec<BString>, WorkdirError> {
        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git");

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e
                    .path()
                    .map(|p| BString::from(Vec::from_path_lossy(p).into_owned()))
                    .unwrap_or_default();
                WorkdirError::Io {
                    path,
                    source: e.into(),
                }
            })?;
            if entry.file_type().is_dir() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let Some(bytes) = <[u8]>::from_path(rel) else {
                trace!(path = %rel.display(), "skipping unrepresentable path");
                continue;
            };
            #[cfg(windows)]
            let bytes = bytes.replace(b"\\", b"/");
            if validate_path(&bytes).is_ok() {
                files.push(BString::from(bytes));
            }
        }

        files.sort();
        Ok(files)
    }
}

#[derive(Debug, Clone)]
struct MemoryFile {
    content: Vec<u8>,
    mode: FileMode,
    stat: StatData,
}

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<BString, MemoryFile>,
    generation: u32,
}

/// Working directory held in memory.
///
/// Each write bumps a generation counter that is reported as the file's
/// mtime, so unchanged files look fresh and rewritten ones stale.
#[derive(Debug, Default)]
pub struct MemoryWorkingDirectory {
    state: RwLock<MemoryState>,
}

impl MemoryWorkingDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<BString>, content: impl Into<Vec<u8>>) {
        self.insert_with_mode(path, content, FileMode::Regular);
    }

    pub fn insert_with_mode(&self, path: impl Into<BString>, content: impl Into<Vec<u8>>, mode: FileMode) {
        let content = content.into();
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.generation += 1;
        let stat = StatData {
            mtime_secs: state.generation,
            size: content.len() as u32,
            ..StatData::default()
        };
        state.files.insert(path.into(), MemoryFile { content, mode, stat });
    }

    pub fn remove(&self, path: &str) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.files.remove(path.as_bytes().as_bstr()).is_some()
    }

    fn get(&self, path: &BStr) -> Result<MemoryFile, WorkdirError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| WorkdirError::NotFound(path.to_owned()))
    }
}

impl WorkingDirectory for MemoryWorkingDirectory {
    fn read_file(&self, path: &BStr) -> Result<Vec<u8>, WorkdirError> {
        Ok(self.get(path)?.content)
    }

    fn file_info(&self, path: &BStr) -> Result<FileInfo, WorkdirError> {
        let file = self.get(path)?;
        Ok(FileInfo {
            mode: file.mode,
            stat: file.stat,
        })
    }

    fn list_files(&self) -> Result<Vec<BString>, WorkdirError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.files.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_reads_and_lists() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        fs::create_dir_all(dir.path().join(".git/objects")).unwrap();
        fs::write(dir.path().join("a-b"), b"x").unwrap();
        fs::write(dir.path().join("src/nested/deep.rs"), b"deep").unwrap();
        fs::write(dir.path().join("src/lib.rs"), b"lib").unwrap();
        fs::write(dir.path().join(".git/config"), b"").unwrap();

        let wd = FsWorkingDirectory::new(dir.path());
        assert_eq!(
            wd.list_files().unwrap(),
            vec![
                BString::from("a-b"),
                BString::from("src/lib.rs"),
                BString::from("src/nested/deep.rs")
            ]
        );
        assert_eq!(wd.read_file(b"src/lib.rs".as_bstr()).unwrap(), b"lib");

        let info = wd.file_info(b"src/nested/deep.rs".as_bstr()).unwrap();
        assert_eq!(info.stat.size, 4);
        assert!(info.stat.has_timestamps());
    }

    #[test]
    fn fs_missing_and_directory_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let wd = FsWorkingDirectory::new(dir.path());

        assert!(matches!(wd.read_file(b"gone".as_bstr()), Err(WorkdirError::NotFound(_))));
        assert!(matches!(wd.file_info(b"sub".as_bstr()), Err(WorkdirError::NotFound(_))));
        assert!(matches!(
            wd.read_file(b"../escape".as_bstr()),
            Err(WorkdirError::InvalidPath(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn fs_modes() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("run.sh");
        fs::write(&script, b"#!/bin/sh\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        std::os::unix::fs::symlink("run.sh", dir.path().join("link")).unwrap();

        let wd = FsWorkingDirectory::new(dir.path());
        assert_eq!(wd.file_info(b"run.sh".as_bstr()).unwrap().mode, FileMode::Executable);
        assert_eq!(wd.file_info(b"link".as_bstr()).unwrap().mode, FileMode::Symlink);
        assert_eq!(wd.read_file(b"link".as_bstr()).unwrap(), b"run.sh");

        let untrusting = FsWorkingDirectory::new(dir.path()).with_trust_executable_bit(false);
        assert_eq!(untrusting.file_info(b"run.sh".as_bstr()).unwrap().mode, FileMode::Regular);
    }

    #[test]
    fn memory_generations() {
        let wd = MemoryWorkingDirectory::new();
        wd.insert("b.txt", "one");
        wd.insert("a.txt", "two");
        assert_eq!(wd.list_files().unwrap(), vec![BString::from("a.txt"), BString::from("b.txt")]);

        let before = wd.file_info(b"b.txt".as_bstr()).unwrap();
        assert_eq!(wd.file_info(b"b.txt".as_bstr()).unwrap(), before);
        wd.insert("b.txt", "one");
        assert_ne!(wd.file_info(b"b.txt".as_bstr()).unwrap().stat, before.stat);

        assert!(wd.remove("a.txt"));
        assert!(matches!(wd.read_file(b"a.txt".as_bstr()), Err(WorkdirError::NotFound(_))));
    }
}
