use std::ffi::OsString;
use std::path::PathBuf;

use git_hash::HashAlgorithm;
use tracing::warn;

/// Settings for opening and writing an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexOptions {
    /// Algorithm naming objects and the index checksum.
    pub hash_algo: HashAlgorithm,
    /// Preferred on-disk version for new indexes: 2 or 3. Extended flags
    /// always force 3, and 4 is read but never written.
    pub version: u32,
    /// GIT_INDEX_FILE override, relative to the working tree root when not absolute.
    pub index_file: Option<PathBuf>,
    /// core.filemode: whether the executable bit of working files is staged.
    pub trust_executable_bit: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            hash_algo: HashAlgorithm::Sha1,
            version: 2,
            index_file: None,
            trust_executable_bit: cfg!(unix),
        }
    }
}

impl IndexOptions {
    /// Defaults overridden by `GIT_INDEX_FILE`, `GIT_INDEX_VERSION` and
    /// `GIT_DEFAULT_HASH`.
    pub fn from_env() -> Self {
        Self::default().apply_env(|var| std::env::var_os(var))
    }

    /// Apply overrides looked up through `lookup`. Unusable values are
    /// logged and ignored, as git does.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        if let Some(path) = lookup("GIT_INDEX_FILE").filter(|p| !p.is_empty()) {
            self.index_file = Some(PathBuf::from(path));
        }

        if let Some(raw) = lookup("GIT_INDEX_VERSION") {
            let raw = raw.to_string_lossy();
            match raw.trim().parse::<u32>() {
                Ok(v @ 2..=4) => self.version = v,
                _ => warn!(value = %raw, "GIT_INDEX_VERSION must be 2, 3 or 4; ignoring"),
            }
        }

        if let Some(raw) = lookup("GIT_DEFAULT_HASH") {
            let raw = raw.to_string_lossy();
            match HashAlgorithm::from_name(raw.trim()) {
                Some(algo) => self.hash_algo = algo,
                None => warn!(value = %raw, "unknown GIT_DEFAULT_HASH; ignoring"),
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<OsString> {
        let map: HashMap<String, OsString> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), OsString::from(*v)))
            .collect();
        move |var: &str| map.get(var).cloned()
    }

    #[test]
    fn defaults() {
        let opts = IndexOptions::default();
        assert_eq!(opts.hash_algo, HashAlgorithm::Sha1);
        assert_eq!(opts.version, 2);
        assert!(opts.index_file.is_none());
    }

    #[test]
    fn overrides_apply() {
        let opts = IndexOptions::default().apply_env(env(&[
            ("GIT_INDEX_FILE", "/tmp/alt-index"),
            ("GIT_INDEX_VERSION", "3"),
            ("GIT_DEFAULT_HASH", "sha256"),
        ]));
        assert_eq!(opts.index_file, Some(PathBuf::from("/tmp/alt-index")));
        assert_eq!(opts.version, 3);
        assert_eq!(opts.hash_algo, HashAlgorithm::Sha256);
    }

    #[test]
    fn bad_values_are_ignored() {
        let opts = IndexOptions::default().apply_env(env(&[
            ("GIT_INDEX_FILE", ""),
            ("GIT_INDEX_VERSION", "7"),
            ("GIT_DEFAULT_HASH", "md5"),
        ]));
        assert_eq!(opts, IndexOptions::default());
    }
}
