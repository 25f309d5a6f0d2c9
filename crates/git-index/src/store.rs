//! Ordered entry storage keyed by `(path, stage)`.

use std::cmp::Ordering;

use bstr::{BStr, ByteSlice};
use git_hash::HashAlgorithm;

use crate::entry::IndexEntry;
use crate::{IndexError, ParseError, Stage};

/// Signature of the cached-tree extension. Invalidated by any mutation.
pub(crate) const TREE_SIGNATURE: &[u8; 4] = b"TREE";

/// An extension block kept as raw bytes so it survives a round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExtension {
    pub signature: [u8; 4],
    pub data: Vec<u8>,
}

impl RawExtension {
    /// Uppercase-first signatures are optional: readers may ignore them.
    pub fn is_optional(&self) -> bool {
        self.signature[0].is_ascii_uppercase()
    }
}

/// Entries sorted by `(path bytes, stage)`.
///
/// Invariants held by every method:
/// - no two entries share `(path, stage)`;
/// - a path has either a stage 0 entry or conflict entries, never both.
///
/// Equality covers content only: entries, extensions and hash algorithm. The
/// on-disk version is an encoding preference that writing may raise (extended
/// flags) or lower (v4), so it does not take part.
#[derive(Debug, Clone)]
pub struct IndexStore {
    pub(crate) version: u32,
    pub(crate) hash_algo: HashAlgorithm,
    pub(crate) entries: Vec<IndexEntry>,
    pub(crate) extensions: Vec<RawExtension>,
}

impl PartialEq for IndexStore {
    fn eq(&self, other: &Self) -> bool {
        self.hash_algo == other.hash_algo && self.entries == other.entries && self.extensions == other.extensions
    }
}

impl Eq for IndexStore {}

impl Default for IndexStore {
    fn default() -> Self {
        Self::new(HashAlgorithm::Sha1)
    }
}

fn key_cmp(entry: &IndexEntry, path: &[u8], stage: Stage) -> Ordering {
    entry
        .path()
        .as_bytes()
        .cmp(path)
        .then(entry.stage().cmp(&stage))
}

impl IndexStore {
    pub fn new(hash_algo: HashAlgorithm) -> Self {
        Self {
            version: 2,
            hash_algo,
            entries: Vec::new(),
            extensions: Vec::new(),
        }
    }

    /// Parse a SHA-1 index file.
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        Self::parse_with(data, HashAlgorithm::Sha1)
    }

    pub fn parse_with(data: &[u8], hash_algo: HashAlgorithm) -> Result<Self, ParseError> {
        crate::read::parse_store(data, hash_algo)
    }

    /// Encode as an index file. Output depends only on the store's contents.
    pub fn serialize(&self) -> Result<Vec<u8>, IndexError> {
        crate::write::serialize_store(self)
    }

    /// Version the store was read with (or will prefer when written).
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Preferred on-disk version. Writes never produce v4 and use v3 only
    /// when extended flags require it.
    pub fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    pub fn hash_algo(&self) -> HashAlgorithm {
        self.hash_algo
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn extensions(&self) -> &[RawExtension] {
        &self.extensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry_at(&self, index: usize) -> Result<&IndexEntry, IndexError> {
        self.entries.get(index).ok_or(IndexError::OutOfRange {
            index,
            len: self.entries.len(),
        })
    }

    /// Binary search for `(path, stage)`: `Ok(pos)` if present, otherwise
    /// `Err(pos)` with the insertion point.
    pub fn position(&self, path: &[u8], stage: Stage) -> Result<usize, usize> {
        self.entries
            .binary_search_by(|e| key_cmp(e, path, stage))
    }

    /// The stage 0 entry for `path`.
    pub fn find(&self, path: &[u8]) -> Option<&IndexEntry> {
        self.find_stage(path, Stage::Normal)
    }

    pub fn find_stage(&self, path: &[u8], stage: Stage) -> Option<&IndexEntry> {
        self.position(path, stage).ok().map(|i| &self.entries[i])
    }

    /// Every stage of `path`, in stage order.
    pub fn entries_for(&self, path: &[u8]) -> &[IndexEntry] {
        let start = self
            .entries
            .partition_point(|e| e.path().as_bytes() < path);
        let len = self.entries[start..]
            .iter()
            .take_while(|e| e.path().as_bytes() == path)
            .count();
        &self.entries[start..start + len]
    }

    pub fn contains_path(&self, path: &[u8]) -> bool {
        !self.entries_for(path).is_empty()
    }

    /// Insert `entry`, replacing one with the same key.
    ///
    /// Staging a stage 0 entry drops the path's conflict entries; staging a
    /// conflict entry drops its stage 0 entry.
    pub fn insert_or_replace(&mut self, entry: IndexEntry) {
        let path = entry.path().as_bytes().to_vec();
        let stage = entry.stage();

        if stage == Stage::Normal {
            self.remove_conflict_stages(&path);
        } else {
            self.remove_stage(&path, Stage::Normal);
        }

        match self.position(&path, stage) {
            Ok(pos) => self.entries[pos] = entry,
            Err(pos) => self.entries.insert(pos, entry),
        }
        self.invalidate_cached_tree();
    }

    /// Drop every stage of `path`. Returns how many entries went away.
    pub fn remove(&mut self, path: &[u8]) -> usize {
        let start = self
            .entries
            .partition_point(|e| e.path().as_bytes() < path);
        let end = start + self.entries_for(path).len();
        if start != end {
            self.entries.drain(start..end);
            self.invalidate_cached_tree();
        }
        end - start
    }

    pub fn remove_stage(&mut self, path: &[u8], stage: Stage) -> bool {
        match self.position(path, stage) {
            Ok(pos) => {
                self.entries.remove(pos);
                self.invalidate_cached_tree();
                true
            }
            Err(_) => false,
        }
    }

    /// Drop stages 1-3 of `path`, keeping any stage 0 entry.
    pub fn remove_conflict_stages(&mut self, path: &[u8]) -> usize {
        [Stage::Base, Stage::Ours, Stage::Theirs]
            .into_iter()
            .filter(|&stage| self.remove_stage(path, stage))
            .count()
    }

    /// Empty the store. Optional extensions go too: they describe the old entries.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.extensions.clear();
    }

    /// Replace every entry at once. `entries` must already be sorted and unique.
    pub(crate) fn replace_entries(&mut self, entries: Vec<IndexEntry>) {
        debug_assert!(entries
            .windows(2)
            .all(|w| key_cmp(&w[0], w[1].path().as_bytes(), w[1].stage()) == Ordering::Less));
        self.entries = entries;
        self.invalidate_cached_tree();
    }

    pub fn has_conflicts(&self) -> bool {
        self.entries.iter().any(|e| e.is_conflicted())
    }

    /// Distinct conflicted paths, in path order.
    pub fn conflicted_paths(&self) -> Vec<&BStr> {
        let mut paths: Vec<&BStr> = Vec::new();
        for entry in self.entries.iter().filter(|e| e.is_conflicted()) {
            if paths.last() != Some(&entry.path()) {
                paths.push(entry.path());
            }
        }
        paths
    }

    fn invalidate_cached_tree(&mut self) {
        self.extensions.retain(|ext| &ext.signature != TREE_SIGNATURE);
    }
}

#[cfg(test)]
mod tests {
    use git_hash::ObjectId;
    use git_odb::FileMode;

    use super::*;

    fn entry(path: &str, stage: Stage) -> IndexEntry {
        let oid = ObjectId::from_hex("e69de29bb2d1d6434b8b29ae775ad8c2e48c5391").unwrap();
        IndexEntry::new(path, oid, FileMode::Regular, stage).unwrap()
    }

    fn paths(store: &IndexStore) -> Vec<(String, u8)> {
        store
            .entries()
            .iter()
            .map(|e| (e.path().to_string(), e.stage().as_u8()))
            .collect()
    }

    #[test]
    fn inserts_keep_order() {
        let mut store = IndexStore::default();
        store.insert_or_replace(entry("b", Stage::Normal));
        store.insert_or_replace(entry("a/c", Stage::Normal));
        store.insert_or_replace(entry("a", Stage::Normal));
        store.insert_or_replace(entry("a-b", Stage::Normal));

        assert_eq!(
            paths(&store),
            vec![
                ("a".into(), 0),
                ("a-b".into(), 0),
                ("a/c".into(), 0),
                ("b".into(), 0)
            ]
        );
    }

    #[test]
    fn same_key_replaces() {
        let mut store = IndexStore::default();
        store.insert_or_replace(entry("x", Stage::Normal));
        let exec = IndexEntry::new("x", ObjectId::NULL_SHA1, FileMode::Executable, Stage::Normal).unwrap();
        store.insert_or_replace(exec);
        assert_eq!(store.len(), 1);
        assert_eq!(store.find(b"x").unwrap().mode(), FileMode::Executable);
    }

    #[test]
    fn stage_zero_and_conflicts_are_exclusive() {
        let mut store = IndexStore::default();
        store.insert_or_replace(entry("f", Stage::Normal));
        store.insert_or_replace(entry("f", Stage::Ours));
        store.insert_or_replace(entry("f", Stage::Theirs));
        assert_eq!(paths(&store), vec![("f".into(), 2), ("f".into(), 3)]);
        assert!(store.has_conflicts());

        store.insert_or_replace(entry("f", Stage::Normal));
        assert_eq!(paths(&store), vec![("f".into(), 0)]);
        assert!(!store.has_conflicts());
    }

    #[test]
    fn entries_for_is_contiguous() {
        let mut store = IndexStore::default();
        for stage in [Stage::Theirs, Stage::Base, Stage::Ours] {
            store.insert_or_replace(entry("m", stage));
        }
        store.insert_or_replace(entry("l", Stage::Normal));
        store.insert_or_replace(entry("n", Stage::Normal));

        let stages: Vec<u8> = store.entries_for(b"m").iter().map(|e| e.stage().as_u8()).collect();
        assert_eq!(stages, vec![1, 2, 3]);
        assert!(store.entries_for(b"zz").is_empty());
        assert_eq!(store.conflicted_paths(), vec!["m"]);
    }

    #[test]
    fn remove_counts_and_is_noop_when_absent() {
        let mut store = IndexStore::default();
        store.insert_or_replace(entry("a", Stage::Base));
        store.insert_or_replace(entry("a", Stage::Ours));
        store.insert_or_replace(entry("b", Stage::Normal));

        assert_eq!(store.remove(b"missing"), 0);
        assert_eq!(store.remove(b"a"), 2);
        assert_eq!(paths(&store), vec![("b".into(), 0)]);
        assert!(!store.remove_stage(b"b", Stage::Ours));
        assert!(store.remove_stage(b"b", Stage::Normal));
        assert!(store.is_empty());
    }

    #[test]
    fn entry_at_bounds() {
        let mut store = IndexStore::default();
        store.insert_or_replace(entry("only", Stage::Normal));
        assert!(store.entry_at(0).is_ok());
        assert!(matches!(
            store.entry_at(1),
            Err(IndexError::OutOfRange { index: 1, len: 1 })
        ));
    }

    #[test]
    fn mutation_drops_cached_tree_only() {
        let mut store = IndexStore::default();
        store.extensions.push(RawExtension {
            signature: *b"TREE",
            data: vec![1, 2, 3],
        });
        store.extensions.push(RawExtension {
            signature: *b"ZZZZ",
            data: vec![4],
        });
        store.insert_or_replace(entry("a", Stage::Normal));
        assert_eq!(store.extensions().len(), 1);
        assert_eq!(&store.extensions()[0].signature, b"ZZZZ");
        assert!(store.extensions()[0].is_optional());
    }
}
