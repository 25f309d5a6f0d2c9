use std::cmp::Ordering;

use bstr::{BStr, BString, ByteSlice};
use git_hash::{HashAlgorithm, ObjectId};

use crate::{FileMode, OdbError};

/// One named entry of a tree object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: FileMode,
    pub name: BString,
    pub oid: ObjectId,
}

impl TreeEntry {
    /// Tree ordering: a subtree compares as if its name ended in `/`,
    /// so `foo.c` < `foo` (dir) < `foo0`.
    pub fn cmp_entries(a: &TreeEntry, b: &TreeEntry) -> Ordering {
        let (n1, n2) = (a.name.as_bytes(), b.name.as_bytes());
        let common = n1.len().min(n2.len());
        n1[..common].cmp(&n2[..common]).then_with(|| {
            let tail = |name: &[u8], is_dir: bool| match name.get(common) {
                Some(&c) => c,
                None if is_dir => b'/',
                None => 0,
            };
            tail(n1, a.mode.is_tree()).cmp(&tail(n2, b.mode.is_tree()))
        })
    }
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TreeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        Self::cmp_entries(self, other)
    }
}

/// A directory listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `<octal mode> <name>\0<raw oid>` records.
    pub fn parse(content: &[u8], algo: HashAlgorithm) -> Result<Self, OdbError> {
        let oid_len = algo.digest_len();
        let mut entries = Vec::new();
        let mut pos = 0;

        while pos < content.len() {
            let invalid = |offset: usize, reason: &str| OdbError::InvalidTreeEntry {
                offset,
                reason: reason.into(),
            };

            let space = content[pos..]
                .find_byte(b' ')
                .ok_or_else(|| invalid(pos, "missing space after mode"))?
                + pos;
            let mode = FileMode::from_octal(&content[pos..space])
                .ok_or_else(|| invalid(pos, "invalid mode"))?;

            let name_start = space + 1;
            let nul = content[name_start..]
                .find_byte(0)
                .ok_or_else(|| invalid(name_start, "missing NUL after name"))?
                + name_start;
            let name = BString::from(&content[name_start..nul]);
            if name.is_empty() {
                return Err(invalid(name_start, "empty name"));
            }

            let oid_start = nul + 1;
            let oid_bytes = content
                .get(oid_start..oid_start + oid_len)
                .ok_or_else(|| invalid(oid_start, "truncated object id"))?;
            let oid = ObjectId::from_bytes(oid_bytes, algo)?;

            entries.push(TreeEntry { mode, name, oid });
            pos = oid_start + oid_len;
        }

        Ok(Self { entries })
    }

    /// Serialize in canonical order regardless of the order of `entries`.
    pub fn serialize_content(&self) -> Vec<u8> {
        let mut sorted: Vec<&TreeEntry> = self.entries.iter().collect();
        sorted.sort();

        let mut out = Vec::new();
        for entry in sorted {
            out.extend_from_slice(&entry.mode.as_octal());
            out.push(b' ');
            out.extend_from_slice(&entry.name);
            out.push(0);
            out.extend_from_slice(entry.oid.as_bytes());
        }
        out
    }

    pub fn sort(&mut self) {
        self.entries.sort();
    }

    pub fn find(&self, name: &BStr) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name.as_bstr() == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, mode: FileMode) -> TreeEntry {
        TreeEntry {
            mode,
            name: name.into(),
            oid: ObjectId::NULL_SHA1,
        }
    }

    #[test]
    fn directory_sorts_with_trailing_slash() {
        let dir = entry("foo", FileMode::Tree);
        assert_eq!(dir.cmp(&entry("foo.c", FileMode::Regular)), Ordering::Greater);
        assert_eq!(dir.cmp(&entry("foo-bar", FileMode::Regular)), Ordering::Greater);
        assert_eq!(dir.cmp(&entry("foo0", FileMode::Regular)), Ordering::Less);
    }

    #[test]
    fn parse_serialized_tree() {
        let blob = ObjectId::from_hex("e69de29bb2d1d6434b8b29ae775ad8c2e48c5391").unwrap();
        let tree = Tree {
            entries: vec![
                TreeEntry {
                    mode: FileMode::Executable,
                    name: "run.sh".into(),
                    oid: blob,
                },
                TreeEntry {
                    mode: FileMode::Tree,
                    name: "lib".into(),
                    oid: blob,
                },
            ],
        };

        let parsed = Tree::parse(&tree.serialize_content(), HashAlgorithm::Sha1).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.entries[0].name, "lib");
        assert_eq!(parsed.entries[0].mode, FileMode::Tree);
        assert_eq!(parsed.find(BStr::new("run.sh")).unwrap().mode, FileMode::Executable);
    }

    #[test]
    fn truncated_oid_rejected() {
        let mut data = b"100644 a.txt\0".to_vec();
        data.extend_from_slice(&[0xab; 7]);
        assert!(matches!(
            Tree::parse(&data, HashAlgorithm::Sha1),
            Err(OdbError::InvalidTreeEntry { .. })
        ));
    }

    #[test]
    fn empty_tree_parses() {
        assert!(Tree::parse(b"", HashAlgorithm::Sha1).unwrap().is_empty());
    }
}
