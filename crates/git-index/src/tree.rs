//! Conversion between index entries and tree objects.

use std::collections::BTreeMap;

use bstr::{BString, ByteSlice};
use git_hash::ObjectId;
use git_odb::{FileMode, ObjectStore, Tree, TreeEntry};
use tracing::debug;

use crate::entry::IndexEntry;
use crate::{IndexError, Stage};

enum Item {
    Blob { mode: FileMode, oid: ObjectId },
    Dir(usize),
}

/// One directory. Children are always created after their parent, so a
/// child's arena index is greater than its parent's.
#[derive(Default)]
struct Node {
    items: BTreeMap<BString, Item>,
}

/// Write the tree hierarchy for the stage 0 entries of `entries` and return
/// the root tree id. Intent-to-add placeholders are left out.
pub(crate) fn write_tree(entries: &[IndexEntry], odb: &dyn ObjectStore) -> Result<ObjectId, IndexError> {
    let mut arena = vec![Node::default()];

    for entry in entries
        .iter()
        .filter(|e| e.stage() == Stage::Normal && !e.flags().intent_to_add)
    {
        insert(&mut arena, entry)?;
    }

    let mut ids = vec![odb.hash_algo().null_oid(); arena.len()];
    for index in (0..arena.len()).rev() {
        let mut tree = Tree::new();
        for (name, item) in &arena[index].items {
            let (mode, oid) = match *item {
                Item::Blob { mode, oid } => (mode, oid),
                Item::Dir(child) => (FileMode::Tree, ids[child]),
            };
            tree.entries.push(TreeEntry {
                mode,
                name: name.clone(),
                oid,
            });
        }
        tree.sort();
        ids[index] = odb.write_tree(&tree)?;
    }

    let root = ids[0];
    debug!(trees = arena.len(), %root, "wrote tree from index");
    Ok(root)
}

fn insert(arena: &mut Vec<Node>, entry: &IndexEntry) -> Result<(), IndexError> {
    let clash = || IndexError::InvalidPath {
        path: entry.path().to_owned(),
        reason: "path is both a file and a directory",
    };

    let path = entry.path();
    let (dirs, name) = match path.rfind_byte(b'/') {
        Some(pos) => (&path[..pos], &path[pos + 1..]),
        None => (&path[..0], &path[..]),
    };

    let mut node = 0;
    if !dirs.is_empty() {
        for component in dirs.split_str("/") {
            let next = arena.len();
            node = match arena[node].items.get(component.as_bstr()) {
                Some(Item::Dir(child)) => *child,
                Some(Item::Blob { .. }) => return Err(clash()),
                None => {
                    arena[node].items.insert(BString::from(component), Item::Dir(next));
                    arena.push(Node::default());
                    next
                }
            };
        }
    }

    if arena[node].items.contains_key(name.as_bstr()) {
        return Err(clash());
    }
    arena[node].items.insert(
        BString::from(name),
        Item::Blob {
            mode: entry.mode(),
            oid: entry.oid(),
        },
    );
    Ok(())
}

/// Flatten the tree `root` into sorted stage 0 entries.
pub(crate) fn read_tree(odb: &dyn ObjectStore, root: &ObjectId) -> Result<Vec<IndexEntry>, IndexError> {
    let mut entries = Vec::new();
    let mut pending: Vec<(BString, ObjectId)> = vec![(BString::default(), *root)];

    while let Some((prefix, oid)) = pending.pop() {
        let tree = odb.read_tree(&oid)?;
        for item in tree.entries {
            let mut path = prefix.clone();
            if !path.is_empty() {
                path.push(b'/');
            }
            path.extend_from_slice(&item.name);

            if item.mode.is_tree() {
                pending.push((path, item.oid));
            } else {
                entries.push(IndexEntry::new(path, item.oid, item.mode, Stage::Normal)?);
            }
        }
    }

    entries.sort_by(|a, b| a.path().cmp(b.path()));
    if let Some(pair) = entries.windows(2).find(|w| w[0].path() == w[1].path()) {
        return Err(IndexError::InvalidEntry(format!(
            "tree {root} lists '{}' twice",
            pair[0].path()
        )));
    }
    debug!(%root, entries = entries.len(), "read tree into index");
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use git_hash::HashAlgorithm;
    use git_odb::MemoryObjectStore;

    use super::*;
    use crate::entry::EntryFlags;

    fn blob(odb: &MemoryObjectStore, path: &str, content: &str) -> IndexEntry {
        let oid = odb.write_blob(content.as_bytes()).unwrap();
        IndexEntry::new(path, oid, FileMode::Regular, Stage::Normal).unwrap()
    }

    #[test]
    fn empty_index_writes_empty_tree() {
        let odb = MemoryObjectStore::new(HashAlgorithm::Sha1);
        let oid = write_tree(&[], &odb).unwrap();
        assert_eq!(oid.to_hex(), "4b825dc642cb6eb9a060e54bf8d69288fbee4904");
    }

    #[test]
    fn nested_round_trip() {
        let odb = MemoryObjectStore::new(HashAlgorithm::Sha1);
        let entries = vec![
            blob(&odb, "a.c", "1"),
            blob(&odb, "a/b/deep", "2"),
            blob(&odb, "a/z", "3"),
            blob(&odb, "top", "4"),
        ];
        let root = write_tree(&entries, &odb).unwrap();

        let tree = odb.read_tree(&root).unwrap();
        let names: Vec<String> = tree.entries.iter().map(|e| e.name.to_string()).collect();
        assert_eq!(names, vec!["a.c", "a", "top"]);

        let back = read_tree(&odb, &root).unwrap();
        assert_eq!(back, entries);
    }

    #[test]
    fn file_directory_clash() {
        let odb = MemoryObjectStore::new(HashAlgorithm::Sha1);
        let entries = vec![blob(&odb, "a", "file"), blob(&odb, "a/b", "nested")];
        assert!(matches!(
            write_tree(&entries, &odb),
            Err(IndexError::InvalidPath { .. })
        ));
    }

    #[test]
    fn skips_conflicts_and_intent_to_add() {
        let odb = MemoryObjectStore::new(HashAlgorithm::Sha1);
        let kept = blob(&odb, "kept", "k");
        let entries = vec![
            blob(&odb, "conflicted", "c").with_stage(Stage::Ours),
            kept.clone(),
            blob(&odb, "new", "n").with_flags(EntryFlags {
                intent_to_add: true,
                ..Default::default()
            }),
        ];
        let with_extras = write_tree(&entries, &odb).unwrap();
        let plain = write_tree(&[kept], &odb).unwrap();
        assert_eq!(with_extras, plain);
    }

    #[test]
    fn missing_tree_is_an_error() {
        let odb = MemoryObjectStore::new(HashAlgorithm::Sha1);
        let bogus = ObjectId::from_hex("0123456789012345678901234567890123456789").unwrap();
        assert!(matches!(read_tree(&odb, &bogus), Err(IndexError::Odb(_))));
    }
}
