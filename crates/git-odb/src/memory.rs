use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use git_hash::{HashAlgorithm, ObjectId};

use crate::{hash_object, ObjectStore, ObjectType, OdbError};

/// Object store held entirely in memory. Useful for indexes that never touch
/// a repository on disk and for tests.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    hash_algo: HashAlgorithm,
    objects: RwLock<HashMap<ObjectId, (ObjectType, Vec<u8>)>>,
}

impl MemoryObjectStore {
    pub fn new(hash_algo: HashAlgorithm) -> Self {
        Self {
            hash_algo,
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for MemoryObjectStore {
    fn hash_algo(&self) -> HashAlgorithm {
        self.hash_algo
    }

    fn write_raw(&self, kind: ObjectType, content: &[u8]) -> Result<ObjectId, OdbError> {
        let oid = hash_object(self.hash_algo, kind, content)?;
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(oid)
            .or_insert_with(|| (kind, content.to_vec()));
        Ok(oid)
    }

    fn read_raw(&self, oid: &ObjectId) -> Result<Option<(ObjectType, Vec<u8>)>, OdbError> {
        Ok(self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(oid)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileMode, Tree, TreeEntry};

    #[test]
    fn identical_content_is_stored_once() {
        let store = MemoryObjectStore::new(HashAlgorithm::Sha1);
        let a = store.write_blob(b"same").unwrap();
        let b = store.write_blob(b"same").unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
        assert_eq!(store.read_blob(&a).unwrap(), b"same");
    }

    #[test]
    fn tree_roundtrip_and_type_check() {
        let store = MemoryObjectStore::new(HashAlgorithm::Sha1);
        let blob = store.write_blob(b"x").unwrap();
        let tree = Tree {
            entries: vec![TreeEntry {
                mode: FileMode::Regular,
                name: "x.txt".into(),
                oid: blob,
            }],
        };
        let tree_id = store.write_tree(&tree).unwrap();
        assert_eq!(store.read_tree(&tree_id).unwrap(), tree);
        assert!(matches!(
            store.read_tree(&blob),
            Err(OdbError::WrongType { .. })
        ));
    }

    #[test]
    fn missing_object() {
        let store = MemoryObjectStore::new(HashAlgorithm::Sha1);
        let oid = HashAlgorithm::Sha1.null_oid();
        assert!(!store.contains(&oid).unwrap());
        assert!(matches!(store.read_blob(&oid), Err(OdbError::NotFound(_))));
    }
}
