//! Object storage as seen by the index.
//!
//! The index only needs to store blobs, store and read trees, and know which
//! hash algorithm names them. [`ObjectStore`] is that contract; the crate
//! ships an in-memory store and a loose-object store on disk.

mod loose;
mod memory;
mod mode;
mod tree;

pub use loose::LooseObjectStore;
pub use memory::MemoryObjectStore;
pub use mode::FileMode;
pub use tree::{Tree, TreeEntry};

use git_hash::hasher::Hasher;
use git_hash::{HashAlgorithm, ObjectId};

pub use error::OdbError;

mod error {
    use std::path::PathBuf;

    use git_hash::ObjectId;

    use crate::ObjectType;

    #[derive(Debug, thiserror::Error)]
    pub enum OdbError {
        #[error("object not found: {0}")]
        NotFound(ObjectId),

        #[error("object {oid} is a {actual}, expected a {expected}")]
        WrongType {
            oid: ObjectId,
            expected: ObjectType,
            actual: ObjectType,
        },

        #[error("corrupt object {oid}: {reason}")]
        Corrupt { oid: String, reason: String },

        #[error("invalid tree entry at offset {offset}: {reason}")]
        InvalidTreeEntry { offset: usize, reason: String },

        #[error("hash mismatch for {path}: expected {expected}, got {actual}")]
        HashMismatch {
            path: PathBuf,
            expected: ObjectId,
            actual: ObjectId,
        },

        #[error(transparent)]
        Hash(#[from] git_hash::HashError),

        #[error(transparent)]
        Io(#[from] std::io::Error),
    }
}

/// Kinds of objects the index reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Blob,
    Tree,
}

impl ObjectType {
    pub fn from_bytes(s: &[u8]) -> Option<Self> {
        match s {
            b"blob" => Some(Self::Blob),
            b"tree" => Some(Self::Tree),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compute the id `content` would be stored under, without storing it.
pub fn hash_object(
    algo: HashAlgorithm,
    kind: ObjectType,
    content: &[u8],
) -> Result<ObjectId, OdbError> {
    Ok(Hasher::hash_object(algo, kind.as_str(), content)?)
}

/// Content-addressed storage consumed by the index.
///
/// Identical bytes always produce identical ids, so writes are idempotent.
pub trait ObjectStore: Send + Sync {
    /// Algorithm used to name stored objects.
    fn hash_algo(&self) -> HashAlgorithm;

    /// Store `content` as an object of `kind`; returns its id.
    fn write_raw(&self, kind: ObjectType, content: &[u8]) -> Result<ObjectId, OdbError>;

    /// Read an object back. `Ok(None)` when it is absent.
    fn read_raw(&self, oid: &ObjectId) -> Result<Option<(ObjectType, Vec<u8>)>, OdbError>;

    fn contains(&self, oid: &ObjectId) -> Result<bool, OdbError> {
        Ok(self.read_raw(oid)?.is_some())
    }

    fn write_blob(&self, content: &[u8]) -> Result<ObjectId, OdbError> {
        self.write_raw(ObjectType::Blob, content)
    }

    fn read_blob(&self, oid: &ObjectId) -> Result<Vec<u8>, OdbError> {
        read_typed(self, oid, ObjectType::Blob)
    }

    fn write_tree(&self, tree: &Tree) -> Result<ObjectId, OdbError> {
        self.write_raw(ObjectType::Tree, &tree.serialize_content())
    }

    fn read_tree(&self, oid: &ObjectId) -> Result<Tree, OdbError> {
        let content = read_typed(self, oid, ObjectType::Tree)?;
        Tree::parse(&content, self.hash_algo())
    }
}

fn read_typed<S: ObjectStore + ?Sized>(
    store: &S,
    oid: &ObjectId,
    expected: ObjectType,
) -> Result<Vec<u8>, OdbError> {
    match store.read_raw(oid)? {
        Some((kind, content)) if kind == expected => Ok(content),
        Some((actual, _)) => Err(OdbError::WrongType {
            oid: *oid,
            expected,
            actual,
        }),
        None => Err(OdbError::NotFound(*oid)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_type_names() {
        assert_eq!(ObjectType::from_bytes(b"blob"), Some(ObjectType::Blob));
        assert_eq!(ObjectType::from_bytes(b"commit"), None);
        assert_eq!(ObjectType::Tree.to_string(), "tree");
    }

    #[test]
    fn hash_object_matches_git() {
        let oid = hash_object(HashAlgorithm::Sha1, ObjectType::Blob, b"hi").unwrap();
        assert_eq!(oid.to_hex(), "32f95c0d1244a78b2be1bab8de17906fabb2c4a8");
    }
}
