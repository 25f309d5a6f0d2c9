use git_hash::hasher::Hasher;
use git_hash::{HashAlgorithm, ObjectId};
use proptest::prelude::*;

#[test]
fn sha1_empty_digest() {
    let oid = Hasher::digest(HashAlgorithm::Sha1, b"").unwrap();
    assert_eq!(oid.to_hex(), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
}

#[test]
fn sha256_empty_digest() {
    let oid = Hasher::digest(HashAlgorithm::Sha256, b"").unwrap();
    assert_eq!(
        oid.to_hex(),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

// `git hash-object` ids: "blob <len>\0" prefixed before hashing.

#[test]
fn empty_blob_id() {
    let oid = Hasher::hash_object(HashAlgorithm::Sha1, "blob", b"").unwrap();
    assert_eq!(oid.to_hex(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
}

#[test]
fn hello_world_blob_id() {
    let oid = Hasher::hash_object(HashAlgorithm::Sha1, "blob", b"hello world\n").unwrap();
    assert_eq!(oid.to_hex(), "3b18e512dba79e4c8300dd08aeb37f8e728b8dad");
}

#[test]
fn empty_tree_id() {
    let oid = Hasher::hash_object(HashAlgorithm::Sha1, "tree", b"").unwrap();
    assert_eq!(oid.to_hex(), "4b825dc642cb6eb9a060e54bf8d69288fbee4904");
}

#[test]
fn object_header_is_part_of_the_digest() {
    let framed = Hasher::digest(HashAlgorithm::Sha256, b"blob 11\0hello world").unwrap();
    assert_eq!(
        Hasher::hash_object(HashAlgorithm::Sha256, "blob", b"hello world").unwrap(),
        framed
    );
}

proptest! {
    #[test]
    fn hex_parse_inverts_display(bytes in proptest::collection::vec(any::<u8>(), 20)) {
        let oid = ObjectId::from_bytes(&bytes, HashAlgorithm::Sha1).unwrap();
        prop_assert_eq!(ObjectId::from_hex(&oid.to_hex()).unwrap(), oid);
    }
}
