//! Digests for index trailers and object ids.

use digest::Digest;

use crate::{HashAlgorithm, HashError, ObjectId};

/// One-shot hashing with the workspace's algorithms.
///
/// SHA-1 runs with collision detection; a detected collision is reported as
/// [`HashError::Sha1Collision`] instead of a digest.
pub struct Hasher;

impl Hasher {
    /// Digest of `parts` concatenated.
    fn digest_parts(algo: HashAlgorithm, parts: &[&[u8]]) -> Result<ObjectId, HashError> {
        match algo {
            HashAlgorithm::Sha1 => {
                let mut h = sha1_checked::Sha1::new();
                parts.iter().for_each(|p| h.update(p));
                let result = h.try_finalize();
                if result.has_collision() {
                    return Err(HashError::Sha1Collision);
                }
                ObjectId::from_bytes(result.hash().as_slice(), algo)
            }
            HashAlgorithm::Sha256 => {
                let mut h = sha2::Sha256::new();
                parts.iter().for_each(|p| h.update(p));
                ObjectId::from_bytes(h.finalize().as_slice(), algo)
            }
        }
    }

    /// Hash `data` as is. Used for the index trailer checksum.
    pub fn digest(algo: HashAlgorithm, data: &[u8]) -> Result<ObjectId, HashError> {
        Self::digest_parts(algo, &[data])
    }

    /// Id of an object: the digest of `"{kind} {len}\0{data}"`.
    pub fn hash_object(algo: HashAlgorithm, kind: &str, data: &[u8]) -> Result<ObjectId, HashError> {
        let header = format!("{kind} {}\0", data.len());
        Self::digest_parts(algo, &[header.as_bytes(), data])
    }
}
