use std::fmt;

use crate::hex::{hex_decode, hex_to_string};
use crate::{HashAlgorithm, HashError};

/// Content-addressed identifier of a blob or tree.
///
/// The digest is carried inline; the variant records which algorithm
/// produced it so ids of different widths never compare equal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectId {
    Sha1([u8; 20]),
    Sha256([u8; 32]),
}

impl ObjectId {
    pub const NULL_SHA1: Self = Self::Sha1([0u8; 20]);
    pub const NULL_SHA256: Self = Self::Sha256([0u8; 32]);

    /// Build an id from a raw digest of the algorithm's width.
    pub fn from_bytes(bytes: &[u8], algo: HashAlgorithm) -> Result<Self, HashError> {
        let expected = algo.digest_len();
        if bytes.len() != expected {
            return Err(HashError::InvalidHashLength {
                expected,
                actual: bytes.len(),
            });
        }
        Ok(match algo {
            HashAlgorithm::Sha1 => {
                let mut arr = [0u8; 20];
                arr.copy_from_slice(bytes);
                Self::Sha1(arr)
            }
            HashAlgorithm::Sha256 => {
                let mut arr = [0u8; 32];
                arr.copy_from_slice(bytes);
                Self::Sha256(arr)
            }
        })
    }

    /// Parse a 40 or 64 character hex id; the width picks the algorithm.
    pub fn from_hex(hex: &str) -> Result<Self, HashError> {
        let algo = match hex.len() {
            40 => HashAlgorithm::Sha1,
            64 => HashAlgorithm::Sha256,
            actual => return Err(HashError::InvalidHexLength { expected: 40, actual }),
        };
        let mut buf = [0u8; 32];
        let digest = &mut buf[..algo.digest_len()];
        hex_decode(hex, digest)?;
        Self::from_bytes(digest, algo)
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Sha1(b) => b,
            Self::Sha256(b) => b,
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Sha1(_) => HashAlgorithm::Sha1,
            Self::Sha256(_) => HashAlgorithm::Sha256,
        }
    }

    pub fn is_null(&self) -> bool {
        self.as_bytes().iter().all(|&b| b == 0)
    }

    pub fn to_hex(&self) -> String {
        hex_to_string(self.as_bytes())
    }

    /// Relative path of the loose object file: `"xx/yyyy..."`.
    pub fn loose_path(&self) -> String {
        let hex = self.to_hex();
        format!("{}/{}", &hex[..2], &hex[2..])
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", &self.to_hex()[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_BLOB: &str = "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391";

    #[test]
    fn hex_roundtrip_sha1() {
        let oid = ObjectId::from_hex(EMPTY_BLOB).unwrap();
        assert_eq!(oid.algorithm(), HashAlgorithm::Sha1);
        assert_eq!(oid.to_string(), EMPTY_BLOB);
    }

    #[test]
    fn hex_sha256_width() {
        let hex = "ab".repeat(32);
        let oid = ObjectId::from_hex(&hex).unwrap();
        assert_eq!(oid.algorithm(), HashAlgorithm::Sha256);
        assert_eq!(oid.as_bytes().len(), 32);
    }

    #[test]
    fn uppercase_hex_accepted() {
        let lower = ObjectId::from_hex(EMPTY_BLOB).unwrap();
        let upper = ObjectId::from_hex(&EMPTY_BLOB.to_ascii_uppercase()).unwrap();
        assert_eq!(lower, upper);
    }

    #[test]
    fn bad_lengths_rejected() {
        assert!(matches!(
            ObjectId::from_hex("abcd"),
            Err(HashError::InvalidHexLength { .. })
        ));
        assert!(matches!(
            ObjectId::from_bytes(&[0; 10], HashAlgorithm::Sha1),
            Err(HashError::InvalidHashLength { expected: 20, actual: 10 })
        ));
    }

    #[test]
    fn null_and_debug() {
        assert!(ObjectId::NULL_SHA1.is_null());
        let oid = ObjectId::from_hex(EMPTY_BLOB).unwrap();
        assert!(!oid.is_null());
        assert_eq!(format!("{oid:?}"), "ObjectId(e69de29b)");
        assert_eq!(oid.loose_path(), format!("e6/{}", &EMPTY_BLOB[2..]));
    }

    #[test]
    fn ordering_is_bytewise() {
        let a = ObjectId::from_hex(&format!("{}1", "0".repeat(39))).unwrap();
        let b = ObjectId::from_hex(&format!("{}2", "0".repeat(39))).unwrap();
        assert!(a < b);
    }
}
