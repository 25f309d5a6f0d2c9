//! Loose objects: one zlib-compressed `"<type> <len>\0<content>"` file per
//! object under `objects/xx/yyyy...`.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use git_hash::{HashAlgorithm, ObjectId};
use tracing::trace;

use crate::{hash_object, ObjectStore, ObjectType, OdbError};

/// Loose object directory on disk.
#[derive(Debug, Clone)]
pub struct LooseObjectStore {
    objects_dir: PathBuf,
    hash_algo: HashAlgorithm,
    compression: flate2::Compression,
}

impl LooseObjectStore {
    pub fn open(objects_dir: impl AsRef<Path>, hash_algo: HashAlgorithm) -> Self {
        Self {
            objects_dir: objects_dir.as_ref().to_path_buf(),
            hash_algo,
            compression: flate2::Compression::default(),
        }
    }

    /// Zlib level, 0-9.
    pub fn set_compression_level(&mut self, level: u32) {
        self.compression = flate2::Compression::new(level);
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    pub fn object_path(&self, oid: &ObjectId) -> PathBuf {
        self.objects_dir.join(oid.loose_path())
    }

    fn write_compressed(&self, header: &[u8], content: &[u8], dest: &Path) -> Result<(), OdbError> {
        let dir = dest.parent().unwrap_or(&self.objects_dir);
        fs::create_dir_all(dir)?;

        let nonce = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos();
        let tmp = dir.join(format!("tmp_obj_{}_{}", std::process::id(), nonce));

        let result = (|| -> Result<(), OdbError> {
            let mut encoder = ZlibEncoder::new(fs::File::create(&tmp)?, self.compression);
            encoder.write_all(header)?;
            encoder.write_all(content)?;
            encoder.finish()?.sync_all()?;
            fs::rename(&tmp, dest)?;
            Ok(())
        })();

        if result.is_err() {
            let _ = fs::remove_file(&tmp);
            // Another writer may have produced the same object meanwhile.
            if dest.is_file() {
                return Ok(());
            }
        }
        result
    }
}

impl ObjectStore for LooseObjectStore {
    fn hash_algo(&self) -> HashAlgorithm {
        self.hash_algo
    }

    fn write_raw(&self, kind: ObjectType, content: &[u8]) -> Result<ObjectId, OdbError> {
        let oid = hash_object(self.hash_algo, kind, content)?;
        let dest = self.object_path(&oid);
        if dest.is_file() {
            return Ok(oid);
        }

        let header = format!("{} {}\0", kind, content.len());
        self.write_compressed(header.as_bytes(), content, &dest)?;
        trace!(%oid, %kind, len = content.len(), "wrote loose object");
        Ok(oid)
    }

    fn read_raw(&self, oid: &ObjectId) -> Result<Option<(ObjectType, Vec<u8>)>, OdbError> {
        let compressed = match fs::read(self.object_path(oid)) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let corrupt = |reason: String| OdbError::Corrupt {
            oid: oid.to_hex(),
            reason,
        };

        let mut raw = Vec::new();
        ZlibDecoder::new(&compressed[..])
            .read_to_end(&mut raw)
            .map_err(|e| corrupt(format!("zlib: {e}")))?;

        let nul = raw
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| corrupt("missing header terminator".into()))?;
        let header = &raw[..nul];
        let space = header
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| corrupt("malformed header".into()))?;
        let kind = ObjectType::from_bytes(&header[..space])
            .ok_or_else(|| corrupt("unsupported object type".into()))?;
        let size: usize = std::str::from_utf8(&header[space + 1..])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| corrupt("invalid size".into()))?;

        let content = raw.split_off(nul + 1);
        if content.len() != size {
            return Err(corrupt(format!(
                "size mismatch: header says {size}, found {}",
                content.len()
            )));
        }
        Ok(Some((kind, content)))
    }

    fn contains(&self, oid: &ObjectId) -> Result<bool, OdbError> {
        Ok(self.object_path(oid).is_file())
    }
}
