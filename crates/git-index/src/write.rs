//! Index file writing.

use git_hash::hasher::Hasher;

use crate::entry::IndexEntry;
use crate::read::{
    ondisk_entry_size, EXT_INTENT_TO_ADD, EXT_SKIP_WORKTREE, FLAG_ASSUME_VALID, FLAG_EXTENDED, INDEX_SIGNATURE,
    NAME_MASK, STAGE_SHIFT,
};
use crate::store::IndexStore;
use crate::IndexError;

/// On-disk version to emit.
///
/// Version 4 is never written. Extended flags need version 3; otherwise the
/// store's own version decides between 2 and 3.
pub(crate) fn output_version(store: &IndexStore) -> u32 {
    let extended = store.entries.iter().any(|e| e.flags().has_extended());
    if extended {
        3
    } else {
        store.version.clamp(2, 3)
    }
}

/// Serialize the store to bytes, checksum included.
pub(crate) fn serialize_store(store: &IndexStore) -> Result<Vec<u8>, IndexError> {
    let hash_len = store.hash_algo.digest_len();
    let version = output_version(store);
    let count = u32::try_from(store.entries.len())
        .map_err(|_| IndexError::InvalidEntry("too many entries for the index format".into()))?;

    let mut buf = Vec::with_capacity(12 + store.entries.len() * 80 + hash_len);
    buf.extend_from_slice(INDEX_SIGNATURE);
    buf.extend_from_slice(&version.to_be_bytes());
    buf.extend_from_slice(&count.to_be_bytes());

    for entry in &store.entries {
        if entry.oid().algorithm() != store.hash_algo {
            return Err(IndexError::InvalidEntry(format!(
                "'{}' is named with {}, index uses {}",
                entry.path(),
                entry.oid().algorithm(),
                store.hash_algo
            )));
        }
        write_entry(&mut buf, entry, hash_len);
    }

    for ext in &store.extensions {
        let len = u32::try_from(ext.data.len())
            .map_err(|_| IndexError::InvalidEntry("extension too large".into()))?;
        buf.extend_from_slice(&ext.signature);
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(&ext.data);
    }

    let checksum = Hasher::digest(store.hash_algo, &buf)?;
    buf.extend_from_slice(checksum.as_bytes());
    Ok(buf)
}

fn write_entry(buf: &mut Vec<u8>, entry: &IndexEntry, hash_len: usize) {
    let start = buf.len();
    let stat = entry.stat();
    let flags = entry.flags();
    let extended = flags.has_extended();

    for field in [
        stat.ctime_secs,
        stat.ctime_nsecs,
        stat.mtime_secs,
        stat.mtime_nsecs,
        stat.dev,
        stat.ino,
        entry.mode().raw(),
        stat.uid,
        stat.gid,
        stat.size,
    ] {
        buf.extend_from_slice(&field.to_be_bytes());
    }
    buf.extend_from_slice(entry.oid().as_bytes());

    let path = entry.path();
    let mut word = path.len().min(NAME_MASK as usize) as u16;
    word |= u16::from(entry.stage().as_u8()) << STAGE_SHIFT;
    if flags.assume_valid {
        word |= FLAG_ASSUME_VALID;
    }
    if extended {
        word |= FLAG_EXTENDED;
    }
    buf.extend_from_slice(&word.to_be_bytes());

    if extended {
        let mut ext = 0u16;
        if flags.skip_worktree {
            ext |= EXT_SKIP_WORKTREE;
        }
        if flags.intent_to_add {
            ext |= EXT_INTENT_TO_ADD;
        }
        buf.extend_from_slice(&ext.to_be_bytes());
    }

    buf.extend_from_slice(path);
    buf.resize(start + ondisk_entry_size(hash_len, path.len(), extended), 0);
}
