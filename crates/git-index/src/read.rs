//! Index file reading (v2/v3/v4).

use std::cmp::Ordering;

use bstr::{BString, ByteSlice};
use git_hash::hasher::Hasher;
use git_hash::{HashAlgorithm, ObjectId};
use git_odb::FileMode;
use tracing::trace;

use crate::entry::{validate_path, EntryFlags, IndexEntry, StatData};
use crate::store::{IndexStore, RawExtension};
use crate::{ParseError, Stage};

/// Magic bytes at the start of every index file.
pub(crate) const INDEX_SIGNATURE: &[u8; 4] = b"DIRC";

pub(crate) const HEADER_LEN: usize = 12;

/// ctime(8) + mtime(8) + dev(4) + ino(4) + mode(4) + uid(4) + gid(4) + size(4).
pub(crate) const STAT_LEN: usize = 40;

pub(crate) const FLAG_ASSUME_VALID: u16 = 0x8000;
pub(crate) const FLAG_EXTENDED: u16 = 0x4000;
pub(crate) const STAGE_MASK: u16 = 0x3000;
pub(crate) const STAGE_SHIFT: u16 = 12;
pub(crate) const NAME_MASK: u16 = 0x0FFF;

pub(crate) const EXT_SKIP_WORKTREE: u16 = 0x4000;
pub(crate) const EXT_INTENT_TO_ADD: u16 = 0x2000;
const EXT_KNOWN: u16 = EXT_SKIP_WORKTREE | EXT_INTENT_TO_ADD;

/// Extensions whose payload holds byte offsets into the file. They are
/// meaningless once the file is rewritten, so they are not kept.
const POSITIONAL_EXTENSIONS: [&[u8; 4]; 2] = [b"EOIE", b"IEOT"];

/// Size of a v2/v3 entry on disk, NUL padding included.
pub(crate) fn ondisk_entry_size(hash_len: usize, name_len: usize, extended: bool) -> usize {
    let flags_len = if extended { 4 } else { 2 };
    (STAT_LEN + hash_len + flags_len + name_len + 8) & !7
}

/// Parse a complete index file into a store. All or nothing.
pub(crate) fn parse_store(data: &[u8], hash_algo: HashAlgorithm) -> Result<IndexStore, ParseError> {
    let hash_len = hash_algo.digest_len();
    let reader = Reader { data };

    if data.len() < 4 {
        return Err(ParseError::Truncated { offset: data.len() });
    }
    if &data[..4] != INDEX_SIGNATURE {
        return Err(ParseError::InvalidHeader(format!(
            "bad signature {:?}, expected DIRC",
            data[..4].as_bstr()
        )));
    }
    let version = reader.u32_at(4)?;
    if !(2..=4).contains(&version) {
        return Err(ParseError::UnsupportedVersion(version));
    }
    let entry_count = reader.u32_at(8)? as usize;

    if data.len() < HEADER_LEN + hash_len {
        return Err(ParseError::Truncated { offset: data.len() });
    }
    let content_end = data.len() - hash_len;
    verify_checksum(&data[..content_end], &data[content_end..], hash_algo)?;

    let reader = Reader {
        data: &data[..content_end],
    };
    let mut cursor = HEADER_LEN;
    let mut entries: Vec<IndexEntry> = Vec::with_capacity(entry_count.min(content_end / 62));

    for _ in 0..entry_count {
        let start = cursor;
        let prev = entries.last();
        let entry = parse_entry(&reader, &mut cursor, version, hash_algo, prev.map(|e| e.path().as_bytes()))?;

        if let Some(prev) = prev {
            let order = prev
                .path()
                .as_bytes()
                .cmp(entry.path().as_bytes())
                .then(prev.stage().cmp(&entry.stage()));
            if order != Ordering::Less {
                return Err(ParseError::Unsorted { offset: start });
            }
            if prev.path() == entry.path() && prev.stage() == Stage::Normal {
                return Err(ParseError::InvalidEntry {
                    offset: start,
                    reason: format!("'{}' has stage 0 and conflict stages", entry.path()),
                });
            }
        }
        entries.push(entry);
    }

    let extensions = parse_extensions(&reader, cursor)?;

    trace!(version, entries = entries.len(), extensions = extensions.len(), "parsed index");
    Ok(IndexStore {
        version,
        hash_algo,
        entries,
        extensions,
    })
}

fn verify_checksum(content: &[u8], stored: &[u8], hash_algo: HashAlgorithm) -> Result<(), ParseError> {
    // index.skipHash writes an all-zero trailer.
    if stored.iter().all(|&b| b == 0) {
        return Ok(());
    }
    let computed = Hasher::digest(hash_algo, content).map_err(|_| ParseError::ChecksumMismatch)?;
    if computed.as_bytes() != stored {
        return Err(ParseError::ChecksumMismatch);
    }
    Ok(())
}

fn parse_entry(
    reader: &Reader<'_>,
    cursor: &mut usize,
    version: u32,
    hash_algo: HashAlgorithm,
    prev_path: Option<&[u8]>,
) -> Result<IndexEntry, ParseError> {
    let start = *cursor;
    let hash_len = hash_algo.digest_len();
    let invalid = |reason: String| ParseError::InvalidEntry {
        offset: start,
        reason,
    };

    let stat = StatData {
        ctime_secs: reader.u32_at(start)?,
        ctime_nsecs: reader.u32_at(start + 4)?,
        mtime_secs: reader.u32_at(start + 8)?,
        mtime_nsecs: reader.u32_at(start + 12)?,
        dev: reader.u32_at(start + 16)?,
        ino: reader.u32_at(start + 20)?,
        uid: reader.u32_at(start + 28)?,
        gid: reader.u32_at(start + 32)?,
        size: reader.u32_at(start + 36)?,
    };
    let raw_mode = reader.u32_at(start + 24)?;
    let mode = FileMode::canonicalize(raw_mode).ok_or_else(|| invalid(format!("invalid mode {raw_mode:o}")))?;

    let oid_at = start + STAT_LEN;
    let oid = ObjectId::from_bytes(reader.slice(oid_at, hash_len)?, hash_algo)
        .map_err(|e| invalid(e.to_string()))?;

    let flags_at = oid_at + hash_len;
    let flags = reader.u16_at(flags_at)?;
    let extended = flags & FLAG_EXTENDED != 0;
    let stage = Stage::from_u8(((flags & STAGE_MASK) >> STAGE_SHIFT) as u8).map_err(|e| invalid(e.to_string()))?;
    let name_field = (flags & NAME_MASK) as usize;

    let mut entry_flags = EntryFlags {
        assume_valid: flags & FLAG_ASSUME_VALID != 0,
        ..EntryFlags::default()
    };

    let mut name_at = flags_at + 2;
    if extended {
        if version < 3 {
            return Err(invalid("extended flags in a version 2 index".into()));
        }
        let ext = reader.u16_at(name_at)?;
        if ext & !EXT_KNOWN != 0 {
            return Err(invalid(format!("unknown extended flags {ext:#06x}")));
        }
        entry_flags.skip_worktree = ext & EXT_SKIP_WORKTREE != 0;
        entry_flags.intent_to_add = ext & EXT_INTENT_TO_ADD != 0;
        name_at += 2;
    }

    let path: BString = if version == 4 {
        let (strip, used) = reader.varint_at(name_at)?;
        let prev = prev_path.unwrap_or_default();
        if strip > prev.len() {
            return Err(invalid(format!(
                "prefix strip of {strip} exceeds previous path length {}",
                prev.len()
            )));
        }
        let suffix_at = name_at + used;
        let suffix = reader.nul_terminated(suffix_at)?;
        let mut path = BString::from(&prev[..prev.len() - strip]);
        path.extend_from_slice(suffix);
        *cursor = suffix_at + suffix.len() + 1;
        path
    } else {
        let name = reader.nul_terminated(name_at)?;
        let size = ondisk_entry_size(hash_len, name.len(), extended);
        // Padding must be present even when the path is the last thing in the file.
        reader.slice(start, size)?;
        *cursor = start + size;
        BString::from(name)
    };

    if name_field != path.len().min(NAME_MASK as usize) {
        return Err(invalid(format!(
            "name length field {name_field} does not match path length {}",
            path.len()
        )));
    }
    validate_path(&path).map_err(|e| invalid(e.to_string()))?;

    Ok(IndexEntry::from_parts(path, oid, mode, stage, stat, entry_flags))
}

fn parse_extensions(reader: &Reader<'_>, mut cursor: usize) -> Result<Vec<RawExtension>, ParseError> {
    let mut extensions = Vec::new();
    while cursor < reader.data.len() {
        let header = reader.slice(cursor, 8)?;
        let mut signature = [0u8; 4];
        signature.copy_from_slice(&header[..4]);
        let len = reader.u32_at(cursor + 4)? as usize;
        let sig = signature.as_bstr().to_string();

        let data = reader
            .slice(cursor + 8, len)
            .map_err(|_| ParseError::InvalidExtension {
                sig: sig.clone(),
                reason: format!("{len} bytes of data run past the end of the index"),
            })?;
        cursor += 8 + len;

        if POSITIONAL_EXTENSIONS.contains(&&signature) {
            trace!(%sig, "dropping positional extension");
            continue;
        }
        if !signature[0].is_ascii_uppercase() {
            return Err(ParseError::InvalidExtension {
                sig,
                reason: "required extension is not supported".into(),
            });
        }
        extensions.push(RawExtension {
            signature,
            data: data.to_vec(),
        });
    }
    Ok(extensions)
}

/// Bounds-checked big-endian access to index bytes.
struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn slice(&self, at: usize, len: usize) -> Result<&'a [u8], ParseError> {
        at.checked_add(len)
            .and_then(|end| self.data.get(at..end))
            .ok_or(ParseError::Truncated { offset: at })
    }

    fn u32_at(&self, at: usize) -> Result<u32, ParseError> {
        let b = self.slice(at, 4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u16_at(&self, at: usize) -> Result<u16, ParseError> {
        let b = self.slice(at, 2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn nul_terminated(&self, at: usize) -> Result<&'a [u8], ParseError> {
        let rest = self.data.get(at..).ok_or(ParseError::Truncated { offset: at })?;
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(ParseError::Truncated { offset: at })?;
        Ok(&rest[..nul])
    }

    /// Git's offset varint: each continuation adds one before shifting,
    /// so every value has exactly one encoding.
    fn varint_at(&self, at: usize) -> Result<(usize, usize), ParseError> {
        let overflow = || ParseError::InvalidEntry {
            offset: at,
            reason: "varint overflow".into(),
        };
        let mut used = 0;
        let mut byte = self.slice(at, 1)?[0];
        used += 1;
        let mut value = usize::from(byte & 0x7f);
        while byte & 0x80 != 0 {
            byte = self.slice(at + used, 1)?[0];
            used += 1;
            value = value
                .checked_add(1)
                .and_then(|v| v.checked_mul(128))
                .and_then(|v| v.checked_add(usize::from(byte & 0x7f)))
                .ok_or_else(overflow)?;
            if used > 10 {
                return Err(ParseError::InvalidEntry {
                    offset: at,
                    reason: "varint too long".into(),
                });
            }
        }
        Ok((value, used))
    }
}
