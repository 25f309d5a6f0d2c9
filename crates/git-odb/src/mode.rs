use bstr::BString;

/// File modes that can appear in a tree or an index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileMode {
    /// Regular file (100644)
    Regular,
    /// Executable file (100755)
    Executable,
    /// Symbolic link (120000)
    Symlink,
    /// Submodule commit (160000)
    Gitlink,
    /// Subdirectory (040000). Never stored in an index entry.
    Tree,
}

impl FileMode {
    /// Exact match on the canonical numeric value.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0o100644 => Some(Self::Regular),
            0o100755 => Some(Self::Executable),
            0o120000 => Some(Self::Symlink),
            0o160000 => Some(Self::Gitlink),
            0o040000 => Some(Self::Tree),
            _ => None,
        }
    }

    /// Map a raw on-disk mode to the canonical one git would store.
    ///
    /// Regular files keep only the owner execute bit, so `100664` reads back
    /// as `Regular`. Directories and unknown file types yield `None`.
    pub fn canonicalize(raw: u32) -> Option<Self> {
        match raw & 0o170000 {
            0o100000 if raw & 0o100 != 0 => Some(Self::Executable),
            0o100000 => Some(Self::Regular),
            0o120000 => Some(Self::Symlink),
            0o160000 => Some(Self::Gitlink),
            _ => None,
        }
    }

    /// Parse the octal ASCII form found in tree objects.
    pub fn from_octal(s: &[u8]) -> Option<Self> {
        if s.is_empty() {
            return None;
        }
        let mut val: u32 = 0;
        for &b in s {
            if !(b'0'..=b'7').contains(&b) {
                return None;
            }
            val = val.checked_mul(8)?.checked_add(u32::from(b - b'0'))?;
        }
        Self::from_raw(val)
    }

    /// Octal ASCII as written in tree objects (no leading zero for trees).
    pub fn as_octal(&self) -> BString {
        BString::from(format!("{:o}", self.raw()))
    }

    pub fn raw(&self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Gitlink => 0o160000,
            Self::Tree => 0o040000,
        }
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, Self::Tree)
    }

    pub fn is_blob(&self) -> bool {
        matches!(self, Self::Regular | Self::Executable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn octal_roundtrip() {
        for mode in [
            FileMode::Regular,
            FileMode::Executable,
            FileMode::Symlink,
            FileMode::Gitlink,
            FileMode::Tree,
        ] {
            assert_eq!(FileMode::from_octal(&mode.as_octal()), Some(mode));
        }
        assert_eq!(FileMode::Tree.as_octal(), "40000");
    }

    #[test]
    fn canonicalize_group_writable() {
        assert_eq!(FileMode::canonicalize(0o100664), Some(FileMode::Regular));
        assert_eq!(FileMode::canonicalize(0o100775), Some(FileMode::Executable));
        assert_eq!(FileMode::canonicalize(0o120777), Some(FileMode::Symlink));
        assert_eq!(FileMode::canonicalize(0o040000), None);
        assert_eq!(FileMode::canonicalize(0), None);
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(FileMode::from_octal(b"10064x"), None);
        assert_eq!(FileMode::from_octal(b""), None);
        assert_eq!(FileMode::from_raw(0o100600), None);
    }
}
