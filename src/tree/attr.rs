//! Synthesized attributes for store entries
//!
//! Objects carry no filesystem metadata, so type and permissions are fixed
//! by kind and only the size comes from the store.

use crate::tree::EntryKind;

/// Directory mode (r-xr-xr-x)
pub const DIR_MODE: u16 = 0o555;
/// File mode (r--r--r--)
pub const FILE_MODE: u16 = 0o444;

/// Filesystem metadata for a resolved node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attributes {
    pub kind: EntryKind,
    /// POSIX permission bits
    pub perm: u16,
    pub size: u64,
}

impl Attributes {
    pub fn directory() -> Self {
        Self {
            kind: EntryKind::Directory,
            perm: DIR_MODE,
            size: 0,
        }
    }

    /// `size` is the content length the store reported at resolution time
    pub fn file(size: u64) -> Self {
        Self {
            kind: EntryKind::File,
            perm: FILE_MODE,
            size,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, EntryKind::Directory)
    }

    pub fn nlink(&self) -> u32 {
        if self.is_dir() {
            2
        } else {
            1
        }
    }
}
