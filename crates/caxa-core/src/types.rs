//! Archive entry model.

use std::path::PathBuf;

/// Type of entry in an archive.
///
/// # Examples
///
/// ```
/// use caxa_core::types::EntryType;
/// use std::path::PathBuf;
///
/// let symlink = EntryType::Symlink {
///     target: PathBuf::from("payload/v1"),
/// };
/// assert!(!symlink.is_directory());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntryType {
    /// Regular file entry.
    File,

    /// Directory entry.
    Directory,

    /// Symbolic link entry.
    ///
    /// The target is stored as-is and is not checked for escape.
    Symlink {
        /// The symlink target path.
        target: PathBuf,
    },
}

impl EntryType {
    /// Returns `true` if this is a directory.
    #[must_use]
    pub const fn is_directory(&self) -> bool {
        matches!(self, Self::Directory)
    }
}

/// One decoded archive record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarEntry {
    /// Validated path relative to the destination directory.
    pub path: PathBuf,

    /// Record type.
    pub entry_type: EntryType,

    /// Permission bits (`0o777` mask applied).
    pub mode: u32,

    /// Declared content size in bytes.
    pub size: u64,

    /// Modification time in seconds since the Unix epoch.
    pub mtime: Option<u64>,
}
