//! `src/fs/entry.rs`
//! ============================================================
//! One parsed directory entry as stored in a snapshot.
//!
//! Entries are immutable once built. A changed file produces a brand
//! new `DirectoryEntry` that replaces the old one wholesale, so views
//! can hold `Arc<DirectoryEntry>` without ever seeing a half-updated
//! value.

use std::{
    ffi::{OsStr, OsString},
    fmt,
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use bitflags::bitflags;
use compact_str::CompactString;
use tokio::fs as tokio_fs;

use crate::error::{FilerError, FilerResult};

/// Marker file that turns a directory into an application directory.
pub const APP_RUN: &str = "AppRun";

// ------------------------------------------------------------
// LinkTarget / BaseType
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkTarget {
    File,
    Directory,
    Broken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    File,
    Directory,
    Symlink(LinkTarget),
    Unknown,
}

impl BaseType {
    /// Directories and links that resolve to one.
    #[inline]
    #[must_use]
    pub const fn is_dir(self) -> bool {
        matches!(self, Self::Directory | Self::Symlink(LinkTarget::Directory))
    }

    /// Ordering key used by the type sort.
    #[inline]
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Directory => 0,
            Self::Symlink(LinkTarget::Directory) => 1,
            Self::File => 2,
            Self::Symlink(LinkTarget::File) => 3,
            Self::Symlink(LinkTarget::Broken) => 4,
            Self::Unknown => 5,
        }
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "File"),
            Self::Directory => write!(f, "Dir"),
            Self::Symlink(LinkTarget::File) => write!(f, "Link→File"),
            Self::Symlink(LinkTarget::Directory) => write!(f, "Link→Dir"),
            Self::Symlink(LinkTarget::Broken) => write!(f, "Link (broken)"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EntryFlags: u8 {
        /// Directory containing an `AppRun` file.
        const APP_DIR    = 1 << 0;
        /// The entry itself is a symbolic link.
        const SYMLINK    = 1 << 1;
        /// Regular file with any execute bit set.
        const EXECUTABLE = 1 << 2;
    }
}

// ------------------------------------------------------------
// EntryMetadata
// ------------------------------------------------------------

/// Size, mtime and permission bits. Compared as a whole to detect updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMetadata {
    pub size: u64,
    pub modified: SystemTime,
    pub mode: u32,
}

impl Default for EntryMetadata {
    fn default() -> Self {
        Self {
            size: 0,
            modified: UNIX_EPOCH,
            mode: 0,
        }
    }
}

impl EntryMetadata {
    fn from_std(meta: &std::fs::Metadata) -> Self {
        Self {
            size: if meta.is_dir() { 0 } else { meta.len() },
            modified: meta.modified().unwrap_or(UNIX_EPOCH),
            mode: permission_bits(meta),
        }
    }
}

#[cfg(unix)]
fn permission_bits(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;

    meta.permissions().mode()
}

#[cfg(not(unix))]
fn permission_bits(meta: &std::fs::Metadata) -> u32 {
    if meta.permissions().readonly() { 0o444 } else { 0o644 }
}

// ------------------------------------------------------------
// DirectoryEntry
// ------------------------------------------------------------

/// `name` is the entry's identity within its directory and is kept
/// byte-exact; `leafname` is its display form and may be lossy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    name: OsString,
    leafname: CompactString,
    base_type: BaseType,
    flags: EntryFlags,
    metadata: EntryMetadata,
}

impl DirectoryEntry {
    #[must_use]
    pub fn new(
        leafname: impl Into<CompactString>,
        base_type: BaseType,
        flags: EntryFlags,
        metadata: EntryMetadata,
    ) -> Self {
        let leafname: CompactString = leafname.into();

        Self {
            name: OsString::from(leafname.as_str()),
            leafname,
            base_type,
            flags,
            metadata,
        }
    }

    /// Entry for a name that need not be valid UTF-8.
    #[must_use]
    pub fn from_os_name(
        name: &OsStr,
        base_type: BaseType,
        flags: EntryFlags,
        metadata: EntryMetadata,
    ) -> Self {
        Self {
            name: name.to_os_string(),
            leafname: CompactString::new(name.to_string_lossy()),
            base_type,
            flags,
            metadata,
        }
    }

    /// Regular file with the given size and an epoch mtime.
    #[must_use]
    pub fn file(leafname: impl Into<CompactString>, size: u64) -> Self {
        Self::new(
            leafname,
            BaseType::File,
            EntryFlags::empty(),
            EntryMetadata {
                size,
                ..EntryMetadata::default()
            },
        )
    }

    #[must_use]
    pub fn directory(leafname: impl Into<CompactString>) -> Self {
        Self::new(
            leafname,
            BaseType::Directory,
            EntryFlags::empty(),
            EntryMetadata::default(),
        )
    }

    /// Copy of this entry with different metadata.
    #[must_use]
    pub fn with_metadata(&self, metadata: EntryMetadata) -> Self {
        Self {
            metadata,
            ..self.clone()
        }
    }

    /// Raw name as the directory returned it.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &OsStr {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn leafname(&self) -> &str {
        &self.leafname
    }

    #[inline]
    #[must_use]
    pub const fn base_type(&self) -> BaseType {
        self.base_type
    }

    #[inline]
    #[must_use]
    pub const fn flags(&self) -> EntryFlags {
        self.flags
    }

    #[inline]
    #[must_use]
    pub const fn metadata(&self) -> &EntryMetadata {
        &self.metadata
    }

    #[inline]
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.metadata.size
    }

    #[inline]
    #[must_use]
    pub const fn modified(&self) -> SystemTime {
        self.metadata.modified
    }

    #[inline]
    #[must_use]
    pub const fn is_dir(&self) -> bool {
        self.base_type.is_dir()
    }

    #[inline]
    #[must_use]
    pub const fn is_app_dir(&self) -> bool {
        self.flags.contains(EntryFlags::APP_DIR)
    }

    /// Leading dot marks a hidden entry.
    #[inline]
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.leafname.starts_with('.')
    }

    /// `.` and `..` are never shown.
    #[inline]
    #[must_use]
    pub fn is_self_or_parent(&self) -> bool {
        self.leafname == "." || self.leafname == ".."
    }

    /// Hidden-file rule applied by every view.
    #[must_use]
    pub fn visible_with(&self, show_hidden: bool) -> bool {
        if !self.is_hidden() {
            return true;
        }

        show_hidden && !self.is_self_or_parent()
    }

    /// Stat `path` (the entry `leafname` inside its parent) and build the entry.
    ///
    /// Symlinks are followed to classify their target; a dangling link is
    /// kept as `Symlink(Broken)` rather than failing.
    pub async fn from_path(path: &Path) -> FilerResult<Self> {
        let link_meta = tokio_fs::symlink_metadata(path)
            .await
            .map_err(|e| FilerError::from_io(path, e))?;

        let name = path.file_name().map(OsStr::to_os_string).unwrap_or_default();
        let leafname = CompactString::new(name.to_string_lossy());

        let mut flags = EntryFlags::empty();

        let (base_type, meta) = if link_meta.file_type().is_symlink() {
            flags |= EntryFlags::SYMLINK;

            match tokio_fs::metadata(path).await {
                Ok(target) if target.is_dir() => {
                    (BaseType::Symlink(LinkTarget::Directory), target)
                }
                Ok(target) => (BaseType::Symlink(LinkTarget::File), target),
                Err(_) => (BaseType::Symlink(LinkTarget::Broken), link_meta),
            }
        } else if link_meta.is_dir() {
            (BaseType::Directory, link_meta)
        } else if link_meta.is_file() {
            (BaseType::File, link_meta)
        } else {
            (BaseType::Unknown, link_meta)
        };

        let metadata = EntryMetadata::from_std(&meta);

        if base_type.is_dir() {
            if tokio_fs::try_exists(path.join(APP_RUN)).await.unwrap_or(false) {
                flags |= EntryFlags::APP_DIR;
            }
        } else if meta.is_file() && metadata.mode & 0o111 != 0 {
            flags |= EntryFlags::EXECUTABLE;
        }

        Ok(Self {
            name,
            leafname,
            base_type,
            flags,
            metadata,
        })
    }
}
