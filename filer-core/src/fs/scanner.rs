//! ``src/fs/scanner.rs``
//!
//! # `Directory Scanner`: Asynchronous Filesystem Listing
//!
//! Reads one directory into a `DirectoryListing`. The scanner does no
//! filtering or sorting: the snapshot keeps every entry and each view
//! decides what to show.

use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant, SystemTime},
};

use tokio::fs::{self, DirEntry, ReadDir};
use tracing::{debug, info, instrument};

use crate::{
    error::{FilerError, FilerResult},
    fs::entry::DirectoryEntry,
};

/// Result of one completed directory read.
#[derive(Debug, Clone)]
pub struct DirectoryListing {
    /// Entries in the order the OS returned them.
    pub entries: Vec<DirectoryEntry>,

    /// Modification time of the directory itself at scan time.
    pub modified: Option<SystemTime>,
}

/// Cheap existence check used by cache lookups: one `stat`, no read.
pub fn check_directory(path: &Path) -> FilerResult<()> {
    let meta = std::fs::metadata(path).map_err(|e| FilerError::from_io(path, e))?;

    if meta.is_dir() {
        Ok(())
    } else {
        Err(FilerError::directory_unavailable(path, "not a directory"))
    }
}

/// Current mtime of a directory, if it can be read.
#[must_use]
pub fn directory_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Scans the given directory asynchronously.
///
/// Entries that vanish between `readdir` and `stat` are skipped; failing to
/// open the directory itself is reported as `PathNotFound` /
/// `PermissionDenied`. A read that fails part way returns the error, never
/// a partial listing.
#[instrument(level = "debug", fields(path = %path.display()))]
pub async fn scan_directory(path: &Path) -> FilerResult<DirectoryListing> {
    let start_time: Instant = Instant::now();

    let dir_meta = fs::metadata(path)
        .await
        .map_err(|e| FilerError::from_io(path, e))?;

    if !dir_meta.is_dir() {
        return Err(FilerError::path_not_found(path));
    }

    let mut read_dir: ReadDir = fs::read_dir(path)
        .await
        .map_err(|e| FilerError::from_io(path, e))?;

    let mut entries: Vec<DirectoryEntry> = Vec::new();

    loop {
        let entry: DirEntry = match read_dir.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                debug!("Directory read of {:?} stopped early: {}", path, e);
                return Err(FilerError::from_io(path, e));
            }
        };

        let entry_path: PathBuf = entry.path();

        match DirectoryEntry::from_path(&entry_path).await {
            Ok(parsed) => entries.push(parsed),

            Err(e) => {
                // Log the error but continue processing other entries
                debug!("Failed to stat {:?}: {}", entry_path, e);
            }
        }
    }

    let duration: Duration = start_time.elapsed();

    info!(
        marker = "DIR_SCAN",
        operation_type = "scan_directory",
        entry_count = entries.len(),
        duration_us = duration.as_micros() as u64,
        "Directory scan completed in {:?}",
        duration
    );

    Ok(DirectoryListing {
        entries,
        modified: dir_meta.modified().ok(),
    })
}
