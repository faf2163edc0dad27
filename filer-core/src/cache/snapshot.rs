//! `src/cache/snapshot.rs`
//! ============================================================================
//! # `DirectorySnapshot`: Cached State of One Directory
//!
//! One instance per canonical path, shared by every view showing that path.
//! Only the `DirectoryCache` mutates it; views get read guards through a
//! `SnapshotHandle` and never a mutable reference.

use std::{
    ffi::{OsStr, OsString},
    path::PathBuf,
    sync::Arc,
    time::SystemTime,
};

use ahash::{AHashSet, RandomState};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use tracing::debug;

use crate::{
    cache::{
        diff::DirDiff,
        directory_cache::CacheStats,
        events::{DirEvent, Subscriber, SubscriptionId},
    },
    fs::entry::DirectoryEntry,
};

/// Entries keyed by raw name, iterated in insertion order.
pub type EntryMap = IndexMap<OsString, Arc<DirectoryEntry>, RandomState>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
    Error,
}

#[derive(Debug)]
pub struct DirectorySnapshot {
    path: Arc<PathBuf>,
    entries: EntryMap,
    scan_state: ScanState,
    last_scan_time: Option<DateTime<Utc>>,
    dir_mtime: Option<SystemTime>,
}

impl DirectorySnapshot {
    /// Empty snapshot awaiting its first scan.
    #[must_use]
    pub fn new(path: Arc<PathBuf>) -> Self {
        Self {
            path,
            entries: EntryMap::default(),
            scan_state: ScanState::Scanning,
            last_scan_time: None,
            dir_mtime: None,
        }
    }

    #[must_use]
    pub const fn path(&self) -> &Arc<PathBuf> {
        &self.path
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, name: impl AsRef<OsStr>) -> Option<&Arc<DirectoryEntry>> {
        self.entries.get(name.as_ref())
    }

    pub fn entries(&self) -> impl Iterator<Item = &Arc<DirectoryEntry>> {
        self.entries.values()
    }

    #[must_use]
    pub const fn entry_map(&self) -> &EntryMap {
        &self.entries
    }

    #[must_use]
    pub const fn scan_state(&self) -> ScanState {
        self.scan_state
    }

    #[must_use]
    pub const fn last_scan_time(&self) -> Option<DateTime<Utc>> {
        self.last_scan_time
    }

    #[must_use]
    pub const fn dir_mtime(&self) -> Option<SystemTime> {
        self.dir_mtime
    }

    pub(crate) const fn set_scan_state(&mut self, state: ScanState) {
        self.scan_state = state;
    }

    /// Bring the entry set in line with a freshly computed diff.
    pub fn apply(&mut self, diff: &DirDiff) {
        if !diff.removed.is_empty() {
            let gone: AHashSet<&OsStr> = diff.removed.iter().map(|e| e.name()).collect();
            self.entries.retain(|name, _| !gone.contains(name.as_os_str()));
        }

        for entry in &diff.updated {
            if let Some(slot) = self.entries.get_mut(entry.name()) {
                *slot = Arc::clone(entry);
            }
        }

        for entry in &diff.added {
            self.entries
                .insert(entry.name().to_os_string(), Arc::clone(entry));
        }
    }

    pub(crate) fn mark_scanned(&mut self, dir_mtime: Option<SystemTime>) {
        self.scan_state = ScanState::Idle;
        self.last_scan_time = Some(Utc::now());
        self.dir_mtime = dir_mtime;
    }
}

/// In-flight bookkeeping; rescans of one path never overlap.
#[derive(Debug, Default)]
pub(crate) struct ScanControl {
    pub(crate) in_flight: bool,
    pub(crate) queued: bool,
}

/// Interior shared between the cache and every handle.
#[derive(Debug)]
pub(crate) struct SnapshotShared {
    pub(crate) snapshot: RwLock<DirectorySnapshot>,
    pub(crate) subscribers: Mutex<Vec<Subscriber>>,
    pub(crate) scan: Mutex<ScanControl>,
    stats: Arc<CacheStats>,
}

impl SnapshotShared {
    pub(crate) fn new(path: Arc<PathBuf>, stats: Arc<CacheStats>) -> Self {
        Self {
            snapshot: RwLock::new(DirectorySnapshot::new(path)),
            subscribers: Mutex::new(Vec::new()),
            scan: Mutex::new(ScanControl::default()),
            stats,
        }
    }

    /// Send to every live subscriber, pruning the ones that went away.
    pub(crate) fn broadcast(&self, event: &DirEvent) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|s| s.deliver(event.clone()));
        subscribers.len()
    }

    pub(crate) fn remove_subscriber(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|s| s.id() != id);
        subscribers.len() != before
    }
}

impl Drop for SnapshotShared {
    fn drop(&mut self) {
        self.stats.record_destroyed();
        debug!(
            marker = "CACHE_OPERATION",
            operation_type = "snapshot_destroyed",
            path = %self.snapshot.get_mut().path().display(),
            "Snapshot destroyed"
        );
    }
}

/// Counted reference to a cached snapshot, obtained from
/// `DirectoryCache::lookup` and given back with `DirectoryCache::release`.
#[derive(Debug)]
pub struct SnapshotHandle {
    pub(crate) shared: Arc<SnapshotShared>,
}

impl SnapshotHandle {
    pub(crate) const fn new(shared: Arc<SnapshotShared>) -> Self {
        Self { shared }
    }

    #[must_use]
    pub fn path(&self) -> Arc<PathBuf> {
        Arc::clone(self.shared.snapshot.read().path())
    }

    /// Shared read access; held guards block the cache from applying scans.
    #[must_use]
    pub fn read(&self) -> RwLockReadGuard<'_, DirectorySnapshot> {
        self.shared.snapshot.read()
    }

    #[must_use]
    pub fn scan_state(&self) -> ScanState {
        self.shared.snapshot.read().scan_state()
    }

    /// Both handles refer to the same snapshot instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}
