//! `src/cache/directory_cache.rs`
//! ============================================================================
//! # `DirectoryCache`: Shared, Reference-Counted Directory Snapshots
//!
//! Maps canonical paths to `DirectorySnapshot`s and keeps them in step with
//! the filesystem:
//! - `lookup` hands out counted handles, creating empty snapshots on demand
//! - `release` gives a handle back; the last release parks the snapshot in a
//!   bounded LRU for `release_grace` (zero grace destroys it immediately)
//! - `rescan` reads the directory on a tokio task; completions come back
//!   over a channel and are applied by `process_completions` / `settle`
//! - every applied scan is diffed and fanned out to subscribers in one
//!   uninterrupted pass
//!
//! The cache itself is owned by a single controlling task. Only directory
//! reads run elsewhere.

use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use ahash::AHashMap;
use lru::LruCache;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, instrument, trace, warn};

use crate::{
    cache::{
        diff::{self, DirDiff},
        events::{DirEvent, EntryBatch, Subscriber, Subscription, SubscriptionId},
        snapshot::{ScanState, SnapshotHandle, SnapshotShared},
    },
    config::CacheConfig,
    error::FilerResult,
    fs::{
        paths,
        scanner::{self, DirectoryListing},
    },
};

/// Cache statistics for monitoring and debugging
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    scans: AtomicU64,
    scan_failures: AtomicU64,
    coalesced: AtomicU64,
    evictions: AtomicU64,
    destroyed: AtomicU64,
}

impl CacheStats {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scan(&self, success: bool) {
        self.scans.fetch_add(1, Ordering::Relaxed);

        if !success {
            self.scan_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_destroyed(&self) {
        self.destroyed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            scans: self.scans.load(Ordering::Relaxed),
            scan_failures: self.scan_failures.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub scans: u64,
    pub scan_failures: u64,
    pub coalesced: u64,
    pub evictions: u64,
    pub destroyed: u64,
}

impl CacheStatsSnapshot {
    #[expect(clippy::cast_precision_loss, reason = "Expected precision loss")]
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// What `rescan` did with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescanOutcome {
    /// A directory read was started.
    Started,
    /// A read was already running; one more will follow it.
    Coalesced,
    /// Directory mtime unchanged since the last scan.
    Unchanged,
    /// Nothing cached for that path.
    NotCached,
}

/// Finished directory read on its way back to the controlling task.
#[derive(Debug)]
pub struct ScanCompletion {
    path: Arc<PathBuf>,
    result: FilerResult<DirectoryListing>,
}

impl ScanCompletion {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Zero-reference snapshot kept around for a quick return.
struct Retained {
    shared: Arc<SnapshotShared>,
    released_at: Instant,
}

pub struct DirectoryCache {
    config: CacheConfig,
    live: AHashMap<Arc<PathBuf>, Weak<SnapshotShared>>,
    retained: LruCache<Arc<PathBuf>, Retained>,
    stats: Arc<CacheStats>,
    completion_tx: UnboundedSender<ScanCompletion>,
    completion_rx: UnboundedReceiver<ScanCompletion>,
    in_flight: usize,
}

impl DirectoryCache {
    #[must_use]
    pub fn with_config(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_retained).unwrap_or(NonZeroUsize::MIN);
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        Self {
            config,
            live: AHashMap::new(),
            retained: LruCache::new(capacity),
            stats: Arc::new(CacheStats::default()),
            completion_tx,
            completion_rx,
            in_flight: 0,
        }
    }

    #[must_use]
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    #[must_use]
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of directory reads not yet applied.
    #[must_use]
    pub const fn scans_in_flight(&self) -> usize {
        self.in_flight
    }

    fn retention_enabled(&self) -> bool {
        self.config.max_retained > 0 && !self.config.release_grace.is_zero()
    }

    fn find_live(&self, key: &PathBuf) -> Option<Arc<SnapshotShared>> {
        self.live.get(key).and_then(Weak::upgrade)
    }

    // ────────────────────────────────────────────────────────────
    // Lookup / release
    // ────────────────────────────────────────────────────────────

    /// Counted handle for `path`, creating an empty snapshot (state
    /// `Scanning`) when none is cached. Costs one `stat`; the directory
    /// itself is only read by `rescan`.
    #[instrument(level = "debug", skip(self), fields(path = %path.display()))]
    pub fn lookup(&mut self, path: &Path) -> FilerResult<SnapshotHandle> {
        let key = paths::canonical_path(path)?;
        scanner::check_directory(&key)?;

        self.purge_expired();

        if let Some(retained) = self.retained.pop(&key) {
            self.stats.record_hit();
            trace!(
                marker = "CACHE_OPERATION",
                operation_type = "revive",
                "Reusing released snapshot"
            );
            return Ok(SnapshotHandle::new(retained.shared));
        }

        if let Some(shared) = self.find_live(&key) {
            self.stats.record_hit();
            return Ok(SnapshotHandle::new(shared));
        }

        self.stats.record_miss();

        let key = Arc::new(key);
        let shared = Arc::new(SnapshotShared::new(Arc::clone(&key), Arc::clone(&self.stats)));
        self.live.insert(key, Arc::downgrade(&shared));

        debug!(
            marker = "CACHE_OPERATION",
            operation_type = "snapshot_created",
            "Created empty snapshot"
        );

        Ok(SnapshotHandle::new(shared))
    }

    /// Give a handle back. The snapshot survives while other handles exist.
    pub fn release(&mut self, handle: SnapshotHandle) {
        let last = Arc::strong_count(&handle.shared) == 1;
        let path = handle.path();

        if !last {
            return;
        }

        let dead_path = handle.shared.snapshot.read().scan_state() == ScanState::Error;

        if self.retention_enabled() && !dead_path {
            let retained = Retained {
                shared: handle.shared,
                released_at: Instant::now(),
            };

            if let Some((evicted, stale)) = self.retained.push(Arc::clone(&path), retained) {
                drop(stale);

                if evicted != path {
                    self.stats.record_eviction();
                    self.forget_if_dead(&evicted);
                }
            }

            trace!(
                marker = "CACHE_OPERATION",
                operation_type = "retain",
                path = %path.display(),
                "Snapshot released; retained for reuse"
            );
        } else {
            drop(handle);
            self.forget_if_dead(&path);
        }
    }

    /// Whether a snapshot for `path` is still alive (referenced or retained).
    #[must_use]
    pub fn is_cached(&self, path: &Path) -> bool {
        paths::canonical_path(path).is_ok_and(|key| self.find_live(&key).is_some())
    }

    /// Outstanding handles for `path`, not counting the retention slot.
    #[must_use]
    pub fn reference_count(&self, path: &Path) -> usize {
        let Ok(key) = paths::canonical_path(path) else {
            return 0;
        };

        self.live.get(&key).map_or(0, |weak| {
            let retained = usize::from(self.retained.contains(&key));
            weak.strong_count().saturating_sub(retained)
        })
    }

    /// Drop retained snapshots whose grace period ran out.
    pub fn purge_expired(&mut self) {
        let grace: Duration = self.config.release_grace;

        let expired: Vec<Arc<PathBuf>> = self
            .retained
            .iter()
            .filter(|(_, r)| r.released_at.elapsed() >= grace)
            .map(|(path, _)| Arc::clone(path))
            .collect();

        for path in expired {
            self.retained.pop(&path);
            self.stats.record_eviction();
            self.forget_if_dead(&path);
        }
    }

    fn forget_if_dead(&mut self, path: &PathBuf) {
        if self.live.get(path).is_some_and(|w| w.strong_count() == 0) {
            self.live.remove(path);
        }
    }

    // ────────────────────────────────────────────────────────────
    // Subscriptions
    // ────────────────────────────────────────────────────────────

    /// Start receiving events for `handle`. The new subscriber is primed with
    /// everything already known: one `Added` batch and, if a read is running,
    /// `ScanStarted`.
    pub fn subscribe(&self, handle: &SnapshotHandle) -> Subscription {
        let shared = &handle.shared;
        let snapshot = shared.snapshot.read();
        let (subscriber, subscription) = Subscriber::pair(Arc::clone(snapshot.path()));

        if !snapshot.is_empty() {
            let batch: EntryBatch = snapshot.entries().cloned().collect();
            subscriber.deliver(DirEvent::Added(batch));
        }

        if shared.scan.lock().in_flight {
            subscriber.deliver(DirEvent::ScanStarted);
        }

        drop(snapshot);
        shared.subscribers.lock().push(subscriber);

        subscription
    }

    pub fn unsubscribe(&self, handle: &SnapshotHandle, id: SubscriptionId) -> bool {
        handle.shared.remove_subscriber(id)
    }

    // ────────────────────────────────────────────────────────────
    // Rescans
    // ────────────────────────────────────────────────────────────

    /// Re-read `path` now. A second request while one is running is queued
    /// behind it rather than run in parallel. Must be called from inside a
    /// tokio runtime.
    #[instrument(level = "debug", skip(self), fields(path = %path.display()))]
    pub fn rescan(&mut self, path: &Path) -> RescanOutcome {
        let Ok(key) = paths::canonical_path(path) else {
            return RescanOutcome::NotCached;
        };

        let Some(shared) = self.find_live(&key) else {
            return RescanOutcome::NotCached;
        };

        {
            let mut control = shared.scan.lock();

            if control.in_flight {
                control.queued = true;
                self.stats.record_coalesced();
                trace!(marker = "DIR_SCAN", "Rescan coalesced with running scan");
                return RescanOutcome::Coalesced;
            }

            control.in_flight = true;
        }

        shared.snapshot.write().set_scan_state(ScanState::Scanning);
        shared.broadcast(&DirEvent::ScanStarted);

        let path = Arc::clone(shared.snapshot.read().path());
        let tx = self.completion_tx.clone();
        self.in_flight += 1;

        tokio::spawn(async move {
            let result = scanner::scan_directory(&path).await;

            // The receiver lives as long as the cache.
            let _ = tx.send(ScanCompletion { path, result });
        });

        RescanOutcome::Started
    }

    /// Rescan only when the directory's mtime moved since the last read.
    pub fn refresh_if_changed(&mut self, path: &Path) -> RescanOutcome {
        let Ok(key) = paths::canonical_path(path) else {
            return RescanOutcome::NotCached;
        };

        let Some(shared) = self.find_live(&key) else {
            return RescanOutcome::NotCached;
        };

        let recorded = shared.snapshot.read().dir_mtime();
        drop(shared);

        match (recorded, scanner::directory_mtime(&key)) {
            (Some(then), Some(now)) if then == now => RescanOutcome::Unchanged,
            _ => self.rescan(&key),
        }
    }

    /// Apply every completion that has already arrived.
    pub fn process_completions(&mut self) -> usize {
        let mut applied = 0;

        while let Ok(completion) = self.completion_rx.try_recv() {
            self.apply_completion(completion);
            applied += 1;
        }

        applied
    }

    /// Wait for the next finished read. Pending forever when none is running,
    /// which suits a `tokio::select!` arm.
    pub async fn recv_completion(&mut self) -> Option<ScanCompletion> {
        self.completion_rx.recv().await
    }

    /// Wait until no read is outstanding, applying completions as they land.
    pub async fn settle(&mut self) {
        while self.in_flight > 0 {
            match self.completion_rx.recv().await {
                Some(completion) => self.apply_completion(completion),
                None => break,
            }
        }
    }

    /// Diff a finished read against its snapshot and notify subscribers.
    /// Runs to completion without yielding, so every subscriber sees the
    /// same ordered sequence.
    #[instrument(level = "debug", skip_all, fields(path = %completion.path.display()))]
    pub fn apply_completion(&mut self, completion: ScanCompletion) {
        self.in_flight = self.in_flight.saturating_sub(1);

        let ScanCompletion { path, result } = completion;

        let Some(shared) = self.find_live(&path) else {
            debug!(marker = "DIR_SCAN", "Snapshot gone before scan completed; dropping result");
            return;
        };

        let queued = {
            let mut control = shared.scan.lock();
            control.in_flight = false;
            std::mem::take(&mut control.queued)
        };

        match result {
            Ok(listing) => {
                self.stats.record_scan(true);

                let changes: DirDiff = {
                    let mut snapshot = shared.snapshot.write();
                    let changes = diff::diff(snapshot.entry_map(), listing.entries);
                    snapshot.apply(&changes);
                    snapshot.mark_scanned(listing.modified);
                    changes
                };

                info!(
                    marker = "DIR_DIFF",
                    added = changes.added.len(),
                    removed = changes.removed.len(),
                    updated = changes.updated.len(),
                    "Scan applied"
                );

                let DirDiff {
                    added,
                    removed,
                    updated,
                } = changes;

                if !removed.is_empty() {
                    shared.broadcast(&DirEvent::Removed(removed.into()));
                }
                if !added.is_empty() {
                    shared.broadcast(&DirEvent::Added(added.into()));
                }
                if !updated.is_empty() {
                    shared.broadcast(&DirEvent::Updated(updated.into()));
                }
                shared.broadcast(&DirEvent::ScanEnded);

                if queued {
                    self.rescan(&path);
                }
            }

            Err(err) if !err.is_terminal() => {
                self.stats.record_scan(false);

                warn!(
                    marker = "DIR_SCAN",
                    operation_type = err.operation_type(),
                    error = %err,
                    "Directory read incomplete; keeping previous entries"
                );

                // The old dir mtime stays, so the next refresh reads again.
                shared.snapshot.write().set_scan_state(ScanState::Idle);
                shared.broadcast(&DirEvent::ScanEnded);

                if queued {
                    self.rescan(&path);
                }
            }

            Err(err) => {
                self.stats.record_scan(false);

                warn!(
                    marker = "DIR_SCAN",
                    operation_type = err.operation_type(),
                    error = %err,
                    "Directory scan failed"
                );

                shared.snapshot.write().set_scan_state(ScanState::Error);
                shared.broadcast(&DirEvent::Error(err));

                // A vanished directory stays gone; the next lookup starts over.
                self.retained.pop(&path);
                self.live.remove(&path);
            }
        }
    }
}

impl Default for DirectoryCache {
    fn default() -> Self {
        Self::new()
    }
}
