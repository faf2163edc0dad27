//! ``src/view/controller.rs``
//! ============================================================================
//! # `ViewController`: One Window's Live Presentation of a Directory
//!
//! A view subscribes to exactly one cached snapshot at a time and keeps its
//! own filtered, sorted item list in step with the snapshot's event stream.
//! Cursor, selection and the pending auto-select leafname are per view;
//! entries themselves are shared with the cache and never copied.
//!
//! Scan status follows `Idle -> Scanning -> Idle`, or ends in `Error` when
//! the directory disappears. Once attached, every rescan is bracketed by
//! `ScanStarted` / `ScanEnded`.

use std::{
    ffi::{OsStr, OsString},
    fmt,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use ahash::{AHashMap, AHashSet};
use compact_str::{CompactString, ToCompactString, format_compact};
use tracing::{debug, info, instrument, trace, warn};

use crate::{
    cache::{
        directory_cache::DirectoryCache,
        events::{DirEvent, EntryBatch, Subscription},
        snapshot::SnapshotHandle,
    },
    config::ViewOptions,
    error::{FilerError, FilerResult},
    fs::{entry::DirectoryEntry, paths},
    view::{
        activate::{self, OpenAction, OpenFlags},
        observer::{ItemsChanged, ViewObserver},
        sort,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(u64);

impl ViewId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);

        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "view-{}", self.0)
    }
}

/// Panels are docked views; they never count towards unique-window checks
/// and are never closed by a launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Window,
    Panel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Idle,
    Scanning,
    Error,
}

/// Direction for stepping through selected items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Outcome of re-validating the attached directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Revalidated {
    Same,
    Reattached,
    Gone,
}

#[derive(Debug, Clone)]
pub struct ViewItem {
    entry: Arc<DirectoryEntry>,
    selected: bool,
    dirty: bool,
}

impl ViewItem {
    const fn new(entry: Arc<DirectoryEntry>) -> Self {
        Self {
            entry,
            selected: false,
            dirty: true,
        }
    }

    #[must_use]
    pub fn entry(&self) -> &DirectoryEntry {
        &self.entry
    }

    #[must_use]
    pub fn leafname(&self) -> &str {
        self.entry.leafname()
    }

    #[must_use]
    pub fn name(&self) -> &OsStr {
        self.entry.name()
    }

    #[must_use]
    pub const fn is_selected(&self) -> bool {
        self.selected
    }

    /// Changed since the window layer last called `clear_dirty`.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }
}

pub struct ViewController {
    id: ViewId,
    kind: ViewKind,
    path: Option<Arc<PathBuf>>,
    options: ViewOptions,
    snapshot: Option<SnapshotHandle>,
    subscription: Option<Subscription>,
    items: Vec<ViewItem>,
    cursor: Option<usize>,
    /// A cursor existed before the current directory was attached.
    had_cursor: bool,
    auto_select: Option<OsString>,
    scan_status: ScanStatus,
    /// Widest visible leafname, in characters.
    name_width: usize,
    closed: bool,
    observer: Box<dyn ViewObserver>,
}

impl fmt::Debug for ViewController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewController")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("items", &self.items.len())
            .field("cursor", &self.cursor)
            .field("scan_status", &self.scan_status)
            .finish_non_exhaustive()
    }
}

impl ViewController {
    /// Detached view; point it somewhere with `navigate`.
    #[must_use]
    pub fn new(kind: ViewKind, options: ViewOptions, observer: Box<dyn ViewObserver>) -> Self {
        Self {
            id: ViewId::next(),
            kind,
            path: None,
            options,
            snapshot: None,
            subscription: None,
            items: Vec::new(),
            cursor: None,
            had_cursor: false,
            auto_select: None,
            scan_status: ScanStatus::Idle,
            name_width: 0,
            closed: false,
            observer,
        }
    }

    /// New view attached to `path`, with a rescan already requested.
    pub fn open(
        cache: &mut DirectoryCache,
        path: &Path,
        kind: ViewKind,
        options: ViewOptions,
        observer: Box<dyn ViewObserver>,
    ) -> FilerResult<Self> {
        let mut view = Self::new(kind, options, observer);
        view.navigate(cache, path, None)?;
        Ok(view)
    }

    // ────────────────────────────────────────────────────────────
    // Accessors
    // ────────────────────────────────────────────────────────────

    #[must_use]
    pub const fn id(&self) -> ViewId {
        self.id
    }

    #[must_use]
    pub const fn kind(&self) -> ViewKind {
        self.kind
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref().map(PathBuf::as_path)
    }

    #[must_use]
    pub const fn options(&self) -> ViewOptions {
        self.options
    }

    #[must_use]
    pub fn items(&self) -> &[ViewItem] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Leafnames in presentation order.
    #[must_use]
    pub fn leafnames(&self) -> Vec<&str> {
        self.items.iter().map(ViewItem::leafname).collect()
    }

    #[must_use]
    pub const fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    #[must_use]
    pub fn cursor_item(&self) -> Option<&ViewItem> {
        self.cursor.and_then(|i| self.items.get(i))
    }

    #[must_use]
    pub fn auto_select(&self) -> Option<&OsStr> {
        self.auto_select.as_deref()
    }

    #[must_use]
    pub const fn scan_status(&self) -> ScanStatus {
        self.scan_status
    }

    #[must_use]
    pub const fn name_width(&self) -> usize {
        self.name_width
    }

    #[must_use]
    pub const fn is_attached(&self) -> bool {
        self.snapshot.is_some()
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    #[must_use]
    pub const fn snapshot(&self) -> Option<&SnapshotHandle> {
        self.snapshot.as_ref()
    }

    /// Window title: the path, marked while a scan runs.
    #[must_use]
    pub fn title(&self) -> String {
        let Some(path) = &self.path else {
            return String::new();
        };

        if self.scan_status == ScanStatus::Scanning {
            format!("{} (Scanning)", path.display())
        } else {
            path.display().to_string()
        }
    }

    // ────────────────────────────────────────────────────────────
    // Attach / detach
    // ────────────────────────────────────────────────────────────

    /// Show `handle`'s directory. Clears the list, subscribes and requests a
    /// rescan; the current entries arrive as the first `Added` batch.
    pub fn attach(&mut self, cache: &mut DirectoryCache, handle: SnapshotHandle) {
        if self.snapshot.is_some() {
            self.detach(cache);
        }

        self.had_cursor = self.had_cursor || self.cursor.is_some();
        self.clear_items();

        let path = handle.path();
        self.subscription = Some(cache.subscribe(&handle));
        self.snapshot = Some(handle);
        self.path = Some(Arc::clone(&path));
        self.closed = false;
        self.set_scan_status(ScanStatus::Scanning);

        debug!(
            marker = "VIEW_EVENT",
            operation_type = "attach",
            view = %self.id,
            path = %path.display(),
            "View attached"
        );

        cache.rescan(&path);
    }

    /// Stop listening. The snapshot lives on for any other view (or the
    /// cache's retention); safe while a scan is running.
    pub fn detach(&mut self, cache: &mut DirectoryCache) {
        let Some(handle) = self.snapshot.take() else {
            return;
        };

        if let Some(subscription) = self.subscription.take() {
            cache.unsubscribe(&handle, subscription.id());
        }

        cache.release(handle);

        if self.scan_status == ScanStatus::Scanning {
            self.set_scan_status(ScanStatus::Idle);
        }

        debug!(
            marker = "VIEW_EVENT",
            operation_type = "detach",
            view = %self.id,
            "View detached"
        );
    }

    /// Detach for good. A closed view ignores events until re-navigated.
    pub fn close(&mut self, cache: &mut DirectoryCache) {
        self.detach(cache);
        self.closed = true;
    }

    // ────────────────────────────────────────────────────────────
    // Event application
    // ────────────────────────────────────────────────────────────

    /// Apply every event already queued for this view.
    pub fn process_events(&mut self) -> usize {
        let mut applied = 0;

        while let Some(event) = self.subscription.as_mut().and_then(Subscription::try_next) {
            self.on_event(event);
            applied += 1;
        }

        applied
    }

    pub fn on_event(&mut self, event: DirEvent) {
        trace!(
            marker = "VIEW_EVENT",
            view = %self.id,
            event = event.kind(),
            "Applying directory event"
        );

        match event {
            DirEvent::Added(batch) => self.on_added(&batch),
            DirEvent::Removed(batch) => self.on_removed(&batch),
            DirEvent::Updated(batch) => self.on_updated(&batch),
            DirEvent::ScanStarted => self.set_scan_status(ScanStatus::Scanning),
            DirEvent::ScanEnded => self.on_scan_ended(),
            DirEvent::Error(err) => self.on_error(&err),
        }
    }

    fn on_added(&mut self, batch: &EntryBatch) {
        let before = self.items.len();
        let mut changes = ItemsChanged::default();
        let mut arrived: Option<OsString> = None;

        let mut known: AHashMap<OsString, usize> = self
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.name().to_os_string(), i))
            .collect();

        for entry in batch.iter() {
            if !entry.visible_with(self.options.show_hidden) {
                continue;
            }

            let leaf = CompactString::new(entry.leafname());
            self.name_width = self.name_width.max(leaf.chars().count());

            if self.cursor.is_none() && self.auto_select.as_deref() == Some(entry.name()) {
                arrived = self.auto_select.take();
            }

            if let Some(&index) = known.get(entry.name()) {
                self.items[index] = ViewItem::new(Arc::clone(entry));
                changes.updated.push(leaf);
            } else {
                known.insert(entry.name().to_os_string(), self.items.len());
                self.items.push(ViewItem::new(Arc::clone(entry)));
                changes.inserted.push(leaf);
            }
        }

        if self.items.len() != before || !changes.updated.is_empty() {
            self.resort();
        }

        if !changes.is_empty() {
            self.observer.on_items_changed(&changes);
        }

        if let Some(leaf) = arrived
            && let Some(index) = self.position(&leaf)
        {
            if self.had_cursor {
                self.set_cursor(Some(index));
            } else {
                self.observer.on_wink(index);
            }
        }
    }

    fn on_removed(&mut self, batch: &EntryBatch) {
        let gone: AHashSet<&OsStr> = batch.iter().map(|e| e.name()).collect();
        let cursor_leaf = self.cursor_leaf();
        let mut changes = ItemsChanged::default();

        self.items.retain(|item| {
            if gone.contains(item.name()) {
                changes.removed.push(CompactString::new(item.leafname()));
                false
            } else {
                true
            }
        });

        if changes.is_empty() {
            return;
        }

        self.observer.on_items_changed(&changes);
        self.restore_cursor(cursor_leaf);
    }

    fn on_updated(&mut self, batch: &EntryBatch) {
        let mut changes = ItemsChanged::default();

        for entry in batch.iter() {
            match self.position(entry.name()) {
                Some(index) => {
                    let item = &mut self.items[index];
                    item.entry = Arc::clone(entry);
                    item.dirty = true;
                    changes.updated.push(CompactString::new(entry.leafname()));
                }
                // Filtered out of this view, or already gone.
                None => trace!(
                    marker = "VIEW_EVENT",
                    leafname = entry.leafname(),
                    "Update for an item not in this view"
                ),
            }
        }

        if changes.is_empty() {
            return;
        }

        self.resort();
        self.observer.on_items_changed(&changes);
    }

    fn on_scan_ended(&mut self) {
        if let Some(pending) = self.auto_select.take() {
            trace!(
                marker = "VIEW_EVENT",
                leafname = %pending.to_string_lossy(),
                "Auto-select target never appeared; dropped"
            );
        }

        self.set_scan_status(ScanStatus::Idle);

        if self.had_cursor && self.cursor.is_none() && !self.items.is_empty() {
            self.set_cursor(Some(0));
            self.had_cursor = false;
        }

        self.name_width = self
            .items
            .iter()
            .map(|item| item.leafname().chars().count())
            .max()
            .unwrap_or(0);
    }

    fn on_error(&mut self, err: &FilerError) {
        warn!(
            marker = "VIEW_EVENT",
            operation_type = err.operation_type(),
            view = %self.id,
            error = %err,
            "Directory became unavailable"
        );

        self.set_scan_status(ScanStatus::Error);
        self.observer.on_directory_error(err);
    }

    // ────────────────────────────────────────────────────────────
    // Navigation
    // ────────────────────────────────────────────────────────────

    /// Point the view at `new_path` (relative paths resolve against the
    /// current directory). `select` becomes the auto-select target. The old
    /// directory is released even when the new one cannot be opened.
    #[instrument(level = "debug", skip(self, cache), fields(view = %self.id, path = %new_path.display()))]
    pub fn navigate(
        &mut self,
        cache: &mut DirectoryCache,
        new_path: &Path,
        select: Option<&OsStr>,
    ) -> FilerResult<()> {
        self.detach(cache);

        let target = match self.path.as_deref() {
            Some(current) => paths::resolve(current, new_path)?,
            None => paths::canonical_path(new_path)?,
        };

        match cache.lookup(&target) {
            Ok(handle) => {
                self.auto_select = select.map(OsStr::to_os_string);
                self.attach(cache, handle);

                info!(
                    marker = "VIEW_EVENT",
                    operation_type = "navigate",
                    view = %self.id,
                    "Navigated"
                );

                Ok(())
            }
            Err(err) => {
                self.clear_items();
                self.path = Some(Arc::new(target.clone()));
                self.set_scan_status(ScanStatus::Error);

                Err(FilerError::directory_unavailable(
                    target,
                    err.to_compact_string(),
                ))
            }
        }
    }

    /// Go up one level, landing the cursor on the directory we left.
    /// Returns `false` when already at the root.
    pub fn navigate_to_parent(&mut self, cache: &mut DirectoryCache) -> FilerResult<bool> {
        let current = Arc::clone(self.path.as_ref().ok_or(FilerError::NotAttached)?);

        let Some((parent, leaf)) = paths::split_parent(&current) else {
            return Ok(false);
        };

        self.navigate(cache, parent, Some(leaf))?;
        Ok(true)
    }

    /// Swap in new options. Toggling hidden files re-attaches to the same
    /// snapshot so the list is rebuilt through the filter; other changes
    /// only re-sort.
    pub fn set_options(
        &mut self,
        cache: &mut DirectoryCache,
        options: ViewOptions,
    ) -> FilerResult<()> {
        let previous = self.options;

        if previous.show_hidden != options.show_hidden
            && let Some(path) = self.path.clone()
            && self.snapshot.is_some()
        {
            let handle = cache.lookup(&path)?;
            self.options = options;

            // Keep the cursor where it was once the items come back.
            self.auto_select = self.cursor_leaf();
            self.detach(cache);
            self.attach(cache, handle);
            return Ok(());
        }

        self.options = options;

        if previous.sort != options.sort || previous.dirs_first != options.dirs_first {
            self.resort();

            let changes = ItemsChanged {
                updated: self
                    .items
                    .iter()
                    .map(|item| CompactString::new(item.leafname()))
                    .collect(),
                ..ItemsChanged::default()
            };
            self.observer.on_items_changed(&changes);
        }

        Ok(())
    }

    /// Make sure the directory still exists and that we still hold the
    /// snapshot the cache would hand out.
    fn revalidate(&mut self, cache: &mut DirectoryCache) -> Revalidated {
        let Some(path) = self.path.clone() else {
            return Revalidated::Same;
        };

        match cache.lookup(&path) {
            Err(err) => {
                self.on_error(&err);
                Revalidated::Gone
            }
            Ok(handle) => {
                let same = self
                    .snapshot
                    .as_ref()
                    .is_some_and(|current| current.ptr_eq(&handle));

                if same {
                    cache.release(handle);
                    Revalidated::Same
                } else {
                    self.auto_select = self.cursor_leaf();
                    self.attach(cache, handle);
                    Revalidated::Reattached
                }
            }
        }
    }

    /// The pointer moved into this window. Rescans only if the directory
    /// changed on disk. Returns `false` when the directory is gone and the
    /// window should close.
    pub fn on_pointer_entered_view(&mut self, cache: &mut DirectoryCache) -> bool {
        match self.revalidate(cache) {
            Revalidated::Gone => false,
            Revalidated::Reattached => true,
            Revalidated::Same => {
                if let Some(path) = &self.path {
                    cache.refresh_if_changed(path);
                }
                true
            }
        }
    }

    /// Like `on_pointer_entered_view`, but always re-reads the directory.
    pub fn update_dir(&mut self, cache: &mut DirectoryCache) -> bool {
        match self.revalidate(cache) {
            Revalidated::Gone => false,
            Revalidated::Reattached => true,
            Revalidated::Same => {
                if let Some(path) = &self.path {
                    cache.rescan(path);
                }
                true
            }
        }
    }

    /// Resolve an activation on the item at `index`. Directory changes in
    /// the same window are performed here; every other action is returned
    /// for the caller, and the item winks.
    pub fn on_user_activate(
        &mut self,
        cache: &mut DirectoryCache,
        index: usize,
        flags: OpenFlags,
    ) -> FilerResult<OpenAction> {
        let dir = Arc::clone(self.path.as_ref().ok_or(FilerError::NotAttached)?);
        let item = self
            .items
            .get(index)
            .ok_or_else(|| FilerError::Other(format_compact!("no item at index {index}")))?;

        let action = activate::resolve(&dir, item.entry(), flags, self.kind);

        if let OpenAction::ChangeDirectory { path } = &action {
            self.navigate(cache, path, None)?;
        } else {
            self.observer.on_wink(index);
        }

        Ok(action)
    }

    // ────────────────────────────────────────────────────────────
    // Cursor and selection
    // ────────────────────────────────────────────────────────────

    /// Move the cursor; out-of-range indices clear it.
    pub fn set_cursor(&mut self, index: Option<usize>) {
        let index = index.filter(|&i| i < self.items.len());

        if self.cursor != index {
            self.cursor = index;
            self.observer.on_cursor_changed(index);
        }
    }

    pub fn set_selected(&mut self, index: usize, selected: bool) -> bool {
        match self.items.get_mut(index) {
            Some(item) if item.selected != selected => {
                item.selected = selected;
                item.dirty = true;
                true
            }
            _ => false,
        }
    }

    pub fn clear_selection(&mut self) {
        for item in self.items.iter_mut().filter(|item| item.selected) {
            item.selected = false;
            item.dirty = true;
        }
    }

    #[must_use]
    pub fn selected_count(&self) -> usize {
        self.items.iter().filter(|item| item.selected).count()
    }

    #[must_use]
    pub fn selected_leafnames(&self) -> Vec<CompactString> {
        self.items
            .iter()
            .filter(|item| item.selected)
            .map(|item| CompactString::new(item.leafname()))
            .collect()
    }

    /// Move the cursor to the next (or previous) selected item, wrapping.
    /// Does nothing when nothing is selected.
    pub fn next_selected(&mut self, direction: Direction) -> Option<usize> {
        let len = self.items.len();
        if len == 0 || !self.items.iter().any(|item| item.selected) {
            return None;
        }

        let start = self.cursor.unwrap_or(match direction {
            Direction::Forward => len - 1,
            Direction::Backward => 0,
        });

        let found = (1..=len)
            .map(|step| match direction {
                Direction::Forward => (start + step) % len,
                Direction::Backward => (start + len - step % len) % len,
            })
            .find(|&i| self.items[i].selected)?;

        self.set_cursor(Some(found));
        Some(found)
    }

    /// The window layer has redrawn everything.
    pub fn clear_dirty(&mut self) {
        for item in &mut self.items {
            item.dirty = false;
        }
    }

    // ────────────────────────────────────────────────────────────
    // Internals
    // ────────────────────────────────────────────────────────────

    fn position(&self, name: &OsStr) -> Option<usize> {
        self.items.iter().position(|item| item.name() == name)
    }

    fn cursor_leaf(&self) -> Option<OsString> {
        self.cursor_item().map(|item| item.name().to_os_string())
    }

    /// Put the cursor back on `leaf` after the list moved, or clear it if
    /// the item is gone.
    fn restore_cursor(&mut self, leaf: Option<OsString>) {
        let index = leaf.and_then(|leaf| self.position(&leaf));

        if self.cursor != index {
            self.cursor = index;
            self.observer.on_cursor_changed(index);
        }
    }

    fn resort(&mut self) {
        let cursor_leaf = self.cursor_leaf();
        let ViewOptions {
            sort: key,
            dirs_first,
            ..
        } = self.options;

        self.items
            .sort_by(|a, b| sort::compare(&a.entry, &b.entry, key, dirs_first));

        if cursor_leaf.is_some() {
            self.restore_cursor(cursor_leaf);
        }
    }

    fn clear_items(&mut self) {
        if !self.items.is_empty() {
            let changes = ItemsChanged {
                removed: self
                    .items
                    .drain(..)
                    .map(|item| CompactString::new(item.leafname()))
                    .collect(),
                ..ItemsChanged::default()
            };
            self.observer.on_items_changed(&changes);
        }

        if self.cursor.take().is_some() {
            self.observer.on_cursor_changed(None);
        }

        self.name_width = 0;
    }

    fn set_scan_status(&mut self, status: ScanStatus) {
        if self.scan_status == status {
            return;
        }

        let was_scanning = self.scan_status == ScanStatus::Scanning;
        self.scan_status = status;

        let scanning = status == ScanStatus::Scanning;
        if scanning != was_scanning {
            self.observer.on_scan_state_changed(scanning);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{CacheConfig, EntrySort},
        view::observer::{Notification, NullObserver, RecordingObserver},
    };
    use std::time::Duration;
    use tempfile::TempDir;

    fn batch(names: &[&str]) -> DirEvent {
        DirEvent::Added(
            names
                .iter()
                .map(|n| Arc::new(DirectoryEntry::file(*n, 1)))
                .collect(),
        )
    }

    fn removed(names: &[&str]) -> DirEvent {
        DirEvent::Removed(
            names
                .iter()
                .map(|n| Arc::new(DirectoryEntry::file(*n, 1)))
                .collect(),
        )
    }

    fn detached(options: ViewOptions) -> (ViewController, RecordingObserver) {
        let observer = RecordingObserver::new();
        let view = ViewController::new(ViewKind::Window, options, Box::new(observer.clone()));
        (view, observer)
    }

    fn immediate() -> DirectoryCache {
        DirectoryCache::with_config(CacheConfig {
            release_grace: Duration::ZERO,
            max_retained: 0,
        })
    }

    async fn sync(cache: &mut DirectoryCache, view: &mut ViewController) {
        cache.settle().await;
        view.process_events();
    }

    #[test]
    fn hidden_entries_follow_the_option() {
        let (mut view, _) = detached(ViewOptions::default());
        view.on_event(batch(&["a", ".foo", ".", ".."]));
        assert_eq!(view.leafnames(), vec!["a"]);

        let (mut view, _) = detached(ViewOptions::default().with_hidden(true));
        view.on_event(batch(&["a", ".foo", ".", ".."]));
        assert_eq!(view.leafnames(), vec![".foo", "a"]);
    }

    #[test]
    fn added_batches_are_sorted_by_name() {
        let (mut view, observer) = detached(ViewOptions::default());

        view.on_event(batch(&["c", "a", "b"]));

        assert_eq!(view.leafnames(), vec!["a", "b", "c"]);
        assert_eq!(view.name_width(), 1);
        assert!(observer.take().iter().any(|n| matches!(
            n,
            Notification::ItemsChanged(changes) if changes.inserted.len() == 3
        )));
    }

    #[test]
    fn removing_the_cursor_item_clears_the_cursor() {
        let (mut view, _) = detached(ViewOptions::default());
        view.on_event(batch(&["a", "b"]));
        view.set_cursor(Some(0));

        view.on_event(removed(&["a"]));

        assert_eq!(view.leafnames(), vec!["b"]);
        assert_eq!(view.cursor(), None);
    }

    #[test]
    fn cursor_follows_its_item_when_others_go() {
        let (mut view, _) = detached(ViewOptions::default());
        view.on_event(batch(&["a", "b", "c"]));
        view.set_cursor(Some(2));

        view.on_event(removed(&["a"]));

        assert_eq!(view.cursor(), Some(1));
        assert_eq!(view.cursor_item().map(ViewItem::leafname), Some("c"));
    }

    #[test]
    fn updates_replace_and_resort() {
        let (mut view, _) = detached(ViewOptions::default().with_sort(EntrySort::SizeAsc));
        view.on_event(DirEvent::Added(
            vec![
                Arc::new(DirectoryEntry::file("small", 1)),
                Arc::new(DirectoryEntry::file("large", 9)),
            ]
            .into(),
        ));
        view.set_cursor(Some(0));
        view.clear_dirty();

        view.on_event(DirEvent::Updated(
            vec![Arc::new(DirectoryEntry::file("small", 50))].into(),
        ));

        assert_eq!(view.leafnames(), vec!["large", "small"]);
        assert_eq!(view.cursor_item().map(ViewItem::leafname), Some("small"));
        assert!(view.items()[1].is_dirty());
        assert!(!view.items()[0].is_dirty());
    }

    #[test]
    fn update_for_filtered_item_is_ignored() {
        let (mut view, observer) = detached(ViewOptions::default());
        view.on_event(batch(&["a"]));
        observer.take();

        view.on_event(DirEvent::Updated(
            vec![Arc::new(DirectoryEntry::file(".secret", 3))].into(),
        ));

        assert_eq!(view.leafnames(), vec!["a"]);
        assert!(observer.take().is_empty());
    }

    #[test]
    fn scan_end_drops_a_stale_auto_select() {
        let (mut view, _) = detached(ViewOptions::default());
        view.auto_select = Some(OsString::from("never"));

        view.on_event(DirEvent::ScanStarted);
        view.on_event(batch(&["x"]));
        view.on_event(DirEvent::ScanEnded);

        assert_eq!(view.auto_select(), None);
        assert_eq!(view.scan_status(), ScanStatus::Idle);
        assert_eq!(view.cursor(), None);
    }

    #[test]
    fn auto_select_lands_on_target_whatever_its_place_in_the_batch() {
        for order in [["target.txt", "other.txt"], ["other.txt", "target.txt"]] {
            let (mut view, _) = detached(ViewOptions::default());
            view.had_cursor = true;
            view.auto_select = Some(OsString::from("target.txt"));

            view.on_event(DirEvent::ScanStarted);
            view.on_event(batch(&order));

            assert_eq!(view.cursor(), Some(1));
            assert_eq!(view.cursor_item().map(ViewItem::leafname), Some("target.txt"));
            assert_eq!(view.auto_select(), None);
        }
    }

    #[test]
    fn only_the_scan_end_default_clears_had_cursor() {
        let (mut matched, _) = detached(ViewOptions::default());
        matched.had_cursor = true;
        matched.auto_select = Some(OsString::from("b"));

        matched.on_event(batch(&["a", "b"]));
        matched.on_event(DirEvent::ScanEnded);

        assert_eq!(matched.cursor(), Some(1));
        assert!(matched.had_cursor);

        let (mut defaulted, _) = detached(ViewOptions::default());
        defaulted.had_cursor = true;

        defaulted.on_event(batch(&["a", "b"]));
        defaulted.on_event(DirEvent::ScanEnded);

        assert_eq!(defaulted.cursor(), Some(0));
        assert!(!defaulted.had_cursor);
    }

    #[test]
    fn column_width_shrinks_to_fit_at_scan_end() {
        let (mut view, _) = detached(ViewOptions::default());
        view.on_event(batch(&["short", "a-much-longer-name"]));
        assert_eq!(view.name_width(), 18);

        view.on_event(removed(&["a-much-longer-name"]));
        assert_eq!(view.name_width(), 18);

        view.on_event(DirEvent::ScanEnded);
        assert_eq!(view.name_width(), 5);
    }

    #[test]
    fn next_selected_wraps_in_both_directions() {
        let (mut view, _) = detached(ViewOptions::default());
        view.on_event(batch(&["a", "b", "c", "d"]));

        assert_eq!(view.next_selected(Direction::Forward), None);

        view.set_selected(1, true);
        view.set_selected(3, true);
        view.set_cursor(Some(3));

        assert_eq!(view.next_selected(Direction::Forward), Some(1));
        assert_eq!(view.next_selected(Direction::Forward), Some(3));
        assert_eq!(view.next_selected(Direction::Backward), Some(1));
        assert_eq!(view.next_selected(Direction::Backward), Some(3));
        assert_eq!(view.selected_leafnames(), vec!["b", "d"]);

        view.clear_selection();
        assert_eq!(view.selected_count(), 0);
    }

    #[test]
    fn error_event_is_terminal_and_reported() {
        let (mut view, observer) = detached(ViewOptions::default());

        view.on_event(DirEvent::Error(FilerError::path_not_found("/gone")));

        assert_eq!(view.scan_status(), ScanStatus::Error);
        assert!(
            observer
                .take()
                .iter()
                .any(|n| matches!(n, Notification::DirectoryError(_)))
        );
    }

    #[tokio::test]
    async fn attach_shows_scanning_title_until_scan_ends() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("b"), b"").unwrap();
        std::fs::write(tmp.path().join("a"), b"").unwrap();

        let mut cache = immediate();
        let mut view = ViewController::open(
            &mut cache,
            tmp.path(),
            ViewKind::Window,
            ViewOptions::default(),
            Box::new(NullObserver),
        )
        .unwrap();

        assert!(view.title().ends_with("(Scanning)"));

        sync(&mut cache, &mut view).await;

        assert_eq!(view.leafnames(), vec!["a", "b"]);
        assert_eq!(view.scan_status(), ScanStatus::Idle);
        assert_eq!(view.title(), tmp.path().display().to_string());
    }

    #[tokio::test]
    async fn auto_select_sets_cursor_when_view_had_one() {
        let tmp = TempDir::new().unwrap();
        let sub = tmp.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("other.txt"), b"").unwrap();
        std::fs::write(sub.join("target.txt"), b"").unwrap();

        let mut cache = immediate();
        let (mut view, _) = detached(ViewOptions::default());
        view.navigate(&mut cache, tmp.path(), None).unwrap();
        sync(&mut cache, &mut view).await;
        view.set_cursor(Some(0));

        view.navigate(&mut cache, &sub, Some(OsStr::new("target.txt"))).unwrap();
        sync(&mut cache, &mut view).await;

        assert_eq!(view.cursor_item().map(ViewItem::leafname), Some("target.txt"));
        assert_eq!(view.cursor(), Some(1));
        assert_eq!(view.auto_select(), None);
    }

    #[tokio::test]
    async fn auto_select_only_winks_without_prior_cursor() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("target.txt"), b"").unwrap();
        std::fs::write(tmp.path().join("a.txt"), b"").unwrap();

        let mut cache = immediate();
        let (mut view, observer) = detached(ViewOptions::default());
        view.navigate(&mut cache, tmp.path(), Some(OsStr::new("target.txt"))).unwrap();
        sync(&mut cache, &mut view).await;

        assert_eq!(view.cursor(), None);
        assert!(observer.take().contains(&Notification::Wink(1)));
    }

    #[tokio::test]
    async fn scan_end_defaults_cursor_for_views_that_had_one() {
        let tmp = TempDir::new().unwrap();
        let sub = tmp.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("z"), b"").unwrap();
        std::fs::write(sub.join("y"), b"").unwrap();

        let mut cache = immediate();
        let (mut view, _) = detached(ViewOptions::default());
        view.navigate(&mut cache, tmp.path(), None).unwrap();
        sync(&mut cache, &mut view).await;
        view.set_cursor(Some(0));

        view.navigate(&mut cache, &sub, None).unwrap();
        sync(&mut cache, &mut view).await;

        assert_eq!(view.cursor_item().map(ViewItem::leafname), Some("y"));
    }

    #[tokio::test]
    async fn parent_navigation_lands_on_the_child() {
        let tmp = TempDir::new().unwrap();
        for name in ["alpha", "beta", "gamma"] {
            std::fs::create_dir(tmp.path().join(name)).unwrap();
        }
        std::fs::write(tmp.path().join("beta").join("inside"), b"").unwrap();

        let mut cache = immediate();
        let (mut view, _) = detached(ViewOptions::default());
        view.navigate(&mut cache, &tmp.path().join("beta"), None).unwrap();
        sync(&mut cache, &mut view).await;
        view.set_cursor(Some(0));

        assert!(view.navigate_to_parent(&mut cache).unwrap());
        sync(&mut cache, &mut view).await;

        assert_eq!(view.path(), Some(tmp.path()));
        assert_eq!(view.cursor_item().map(ViewItem::leafname), Some("beta"));
    }

    #[tokio::test]
    async fn parent_of_root_is_a_no_op() {
        let mut cache = immediate();
        let (mut view, _) = detached(ViewOptions::default());
        view.navigate(&mut cache, Path::new("/"), None).unwrap();

        assert!(!view.navigate_to_parent(&mut cache).unwrap());
        assert_eq!(view.path(), Some(Path::new("/")));
    }

    #[tokio::test]
    async fn failed_navigation_still_detaches() {
        let tmp = TempDir::new().unwrap();
        let mut cache = immediate();
        let (mut view, _) = detached(ViewOptions::default());
        view.navigate(&mut cache, tmp.path(), None).unwrap();
        sync(&mut cache, &mut view).await;

        let err = view
            .navigate(&mut cache, &tmp.path().join("missing"), None)
            .unwrap_err();

        assert!(matches!(err, FilerError::DirectoryUnavailable { .. }));
        assert!(!view.is_attached());
        assert_eq!(view.scan_status(), ScanStatus::Error);
        assert!(!cache.is_cached(tmp.path()));
    }

    #[tokio::test]
    async fn toggling_hidden_rebuilds_the_list_and_keeps_the_cursor() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(".dot"), b"").unwrap();
        std::fs::write(tmp.path().join("plain"), b"").unwrap();

        let mut cache = immediate();
        let (mut view, _) = detached(ViewOptions::default());
        view.navigate(&mut cache, tmp.path(), None).unwrap();
        sync(&mut cache, &mut view).await;
        view.set_cursor(Some(0));

        view.set_options(&mut cache, ViewOptions::default().with_hidden(true))
            .unwrap();
        sync(&mut cache, &mut view).await;

        assert_eq!(view.leafnames(), vec![".dot", "plain"]);
        assert_eq!(view.cursor_item().map(ViewItem::leafname), Some("plain"));
    }

    #[tokio::test]
    async fn failed_hidden_toggle_keeps_the_old_options() {
        let tmp = TempDir::new().unwrap();
        let doomed = tmp.path().join("doomed");
        std::fs::create_dir(&doomed).unwrap();
        std::fs::write(doomed.join(".dot"), b"").unwrap();
        std::fs::write(doomed.join("plain"), b"").unwrap();

        let mut cache = immediate();
        let (mut view, _) = detached(ViewOptions::default());
        view.navigate(&mut cache, &doomed, None).unwrap();
        sync(&mut cache, &mut view).await;

        std::fs::remove_dir_all(&doomed).unwrap();

        let err = view
            .set_options(&mut cache, ViewOptions::default().with_hidden(true))
            .unwrap_err();

        assert!(matches!(err, FilerError::PathNotFound { .. }));
        assert!(!view.options().show_hidden);
        assert_eq!(view.leafnames(), vec!["plain"]);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn names_differing_only_in_invalid_bytes_are_both_shown() {
        use std::os::unix::ffi::OsStrExt;

        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(OsStr::from_bytes(b"a\xff")), b"").unwrap();
        std::fs::write(tmp.path().join(OsStr::from_bytes(b"a\xfe")), b"").unwrap();

        let mut cache = immediate();
        let (mut view, _) = detached(ViewOptions::default());
        view.navigate(&mut cache, tmp.path(), None).unwrap();
        sync(&mut cache, &mut view).await;

        let names: Vec<&[u8]> = view.items().iter().map(|i| i.name().as_bytes()).collect();
        assert_eq!(names, vec![b"a\xfe".as_slice(), b"a\xff".as_slice()]);

        std::fs::remove_file(tmp.path().join(OsStr::from_bytes(b"a\xff"))).unwrap();
        assert!(view.update_dir(&mut cache));
        sync(&mut cache, &mut view).await;

        let names: Vec<&[u8]> = view.items().iter().map(|i| i.name().as_bytes()).collect();
        assert_eq!(names, vec![b"a\xfe".as_slice()]);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn parent_navigation_leaves_a_non_utf8_directory() {
        use std::os::unix::ffi::OsStrExt;

        let tmp = TempDir::new().unwrap();
        let odd = tmp.path().join(OsStr::from_bytes(b"d\xff"));
        std::fs::create_dir(&odd).unwrap();

        let mut cache = immediate();
        let (mut view, observer) = detached(ViewOptions::default());
        view.navigate(&mut cache, &odd, None).unwrap();
        sync(&mut cache, &mut view).await;

        assert!(view.navigate_to_parent(&mut cache).unwrap());
        sync(&mut cache, &mut view).await;

        assert_eq!(view.path(), Some(tmp.path()));
        assert_eq!(view.items()[0].name(), OsStr::from_bytes(b"d\xff"));
        assert!(observer.take().contains(&Notification::Wink(0)));
    }

    #[tokio::test]
    async fn sort_change_reorders_without_rescanning() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a"), b"xxxxxxxx").unwrap();
        std::fs::write(tmp.path().join("b"), b"x").unwrap();

        let mut cache = immediate();
        let (mut view, _) = detached(ViewOptions::default());
        view.navigate(&mut cache, tmp.path(), None).unwrap();
        sync(&mut cache, &mut view).await;
        let scans = cache.stats().scans;

        view.set_options(&mut cache, ViewOptions::default().with_sort(EntrySort::SizeAsc))
            .unwrap();

        assert_eq!(view.leafnames(), vec!["b", "a"]);
        assert_eq!(cache.stats().scans, scans);
    }

    #[tokio::test]
    async fn activating_a_directory_in_the_same_window_navigates() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("inner")).unwrap();
        std::fs::write(tmp.path().join("file"), b"").unwrap();

        let mut cache = immediate();
        let (mut view, observer) = detached(ViewOptions::default());
        view.navigate(&mut cache, tmp.path(), None).unwrap();
        sync(&mut cache, &mut view).await;

        assert_eq!(view.leafnames(), vec!["file", "inner"]);

        let launch = view
            .on_user_activate(&mut cache, 0, OpenFlags::CLOSE_WINDOW)
            .unwrap();
        assert!(matches!(launch, OpenAction::Launch { close_window: true, .. }));
        assert!(observer.take().contains(&Notification::Wink(0)));

        let action = view
            .on_user_activate(&mut cache, 1, OpenFlags::SAME_WINDOW)
            .unwrap();
        assert_eq!(
            action,
            OpenAction::ChangeDirectory { path: tmp.path().join("inner") }
        );
        assert_eq!(view.path(), Some(tmp.path().join("inner").as_path()));
    }

    #[tokio::test]
    async fn pointer_entry_reports_a_vanished_directory() {
        let tmp = TempDir::new().unwrap();
        let doomed = tmp.path().join("doomed");
        std::fs::create_dir(&doomed).unwrap();

        let mut cache = immediate();
        let (mut view, _) = detached(ViewOptions::default());
        view.navigate(&mut cache, &doomed, None).unwrap();
        sync(&mut cache, &mut view).await;

        assert!(view.on_pointer_entered_view(&mut cache));

        std::fs::remove_dir(&doomed).unwrap();
        assert!(!view.on_pointer_entered_view(&mut cache));
        assert_eq!(view.scan_status(), ScanStatus::Error);
    }

    #[tokio::test]
    async fn update_dir_picks_up_new_files() {
        let tmp = TempDir::new().unwrap();
        let mut cache = immediate();
        let (mut view, _) = detached(ViewOptions::default());
        view.navigate(&mut cache, tmp.path(), None).unwrap();
        sync(&mut cache, &mut view).await;
        assert!(view.is_empty());

        std::fs::write(tmp.path().join("fresh"), b"").unwrap();
        assert!(view.update_dir(&mut cache));
        sync(&mut cache, &mut view).await;

        assert_eq!(view.leafnames(), vec!["fresh"]);
    }

    #[tokio::test]
    async fn detach_mid_scan_is_safe() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a"), b"").unwrap();

        let mut cache = immediate();
        let (mut view, _) = detached(ViewOptions::default());
        view.navigate(&mut cache, tmp.path(), None).unwrap();

        view.close(&mut cache);
        cache.settle().await;

        assert_eq!(view.process_events(), 0);
        assert!(view.is_closed());
        assert_eq!(cache.stats().destroyed, 1);
    }
}
