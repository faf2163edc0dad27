//! src/registry.rs
//! ============================================================================
//! # `WindowRegistry`: Process-Wide List of Live Views
//!
//! Holds weak references only: a view lives as long as the window layer
//! keeps its [`ViewHandle`]. The registry answers cross-window questions
//! (who shows this path?), enforces the unique-windows policy and fans
//! "this subtree changed" notifications out to every affected view.
//!
//! Methods lock views one at a time. Callers must not hold a view's lock
//! while calling into the registry.

use std::{
    ffi::OsStr,
    path::Path,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use crate::{
    cache::directory_cache::DirectoryCache,
    config::{Config, ViewOptions},
    error::{FilerError, FilerResult},
    fs::paths,
    view::{
        activate::{OpenAction, OpenFlags},
        controller::{ViewController, ViewKind},
        observer::{NullObserver, ViewObserver},
    },
};

pub use crate::view::controller::ViewId;

/// Shared, lockable view as owned by the window layer.
pub type ViewHandle = Arc<Mutex<ViewController>>;

/// Builds the observer for windows the registry opens itself.
pub type ObserverFactory = Box<dyn Fn() -> Box<dyn ViewObserver> + Send + Sync>;

/// Result of `WindowRegistry::activate`.
#[derive(Debug)]
pub struct Activated {
    pub action: OpenAction,
    /// Window opened because of the activation, if any.
    pub opened: Option<ViewHandle>,
}

pub struct WindowRegistry {
    views: Vec<(ViewId, Weak<Mutex<ViewController>>)>,
    unique_windows: bool,
    make_observer: ObserverFactory,
}

impl WindowRegistry {
    #[must_use]
    pub fn new(unique_windows: bool) -> Self {
        Self {
            views: Vec::new(),
            unique_windows,
            make_observer: Box::new(|| Box::new(NullObserver)),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.unique_windows)
    }

    #[must_use]
    pub fn with_observer_factory(mut self, factory: ObserverFactory) -> Self {
        self.make_observer = factory;
        self
    }

    #[must_use]
    pub const fn unique_windows(&self) -> bool {
        self.unique_windows
    }

    pub const fn set_unique_windows(&mut self, unique: bool) {
        self.unique_windows = unique;
    }

    // ────────────────────────────────────────────────────────────
    // Membership
    // ────────────────────────────────────────────────────────────

    pub fn register(&mut self, view: &ViewHandle) -> ViewId {
        let id = view.lock().id();

        if !self.exists(id) {
            self.views.push((id, Arc::downgrade(view)));
            debug!(marker = "REGISTRY", view = %id, "View registered");
        }

        id
    }

    pub fn unregister(&mut self, id: ViewId) -> bool {
        let before = self.views.len();
        self.views.retain(|(view_id, _)| *view_id != id);
        self.views.len() != before
    }

    /// Registered and still alive.
    #[must_use]
    pub fn exists(&self, id: ViewId) -> bool {
        self.views
            .iter()
            .any(|(view_id, weak)| *view_id == id && weak.strong_count() > 0)
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.views.iter().filter(|(_, w)| w.strong_count() > 0).count()
    }

    /// Every live view, dropping entries whose window went away.
    pub fn handles(&mut self) -> Vec<ViewHandle> {
        self.views.retain(|(_, weak)| weak.strong_count() > 0);
        self.views.iter().filter_map(|(_, weak)| weak.upgrade()).collect()
    }

    /// A non-panel view showing `path`, other than `excluding`.
    #[must_use]
    pub fn find_by_path(&self, path: &Path, excluding: Option<ViewId>) -> Option<ViewHandle> {
        let key = paths::canonical_path(path).ok()?;

        self.views
            .iter()
            .filter(|(id, _)| Some(*id) != excluding)
            .filter_map(|(_, weak)| weak.upgrade())
            .find(|handle| {
                let view = handle.lock();
                view.kind() == ViewKind::Window && !view.is_closed() && view.path() == Some(&*key)
            })
    }

    /// Apply queued directory events in every live view.
    pub fn process_events(&mut self) -> usize {
        self.handles()
            .iter()
            .map(|handle| handle.lock().process_events())
            .sum()
    }

    // ────────────────────────────────────────────────────────────
    // Opening and closing
    // ────────────────────────────────────────────────────────────

    /// Open a window on `path`. With unique windows on, an existing window
    /// for the path is refreshed and returned instead.
    #[instrument(level = "debug", skip(self, cache, options), fields(path = %path.display()))]
    pub fn open_directory(
        &mut self,
        cache: &mut DirectoryCache,
        path: &Path,
        options: ViewOptions,
    ) -> FilerResult<ViewHandle> {
        if self.unique_windows
            && let Some(existing) = self.find_by_path(path, None)
        {
            existing.lock().update_dir(cache);
            debug!(marker = "REGISTRY", "Reusing existing window");
            return Ok(existing);
        }

        self.open_view(cache, path, ViewKind::Window, options)
    }

    /// Open a panel on `path`. Panels are exempt from the unique policy.
    pub fn open_panel(
        &mut self,
        cache: &mut DirectoryCache,
        path: &Path,
        options: ViewOptions,
    ) -> FilerResult<ViewHandle> {
        self.open_view(cache, path, ViewKind::Panel, options)
    }

    fn open_view(
        &mut self,
        cache: &mut DirectoryCache,
        path: &Path,
        kind: ViewKind,
        options: ViewOptions,
    ) -> FilerResult<ViewHandle> {
        let view = ViewController::open(cache, path, kind, options, (self.make_observer)())?;
        let handle: ViewHandle = Arc::new(Mutex::new(view));
        let id = self.register(&handle);

        info!(
            marker = "REGISTRY",
            operation_type = "open",
            view = %id,
            path = %path.display(),
            "View opened"
        );

        Ok(handle)
    }

    pub fn close_view(&mut self, cache: &mut DirectoryCache, view: &ViewHandle) {
        let id = {
            let mut guard = view.lock();
            guard.close(cache);
            guard.id()
        };

        self.unregister(id);
        debug!(marker = "REGISTRY", view = %id, "View closed");
    }

    /// Close every other non-panel window showing `path`.
    fn close_duplicates(&mut self, cache: &mut DirectoryCache, path: &Path, keep: ViewId) -> usize {
        let mut closed = 0;

        while let Some(other) = self.find_by_path(path, Some(keep)) {
            self.close_view(cache, &other);
            closed += 1;
        }

        closed
    }

    /// Navigate `view` to `path`, first closing any other window already
    /// showing it when unique windows are on.
    pub fn change_directory(
        &mut self,
        cache: &mut DirectoryCache,
        view: &ViewHandle,
        path: &Path,
        select: Option<&OsStr>,
    ) -> FilerResult<()> {
        let (id, kind, target) = {
            let guard = view.lock();
            let target = match guard.path() {
                Some(current) => paths::resolve(current, path)?,
                None => paths::canonical_path(path)?,
            };
            (guard.id(), guard.kind(), target)
        };

        if self.unique_windows && kind == ViewKind::Window {
            self.close_duplicates(cache, &target, id);
        }

        view.lock().navigate(cache, &target, select)
    }

    /// Open `view`'s parent directory in a new window. `None` at the root.
    pub fn open_parent(
        &mut self,
        cache: &mut DirectoryCache,
        view: &ViewHandle,
    ) -> FilerResult<Option<ViewHandle>> {
        let (parent, options) = {
            let guard = view.lock();
            let current = guard.path().ok_or(FilerError::NotAttached)?;

            match paths::split_parent(current) {
                Some((parent, _)) => (parent.to_path_buf(), guard.options()),
                None => return Ok(None),
            }
        };

        self.open_directory(cache, &parent, options).map(Some)
    }

    /// Activate item `index` of `view` and carry out whatever the result
    /// asks of the window set: open a window, or close the activating one
    /// after a launch. Launching itself is the caller's job.
    pub fn activate(
        &mut self,
        cache: &mut DirectoryCache,
        view: &ViewHandle,
        index: usize,
        flags: OpenFlags,
    ) -> FilerResult<Activated> {
        let (action, id, kind, options) = {
            let mut guard = view.lock();
            let action = guard.on_user_activate(cache, index, flags)?;
            (action, guard.id(), guard.kind(), guard.options())
        };

        let opened = match &action {
            OpenAction::OpenWindow { path } => Some(self.open_directory(cache, path, options)?),
            OpenAction::ChangeDirectory { path } => {
                if self.unique_windows && kind == ViewKind::Window {
                    self.close_duplicates(cache, path, id);
                }
                None
            }
            OpenAction::Launch { close_window, .. } => {
                if *close_window {
                    self.close_view(cache, view);
                }
                None
            }
        };

        Ok(Activated { action, opened })
    }

    // ────────────────────────────────────────────────────────────
    // Change propagation
    // ────────────────────────────────────────────────────────────

    /// Something under `path` changed: every view showing `path` or a
    /// descendant re-reads its directory (views whose directory is gone are
    /// closed), then the parent is rescanned so its entry for `path` is
    /// current. Returns the number of views refreshed.
    #[instrument(level = "debug", skip(self, cache), fields(path = %path.display()))]
    pub fn notify_path_changed(&mut self, cache: &mut DirectoryCache, path: &Path) -> usize {
        let Ok(changed) = paths::canonical_path(path) else {
            return 0;
        };

        let mut refreshed = 0;
        let mut dead = Vec::new();

        for handle in self.handles() {
            let mut view = handle.lock();

            let affected = view
                .path()
                .is_some_and(|shown| paths::is_within(shown, &changed));

            if !affected || view.is_closed() {
                continue;
            }

            if view.update_dir(cache) {
                refreshed += 1;
            } else {
                view.close(cache);
                dead.push(view.id());
            }
        }

        for id in dead {
            self.unregister(id);
        }

        if let Some((parent, _)) = paths::split_parent(&changed) {
            cache.rescan(parent);
        }

        info!(
            marker = "REGISTRY",
            operation_type = "path_changed",
            refreshed,
            "Propagated path change"
        );

        refreshed
    }
}

impl Default for WindowRegistry {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cache::directory_cache::DirectoryCache, config::CacheConfig};
    use std::time::Duration;
    use tempfile::TempDir;

    fn immediate() -> DirectoryCache {
        DirectoryCache::with_config(CacheConfig {
            release_grace: Duration::ZERO,
            max_retained: 0,
        })
    }

    async fn sync(cache: &mut DirectoryCache, registry: &mut WindowRegistry) {
        cache.settle().await;
        registry.process_events();
    }

    #[tokio::test]
    async fn unique_windows_keep_one_view_per_path() {
        let tmp = TempDir::new().unwrap();
        let mut cache = immediate();
        let mut registry = WindowRegistry::new(true);

        let first = registry
            .open_directory(&mut cache, tmp.path(), ViewOptions::default())
            .unwrap();
        let second = registry
            .open_directory(&mut cache, tmp.path(), ViewOptions::default())
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.live_count(), 1);
    }

    #[tokio::test]
    async fn without_the_policy_each_open_is_a_new_window() {
        let tmp = TempDir::new().unwrap();
        let mut cache = immediate();
        let mut registry = WindowRegistry::new(false);

        let _first = registry
            .open_directory(&mut cache, tmp.path(), ViewOptions::default())
            .unwrap();
        let _second = registry
            .open_directory(&mut cache, tmp.path(), ViewOptions::default())
            .unwrap();

        assert_eq!(registry.live_count(), 2);
        assert_eq!(cache.reference_count(tmp.path()), 2);
    }

    #[tokio::test]
    async fn panels_are_ignored_by_path_lookup() {
        let tmp = TempDir::new().unwrap();
        let mut cache = immediate();
        let mut registry = WindowRegistry::new(true);

        let panel = registry
            .open_panel(&mut cache, tmp.path(), ViewOptions::default())
            .unwrap();
        assert!(registry.find_by_path(tmp.path(), None).is_none());

        let window = registry
            .open_directory(&mut cache, tmp.path(), ViewOptions::default())
            .unwrap();
        assert!(!Arc::ptr_eq(&panel, &window));
        assert_eq!(registry.live_count(), 2);
    }

    #[tokio::test]
    async fn dropped_windows_disappear_from_the_registry() {
        let tmp = TempDir::new().unwrap();
        let mut cache = immediate();
        let mut registry = WindowRegistry::default();

        let handle = registry
            .open_directory(&mut cache, tmp.path(), ViewOptions::default())
            .unwrap();
        let id = handle.lock().id();
        assert!(registry.exists(id));

        drop(handle);

        assert!(!registry.exists(id));
        assert_eq!(registry.live_count(), 0);
        assert!(registry.handles().is_empty());
    }

    #[tokio::test]
    async fn change_directory_closes_other_windows_on_the_target() {
        let tmp = TempDir::new().unwrap();
        let other = tmp.path().join("other");
        std::fs::create_dir(&other).unwrap();

        let mut cache = immediate();
        let mut registry = WindowRegistry::new(true);

        let mover = registry
            .open_directory(&mut cache, tmp.path(), ViewOptions::default())
            .unwrap();
        let squatter = registry
            .open_directory(&mut cache, &other, ViewOptions::default())
            .unwrap();

        registry
            .change_directory(&mut cache, &mover, Path::new("other"), None)
            .unwrap();

        assert!(squatter.lock().is_closed());
        assert_eq!(registry.live_count(), 1);
        assert_eq!(mover.lock().path(), Some(other.as_path()));
    }

    #[tokio::test]
    async fn path_change_refreshes_descendants_and_parent() {
        let tmp = TempDir::new().unwrap();
        let top = tmp.path().join("top");
        let nested = top.join("nested");
        std::fs::create_dir_all(&nested).unwrap();

        let mut cache = immediate();
        let mut registry = WindowRegistry::default();
        let options = ViewOptions::default();

        let parent_view = registry.open_directory(&mut cache, tmp.path(), options).unwrap();
        let top_view = registry.open_directory(&mut cache, &top, options).unwrap();
        let nested_view = registry.open_directory(&mut cache, &nested, options).unwrap();
        sync(&mut cache, &mut registry).await;

        std::fs::write(top.join("t.txt"), b"").unwrap();
        std::fs::write(nested.join("n.txt"), b"").unwrap();
        std::fs::write(tmp.path().join("sibling"), b"").unwrap();

        assert_eq!(registry.notify_path_changed(&mut cache, &top), 2);
        sync(&mut cache, &mut registry).await;

        assert_eq!(top_view.lock().leafnames(), vec!["nested", "t.txt"]);
        assert_eq!(nested_view.lock().leafnames(), vec!["n.txt"]);
        assert_eq!(parent_view.lock().leafnames(), vec!["sibling", "top"]);
    }

    #[tokio::test]
    async fn vanished_directories_close_their_windows() {
        let tmp = TempDir::new().unwrap();
        let doomed = tmp.path().join("doomed");
        std::fs::create_dir(&doomed).unwrap();

        let mut cache = immediate();
        let mut registry = WindowRegistry::default();
        let view = registry
            .open_directory(&mut cache, &doomed, ViewOptions::default())
            .unwrap();
        sync(&mut cache, &mut registry).await;

        std::fs::remove_dir(&doomed).unwrap();
        assert_eq!(registry.notify_path_changed(&mut cache, &doomed), 0);

        assert!(view.lock().is_closed());
        assert_eq!(registry.live_count(), 0);
    }

    #[tokio::test]
    async fn open_parent_opens_a_second_window() {
        let tmp = TempDir::new().unwrap();
        let child = tmp.path().join("child");
        std::fs::create_dir(&child).unwrap();

        let mut cache = immediate();
        let mut registry = WindowRegistry::default();
        let view = registry
            .open_directory(&mut cache, &child, ViewOptions::default())
            .unwrap();

        let parent = registry.open_parent(&mut cache, &view).unwrap().unwrap();

        assert_eq!(parent.lock().path(), Some(tmp.path()));
        assert_eq!(view.lock().path(), Some(child.as_path()));
        assert_eq!(registry.live_count(), 2);
    }

    #[tokio::test]
    async fn activating_a_directory_opens_a_registered_window() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("inner")).unwrap();

        let mut cache = immediate();
        let mut registry = WindowRegistry::default();
        let view = registry
            .open_directory(&mut cache, tmp.path(), ViewOptions::default())
            .unwrap();
        sync(&mut cache, &mut registry).await;

        let activated = registry
            .activate(&mut cache, &view, 0, OpenFlags::empty())
            .unwrap();

        let opened = activated.opened.unwrap();
        assert_eq!(opened.lock().path(), Some(tmp.path().join("inner").as_path()));
        assert!(registry.exists(opened.lock().id()));
        assert_eq!(registry.live_count(), 2);
    }
}
