//! src/view/observer.rs
//!
//! Callbacks from a view to whatever draws it. The core knows nothing about
//! widgets; a window layer implements [`ViewObserver`] and redraws from the
//! notifications it receives.

use compact_str::CompactString;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::FilerError;

/// Leafnames touched by one applied event, for incremental redraw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemsChanged {
    pub inserted: Vec<CompactString>,
    pub removed: Vec<CompactString>,
    pub updated: Vec<CompactString>,
}

impl ItemsChanged {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

/// Window-system facing notifications. Every method defaults to a no-op.
pub trait ViewObserver: Send {
    fn on_items_changed(&mut self, _changes: &ItemsChanged) {}

    /// Busy indicator / title decoration.
    fn on_scan_state_changed(&mut self, _scanning: bool) {}

    fn on_cursor_changed(&mut self, _cursor: Option<usize>) {}

    /// Transient highlight on an item that is not the cursor.
    fn on_wink(&mut self, _index: usize) {}

    /// The directory became unreadable; the window should close or warn.
    fn on_directory_error(&mut self, _error: &FilerError) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl ViewObserver for NullObserver {}

/// One recorded callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    ItemsChanged(ItemsChanged),
    ScanState(bool),
    Cursor(Option<usize>),
    Wink(usize),
    DirectoryError(CompactString),
}

/// Observer that keeps every notification, readable through a shared log.
/// Handy for headless front ends and tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingObserver {
    log: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared view of the log; stays valid after the observer moves into a view.
    #[must_use]
    pub fn log(&self) -> Arc<Mutex<Vec<Notification>>> {
        Arc::clone(&self.log)
    }

    /// Drain everything recorded so far.
    #[must_use]
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.log.lock())
    }
}

impl ViewObserver for RecordingObserver {
    fn on_items_changed(&mut self, changes: &ItemsChanged) {
        self.log.lock().push(Notification::ItemsChanged(changes.clone()));
    }

    fn on_scan_state_changed(&mut self, scanning: bool) {
        self.log.lock().push(Notification::ScanState(scanning));
    }

    fn on_cursor_changed(&mut self, cursor: Option<usize>) {
        self.log.lock().push(Notification::Cursor(cursor));
    }

    fn on_wink(&mut self, index: usize) {
        self.log.lock().push(Notification::Wink(index));
    }

    fn on_directory_error(&mut self, error: &FilerError) {
        use compact_str::ToCompactString;

        self.log
            .lock()
            .push(Notification::DirectoryError(error.to_compact_string()));
    }
}
