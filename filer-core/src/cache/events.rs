//! `src/cache/events.rs`
//!
//! Diff events and the per-view subscription channel.

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};

use crate::{error::FilerError, fs::entry::DirectoryEntry};

/// One batch of entries, shared by every subscriber that receives it.
pub type EntryBatch = Arc<[Arc<DirectoryEntry>]>;

/// Change notification for one cached directory.
#[derive(Debug, Clone)]
pub enum DirEvent {
    Added(EntryBatch),
    Removed(EntryBatch),
    Updated(EntryBatch),
    ScanStarted,
    ScanEnded,
    /// Terminal: the directory could not be read.
    Error(FilerError),
}

impl DirEvent {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Added(_) => "added",
            Self::Removed(_) => "removed",
            Self::Updated(_) => "updated",
            Self::ScanStarted => "scan_started",
            Self::ScanEnded => "scan_ended",
            Self::Error(_) => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);

        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Receiving half held by a view. Dropping it unsubscribes implicitly: the
/// cache prunes senders whose receiver is gone on the next delivery.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    path: Arc<PathBuf>,
    rx: UnboundedReceiver<DirEvent>,
}

impl Subscription {
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    #[must_use]
    pub fn path(&self) -> &Arc<PathBuf> {
        &self.path
    }

    /// Next queued event without waiting.
    pub fn try_next(&mut self) -> Option<DirEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Wait for the next event.
    pub async fn next(&mut self) -> Option<DirEvent> {
        self.rx.recv().await
    }
}

/// Sending half kept by the cache.
#[derive(Debug)]
pub(crate) struct Subscriber {
    id: SubscriptionId,
    tx: UnboundedSender<DirEvent>,
}

impl Subscriber {
    pub(crate) fn pair(path: Arc<PathBuf>) -> (Self, Subscription) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = SubscriptionId::next();

        (Self { id, tx }, Subscription { id, path, rx })
    }

    pub(crate) const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns `false` once the receiving view has gone away.
    pub(crate) fn deliver(&self, event: DirEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}
