pub mod error;

pub mod config;

pub mod cache {
    pub mod diff;
    pub use diff::{DirDiff, diff};

    pub mod events;
    pub use events::{DirEvent, EntryBatch, Subscription, SubscriptionId};

    pub mod snapshot;
    pub use snapshot::{DirectorySnapshot, ScanState, SnapshotHandle};

    pub mod directory_cache;
    pub use directory_cache::{
        CacheStats, CacheStatsSnapshot, DirectoryCache, RescanOutcome, ScanCompletion,
    };
}

pub mod fs {
    pub mod entry;
    pub use entry::{BaseType, DirectoryEntry, EntryFlags, EntryMetadata, LinkTarget};

    pub mod paths;

    pub mod scanner;
}

pub mod view {
    pub mod activate;
    pub use activate::{OpenAction, OpenFlags};

    pub mod controller;
    pub use controller::{Direction, ScanStatus, ViewController, ViewId, ViewItem, ViewKind};

    pub mod observer;
    pub use observer::{ItemsChanged, NullObserver, RecordingObserver, ViewObserver};

    pub mod sort;
    pub use sort::EntrySort;
}

pub mod registry;
pub use registry::{ViewHandle, WindowRegistry};

pub mod logging;
pub use logging::LoggerBuilder;

pub use cache::DirectoryCache;
pub use config::{CacheConfig, Config, ViewOptions};
pub use error::{FilerError, FilerResult};
