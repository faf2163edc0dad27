//! ``src/view/sort.rs``
//!
//! Per-view comparators. Every ordering ends with a leafname tie-break, so
//! equal keys never jitter between re-sorts.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::fs::entry::DirectoryEntry;

/// Sort mode for directory views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySort {
    #[default]
    NameAsc,
    NameDesc,
    SizeAsc,
    SizeDesc,
    ModifiedAsc,
    ModifiedDesc,
    TypeAsc,
    TypeDesc,
}

impl EntrySort {
    #[must_use]
    pub const fn is_descending(self) -> bool {
        matches!(
            self,
            Self::NameDesc | Self::SizeDesc | Self::ModifiedDesc | Self::TypeDesc
        )
    }

    /// Primary key only; no tie-break, no direction.
    fn key_order(self, a: &DirectoryEntry, b: &DirectoryEntry) -> Ordering {
        match self {
            Self::NameAsc | Self::NameDesc => a.leafname().cmp(b.leafname()),
            Self::SizeAsc | Self::SizeDesc => a.size().cmp(&b.size()),
            Self::ModifiedAsc | Self::ModifiedDesc => a.modified().cmp(&b.modified()),
            Self::TypeAsc | Self::TypeDesc => a.base_type().rank().cmp(&b.base_type().rank()),
        }
    }
}

impl std::fmt::Display for EntrySort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s: &'_ str = match self {
            Self::NameAsc => "name_asc",
            Self::NameDesc => "name_desc",
            Self::SizeAsc => "size_asc",
            Self::SizeDesc => "size_desc",
            Self::ModifiedAsc => "modified_asc",
            Self::ModifiedDesc => "modified_desc",
            Self::TypeAsc => "type_asc",
            Self::TypeDesc => "type_desc",
        };

        write!(f, "{s}")
    }
}

/// Total order used by views: optional directories-first grouping, then the
/// sort key in the requested direction, then leafname ascending. Names that
/// only display alike fall back to their raw bytes.
#[must_use]
pub fn compare(
    a: &DirectoryEntry,
    b: &DirectoryEntry,
    sort: EntrySort,
    dirs_first: bool,
) -> Ordering {
    if dirs_first {
        match (a.is_dir(), b.is_dir()) {
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }
    }

    let key = sort.key_order(a, b);
    let key = if sort.is_descending() { key.reverse() } else { key };

    key.then_with(|| a.leafname().cmp(b.leafname()))
        .then_with(|| a.name().cmp(b.name()))
}
