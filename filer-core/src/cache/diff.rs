//! `src/cache/diff.rs`
//!
//! Turns a fresh scan into the minimal Added / Removed / Updated sets
//! against the current snapshot. Linear in the size of both listings:
//! the old side is already a hash map and the new side is indexed once.

use std::{
    ffi::{OsStr, OsString},
    hash::BuildHasher,
    sync::Arc,
};

use ahash::AHashSet;
use indexmap::IndexMap;
use tracing::error;

use crate::fs::entry::DirectoryEntry;

#[derive(Debug, Default, Clone)]
pub struct DirDiff {
    /// New leafnames, in scan order.
    pub added: Vec<Arc<DirectoryEntry>>,

    /// Vanished entries (their last known state), in prior snapshot order.
    pub removed: Vec<Arc<DirectoryEntry>>,

    /// Replacement entries for leafnames whose metadata changed.
    pub updated: Vec<Arc<DirectoryEntry>>,
}

impl DirDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.updated.len()
    }
}

/// Compare `old` against a freshly scanned `new` listing.
///
/// A leafname appearing twice in `new` cannot come from a real directory
/// read; debug builds assert, release builds keep the first occurrence.
pub fn diff<S: BuildHasher>(
    old: &IndexMap<OsString, Arc<DirectoryEntry>, S>,
    new: Vec<DirectoryEntry>,
) -> DirDiff {
    let new: Vec<Arc<DirectoryEntry>> = new.into_iter().map(Arc::new).collect();
    let mut seen: AHashSet<&OsStr> = AHashSet::with_capacity(new.len());
    let mut out = DirDiff::default();

    for entry in &new {
        if !seen.insert(entry.name()) {
            error!(
                marker = "DIR_DIFF",
                leafname = entry.leafname(),
                "Duplicate leafname in directory scan"
            );
            debug_assert!(false, "duplicate leafname {:?} in scan", entry.name());
            continue;
        }

        match old.get(entry.name()) {
            None => out.added.push(Arc::clone(entry)),
            Some(previous) if **previous != **entry => out.updated.push(Arc::clone(entry)),
            Some(_) => {}
        }
    }

    out.removed = old
        .iter()
        .filter(|(name, _)| !seen.contains(name.as_os_str()))
        .map(|(_, entry)| Arc::clone(entry))
        .collect();

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::snapshot::DirectorySnapshot;
    use crate::fs::entry::EntryMetadata;
    use std::{
        path::PathBuf,
        time::{Duration, UNIX_EPOCH},
    };

    fn snapshot_of(entries: &[DirectoryEntry]) -> DirectorySnapshot {
        let mut snap = DirectorySnapshot::new(Arc::new(PathBuf::from("/d")));
        let initial = diff(snap.entry_map(), entries.to_vec());
        snap.apply(&initial);
        snap
    }

    fn names(batch: &[Arc<DirectoryEntry>]) -> Vec<&str> {
        batch.iter().map(|e| e.leafname()).collect()
    }

    #[test]
    fn classifies_added_removed_updated() {
        let snap = snapshot_of(&[
            DirectoryEntry::file("keep", 1),
            DirectoryEntry::file("grow", 1),
            DirectoryEntry::file("gone", 1),
        ]);

        let result = diff(
            snap.entry_map(),
            vec![
                DirectoryEntry::file("new", 3),
                DirectoryEntry::file("keep", 1),
                DirectoryEntry::file("grow", 2),
            ],
        );

        assert_eq!(names(&result.added), vec!["new"]);
        assert_eq!(names(&result.removed), vec!["gone"]);
        assert_eq!(names(&result.updated), vec!["grow"]);
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn identical_scans_produce_nothing() {
        let listing = vec![DirectoryEntry::file("a", 1), DirectoryEntry::directory("b")];
        let snap = snapshot_of(&listing);

        assert!(diff(snap.entry_map(), listing).is_empty());
    }

    #[test]
    fn added_follow_scan_order_and_removed_follow_snapshot_order() {
        let snap = snapshot_of(&[
            DirectoryEntry::file("z", 1),
            DirectoryEntry::file("m", 1),
            DirectoryEntry::file("a", 1),
        ]);

        let result = diff(
            snap.entry_map(),
            vec![DirectoryEntry::file("q", 1), DirectoryEntry::file("b", 1)],
        );

        assert_eq!(names(&result.added), vec!["q", "b"]);
        assert_eq!(names(&result.removed), vec!["z", "m", "a"]);
    }

    #[test]
    fn applying_diff_reproduces_the_new_scan() {
        let stamp = |secs| EntryMetadata {
            size: 4,
            modified: UNIX_EPOCH + Duration::from_secs(secs),
            mode: 0o644,
        };

        let scans: Vec<Vec<DirectoryEntry>> = vec![
            vec![
                DirectoryEntry::file("a", 1),
                DirectoryEntry::file("b", 2),
                DirectoryEntry::directory("c"),
            ],
            vec![
                DirectoryEntry::file("b", 2).with_metadata(stamp(10)),
                DirectoryEntry::directory("c"),
                DirectoryEntry::file("d", 7),
            ],
            vec![],
            vec![DirectoryEntry::file("a", 1), DirectoryEntry::file(".x", 0)],
        ];

        let mut snap = DirectorySnapshot::new(Arc::new(PathBuf::from("/d")));

        for scan in scans {
            let result = diff(snap.entry_map(), scan.clone());
            snap.apply(&result);

            let mut got: Vec<DirectoryEntry> =
                snap.entries().map(|e| DirectoryEntry::clone(e)).collect();
            let mut want = scan;
            got.sort_by(|a, b| a.leafname().cmp(b.leafname()));
            want.sort_by(|a, b| a.leafname().cmp(b.leafname()));

            assert_eq!(got, want);
        }
    }

    #[cfg(unix)]
    #[test]
    fn names_that_display_alike_stay_separate() {
        use crate::fs::entry::{BaseType, EntryFlags};
        use std::os::unix::ffi::OsStrExt;

        let raw = |bytes: &[u8]| {
            let name = OsStr::from_bytes(bytes);
            DirectoryEntry::from_os_name(
                name,
                BaseType::File,
                EntryFlags::empty(),
                EntryMetadata::default(),
            )
        };

        let snap = snapshot_of(&[raw(b"a\xff")]);
        let result = diff(snap.entry_map(), vec![raw(b"a\xff"), raw(b"a\xfe")]);

        assert_eq!(result.added.len(), 1);
        assert_eq!(result.added[0].name().as_bytes(), b"a\xfe");
        assert!(result.removed.is_empty());
        assert!(result.updated.is_empty());
    }
}
