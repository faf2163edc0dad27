//! src/view/activate.rs
//!
//! What activating an item means. The window layer decodes clicks and key
//! presses into an index plus [`OpenFlags`]; this module turns that into an
//! [`OpenAction`]. Spawning processes for launches is left to the caller.

use std::path::{Path, PathBuf};

use bitflags::bitflags;

use crate::{fs::entry::DirectoryEntry, view::controller::ViewKind};

bitflags! {
    /// Modifiers that came with the activation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpenFlags: u8 {
        /// Treat an application directory as a plain directory.
        const SHIFT        = 1 << 0;
        /// Navigate this window instead of opening another one.
        const SAME_WINDOW  = 1 << 1;
        /// Close this window after a successful launch.
        const CLOSE_WINDOW = 1 << 2;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenAction {
    /// The view has already been pointed at `path`.
    ChangeDirectory { path: PathBuf },

    /// The caller should open a new window on `path`.
    OpenWindow { path: PathBuf },

    /// The caller should run or open `path`.
    Launch { path: PathBuf, close_window: bool },
}

impl OpenAction {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::ChangeDirectory { path } | Self::OpenWindow { path } | Self::Launch { path, .. } => {
                path
            }
        }
    }

    /// Whether the activating view stays on its directory.
    #[must_use]
    pub const fn keeps_view(&self) -> bool {
        !matches!(self, Self::ChangeDirectory { .. })
    }
}

/// Decide what to do with `entry` (living in `dir`) in a view of `kind`.
/// `ChangeDirectory` here is a request; the controller performs the
/// navigation before reporting it.
#[must_use]
pub fn resolve(dir: &Path, entry: &DirectoryEntry, flags: OpenFlags, kind: ViewKind) -> OpenAction {
    let path = dir.join(entry.name());
    let browse = entry.is_dir() && (!entry.is_app_dir() || flags.contains(OpenFlags::SHIFT));

    if browse {
        if flags.contains(OpenFlags::SAME_WINDOW) {
            OpenAction::ChangeDirectory { path }
        } else {
            OpenAction::OpenWindow { path }
        }
    } else {
        OpenAction::Launch {
            path,
            close_window: flags.contains(OpenFlags::CLOSE_WINDOW) && kind != ViewKind::Panel,
        }
    }
}
