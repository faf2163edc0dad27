//! `src/fs/paths.rs`
//!
//! Lexical path helpers. Snapshots are keyed by the normalised absolute
//! path, so every lookup goes through [`canonical_path`].

use std::{
    ffi::OsStr,
    path::{Component, Path, PathBuf},
};

use crate::error::{FilerError, FilerResult};

/// Make `path` absolute (relative paths resolve against `base`) and drop
/// `.`/`..` components. Does not touch the filesystem.
pub fn resolve(base: &Path, path: &Path) -> FilerResult<PathBuf> {
    if path.is_absolute() {
        canonical_path(path)
    } else {
        canonical_path(&base.join(path))
    }
}

/// Normalise an absolute path without resolving symlinks.
pub fn canonical_path(path: &Path) -> FilerResult<PathBuf> {
    if !path.is_absolute() {
        return Err(FilerError::directory_unavailable(
            path,
            "path is not absolute",
        ));
    }

    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(name) => out.push(name),
        }
    }

    Ok(out)
}

/// Parent directory and the raw leafname we came from, or `None` at the root.
#[must_use]
pub fn split_parent(path: &Path) -> Option<(&Path, &OsStr)> {
    let parent = path.parent()?;
    let leaf = path.file_name()?;

    Some((parent, leaf))
}

/// True when `path` is `ancestor` itself or lies below it. Works on whole
/// components, so `/tmp/ab` is not inside `/tmp/a`.
#[must_use]
pub fn is_within(path: &Path, ancestor: &Path) -> bool {
    path.starts_with(ancestor)
}
