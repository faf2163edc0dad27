//! src/error.rs
//! ============================================================================
//! # `FilerError`: Unified Error Type for the Directory Core
//!
//! Every fallible operation in the cache, the scanner and the views returns
//! `FilerResult<T>`. Scan failures travel to subscribers inside
//! `DirEvent::Error`, so the type is cheaply cloneable.

use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

use compact_str::{CompactString, ToCompactString};
use thiserror::Error;

/// Convenient alias carrying the crate error type.
pub type FilerResult<T> = Result<T, FilerError>;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum FilerError {
    // ────────────────────────────────────────────────────────────
    // Directory access
    // ────────────────────────────────────────────────────────────
    /// Directory missing at lookup or scan time.
    #[error("Directory not found: {path:?}")]
    PathNotFound { path: PathBuf },

    /// Directory exists but cannot be read.
    #[error("Permission denied: {path:?}")]
    PermissionDenied { path: PathBuf },

    /// A view could not be pointed at a directory.
    #[error("Directory {path:?} is not accessible: {reason}")]
    DirectoryUnavailable {
        path: PathBuf,
        reason: CompactString,
    },

    /// Operation needs an attached view.
    #[error("View is not attached to a directory")]
    NotAttached,

    /// Standard IO error, auto-converted from `io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // ────────────────────────────────────────────────────────────
    // Configuration & logging
    // ────────────────────────────────────────────────────────────
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Failed to access config file {path:?}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Could not determine the config directory")]
    ConfigDirUnavailable,

    #[error("Logging error: {0}")]
    Logging(CompactString),

    /// Any other error, with description.
    #[error("Unexpected error: {0}")]
    Other(CompactString),
}

impl FilerError {
    /// Classify an `io::Error` raised while touching `path`.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            ErrorKind::NotFound | ErrorKind::NotADirectory => Self::PathNotFound {
                path: path.to_path_buf(),
            },
            ErrorKind::PermissionDenied => Self::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => Self::Io(err),
        }
    }

    pub fn path_not_found<P: Into<PathBuf>>(path: P) -> Self {
        Self::PathNotFound { path: path.into() }
    }

    pub fn directory_unavailable<P, S>(path: P, reason: S) -> Self
    where
        P: Into<PathBuf>,
        S: Into<CompactString>,
    {
        Self::DirectoryUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// The directory is gone for good; the view should close or warn.
    #[inline]
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::PathNotFound { .. }
                | Self::PermissionDenied { .. }
                | Self::DirectoryUnavailable { .. }
        )
    }

    /// Value for the `operation_type` log field.
    #[inline]
    #[must_use]
    pub const fn operation_type(&self) -> &'static str {
        match self {
            Self::PathNotFound { .. }
            | Self::PermissionDenied { .. }
            | Self::DirectoryUnavailable { .. } => "path_access",
            Self::NotAttached => "view_state",
            Self::Io(_) => "file_system",
            Self::ConfigParse(_)
            | Self::ConfigSerialize(_)
            | Self::ConfigIo { .. }
            | Self::ConfigDirUnavailable => "config",
            Self::Logging(_) => "logging",
            Self::Other(_) => "other",
        }
    }
}

// Manual Clone implementation to handle non-Clone fields
impl Clone for FilerError {
    fn clone(&self) -> Self {
        match self {
            Self::PathNotFound { path } => Self::PathNotFound { path: path.clone() },
            Self::PermissionDenied { path } => Self::PermissionDenied { path: path.clone() },
            Self::DirectoryUnavailable { path, reason } => Self::DirectoryUnavailable {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::NotAttached => Self::NotAttached,
            Self::Io(e) => Self::Io(io::Error::new(e.kind(), e.to_string())),
            Self::ConfigParse(e) => Self::Other(e.to_compact_string()),
            Self::ConfigSerialize(e) => Self::Other(e.to_compact_string()),
            Self::ConfigIo { path, source } => Self::ConfigIo {
                path: path.clone(),
                source: io::Error::new(source.kind(), source.to_string()),
            },
            Self::ConfigDirUnavailable => Self::ConfigDirUnavailable,
            Self::Logging(msg) => Self::Logging(msg.clone()),
            Self::Other(msg) => Self::Other(msg.clone()),
        }
    }
}
