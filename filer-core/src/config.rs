//! src/config.rs
//! ============================================================================
//! # Config: Filer Configuration Loader and Saver (directories only)
//!
//! User-editable settings for the filer core, stored as TOML in the
//! platform config directory found through
//! [`directories`](https://docs.rs/directories).
//!
//! The core never reads this at random: views receive an immutable
//! [`ViewOptions`] at the point of use and the cache is built from a
//! [`CacheConfig`].
//!
//! ## Example
//! ```rust,ignore
//! let config = Config::load().await?;
//! let options = config.view_options();
//! ```

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tokio::fs as TokioFs;
use tracing::info;

pub use crate::view::sort::EntrySort;
use crate::{
    error::{FilerError, FilerResult},
    logging::LoggerConfig,
};

/// Snapshot retention for released directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long a snapshot nobody references stays around for reuse.
    /// `0s` destroys it on the last release.
    #[serde(with = "humantime_serde")]
    pub release_grace: Duration,

    /// Upper bound on retained zero-reference snapshots.
    pub max_retained: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            release_grace: Duration::from_secs(30),
            max_retained: 32,
        }
    }
}

/// Per-view presentation options, handed to views by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ViewOptions {
    pub show_hidden: bool,

    pub sort: EntrySort,

    pub dirs_first: bool,
}

impl ViewOptions {
    #[must_use]
    pub const fn with_hidden(mut self, show_hidden: bool) -> Self {
        self.show_hidden = show_hidden;
        self
    }

    #[must_use]
    pub const fn with_sort(mut self, sort: EntrySort) -> Self {
        self.sort = sort;
        self
    }
}

/// Main configuration struct for the filer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub show_hidden: bool,

    pub sort: EntrySort,

    pub dirs_first: bool,

    /// At most one non-panel window per directory.
    pub unique_windows: bool,

    pub cache: CacheConfig,

    #[serde(default)] // Older files have no logging table
    pub logging: LoggerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            show_hidden: false,
            sort: EntrySort::NameAsc,
            dirs_first: true,
            unique_windows: false,
            cache: CacheConfig::default(),
            logging: LoggerConfig::default(),
        }
    }
}

impl Config {
    #[must_use]
    pub const fn view_options(&self) -> ViewOptions {
        ViewOptions {
            show_hidden: self.show_hidden,
            sort: self.sort,
            dirs_first: self.dirs_first,
        }
    }

    /// Loads config from the platform config dir, writing the defaults there
    /// when no file exists yet.
    pub async fn load() -> FilerResult<Self> {
        let path = Self::config_path()?;

        if TokioFs::try_exists(&path).await.unwrap_or(false) {
            Self::load_from(&path).await
        } else {
            info!(
                "No config file found at {}, using default configuration. Creating it now.",
                path.display()
            );

            let default_config = Self::default();
            default_config.save_to(&path).await?;

            Ok(default_config)
        }
    }

    pub async fn load_from(path: &Path) -> FilerResult<Self> {
        info!("Loading config from {}", path.display());

        let text = TokioFs::read_to_string(path)
            .await
            .map_err(|source| FilerError::ConfigIo {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(toml::from_str(&text)?)
    }

    pub async fn save(&self) -> FilerResult<()> {
        self.save_to(&Self::config_path()?).await
    }

    pub async fn save_to(&self, path: &Path) -> FilerResult<()> {
        info!("Saving config to {}", path.display());

        let io_err = |source| FilerError::ConfigIo {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            TokioFs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        TokioFs::write(path, toml_str).await.map_err(io_err)?;

        Ok(())
    }

    /// Returns the canonical config file path using `directories::ProjectDirs`.
    pub fn config_path() -> FilerResult<PathBuf> {
        let proj_dirs =
            ProjectDirs::from("org", "filer", "Filer").ok_or(FilerError::ConfigDirUnavailable)?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }
}
