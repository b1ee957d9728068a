//! Runtime configuration for the image browser.
//!
//! Values come from built-in defaults, the XDG directories of the current user
//! and a handful of `IMGTHUMB_*` environment variables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::{ProjectDirs, UserDirs};
use tracing::warn;

/// Maximum number of images collected for a single tab.
pub const DEFAULT_MAX_FILES: usize = 1000;

/// Default memory budget for decoded thumbnails.
pub const DEFAULT_THUMB_CACHE_MB: usize = 64;

/// Exclusion list for the home directory (also the Read Only tab roots).
pub const HOME_LIST_FILE: &str = "olpc.files";

/// Exclusion list for mounts and every other scan root.
pub const MEDIA_LIST_FILE: &str = "media.files";

const APP_NAME: &str = "imgthumb";

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Root of the Files tab.
    pub home_dir: PathBuf,
    /// Path to the home exclusion list.
    pub home_list: PathBuf,
    /// Path to the media exclusion list.
    pub media_list: PathBuf,
    /// Cap on images per tab.
    pub max_files: usize,
    /// Directory holding the journal database and its object files.
    pub journal_dir: PathBuf,
    /// Directory for the on-disk thumbnail cache.
    pub thumb_cache_dir: PathBuf,
    /// Memory budget for the thumbnail cache in megabytes.
    pub thumb_cache_mb: usize,
}

impl BrowserConfig {
    /// Builds the configuration from the environment.
    pub fn from_env() -> Result<Self> {
        let proj_dirs = ProjectDirs::from("", "", APP_NAME)
            .context("Failed to determine project directories")?;

        let home_dir = env_path("IMGTHUMB_HOME")
            .or_else(default_home_dir)
            .context("Failed to determine home directory")?;

        Ok(Self {
            home_dir,
            home_list: env_path("IMGTHUMB_HOME_LIST").unwrap_or_else(|| PathBuf::from(HOME_LIST_FILE)),
            media_list: env_path("IMGTHUMB_MEDIA_LIST")
                .unwrap_or_else(|| PathBuf::from(MEDIA_LIST_FILE)),
            max_files: env_usize("IMGTHUMB_MAX_FILES").unwrap_or(DEFAULT_MAX_FILES),
            journal_dir: env_path("IMGTHUMB_JOURNAL_DIR")
                .unwrap_or_else(|| proj_dirs.data_dir().join("journal")),
            thumb_cache_dir: proj_dirs.cache_dir().join("thumbs"),
            thumb_cache_mb: env_usize("IMGTHUMB_THUMB_CACHE_MB").unwrap_or(DEFAULT_THUMB_CACHE_MB),
        })
    }

    /// Configuration rooted entirely below `base`.
    #[cfg(test)]
    pub fn rooted_at(base: &Path) -> Self {
        Self {
            home_dir: base.join("home"),
            home_list: base.join(HOME_LIST_FILE),
            media_list: base.join(MEDIA_LIST_FILE),
            max_files: DEFAULT_MAX_FILES,
            journal_dir: base.join("journal"),
            thumb_cache_dir: base.join("thumbs"),
            thumb_cache_mb: DEFAULT_THUMB_CACHE_MB,
        }
    }

    /// Replaces the Files tab root.
    pub fn with_home_dir(mut self, home_dir: PathBuf) -> Self {
        self.home_dir = home_dir;
        self
    }
}

fn default_home_dir() -> Option<PathBuf> {
    UserDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn env_usize(key: &str) -> Option<usize> {
    let raw = std::env::var(key).ok()?;
    match parse_positive(&raw) {
        Some(value) => Some(value),
        None => {
            warn!(key, value = %raw, "Ignoring invalid configuration value");
            None
        }
    }
}

fn parse_positive(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok().filter(|v| *v > 0)
}
