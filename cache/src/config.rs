//! Cache configuration.

use std::path::{Path, PathBuf};

/// Name of the database file inside the cache directory.
pub const DB_NAME: &str = "authd.db";

/// Name of the marker requesting a wipe at next open.
pub const DIRTY_FLAG_NAME: &str = "authd.db.dirty";

/// Default number of wipe-and-retry rounds on a corrupted database.
pub const DEFAULT_OPEN_RETRIES: u32 = 3;

/// Configuration of the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Directory holding the database and its dirty marker.
    pub dir: PathBuf,

    /// Wipe-and-retry rounds after a corruption-class open error.
    ///
    /// Default: 3
    pub open_retries: u32,
}

impl CacheConfig {
    /// Create a configuration for `dir` with default values.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            open_retries: DEFAULT_OPEN_RETRIES,
        }
    }

    /// Set the number of open retries.
    #[must_use]
    pub const fn with_open_retries(mut self, retries: u32) -> Self {
        self.open_retries = retries;
        self
    }

    /// Path of the database file.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.dir.join(DB_NAME)
    }

    /// Path of the dirty marker.
    #[must_use]
    pub fn dirty_flag_path(&self) -> PathBuf {
        self.dir.join(DIRTY_FLAG_NAME)
    }

    /// Cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
