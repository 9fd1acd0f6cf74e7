//! Configuration management.
//!
//! Resolves where the roster database lives and how the storage layer is
//! tuned. The database is a single SQLite file; tests and short-lived tools
//! can use a private in-memory store instead.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the database file.
pub const DB_ENV: &str = "ROSTER_DB";

/// Default database file name inside the data directory.
pub const DB_FILE_NAME: &str = "roster.db";

/// Where the store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// A database file, created (with parent directories) if absent.
    File(PathBuf),
    /// A private in-memory database that lives as long as its coordinator.
    Memory,
}

/// Storage tuning.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub location: StoreLocation,

    /// How long a connection waits on a locked database before failing.
    pub busy_timeout: Duration,

    /// Reader connections kept open between reads.
    pub max_idle_readers: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            location: StoreLocation::Memory,
            busy_timeout: Duration::from_secs(5),
            max_idle_readers: 4,
        }
    }
}

impl StoreConfig {
    /// File-backed store with default tuning.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: StoreLocation::File(path.into()),
            ..Self::default()
        }
    }

    /// In-memory store with default tuning.
    #[must_use]
    pub fn memory() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_idle_readers(mut self, max: usize) -> Self {
        self.max_idle_readers = max;
        self
    }
}

/// Get the platform data directory for roster.
#[must_use]
pub fn data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "roster").map(|dirs| dirs.data_dir().to_path_buf())
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `ROSTER_DB` environment variable
/// 3. Platform data directory: `<data_dir>/roster.db`
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Explicit path from CLI flag
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: ROSTER_DB environment variable
    if let Ok(db_path) = std::env::var(DB_ENV) {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    // Priority 3: Platform data directory
    data_dir().map(|dir| dir.join(DB_FILE_NAME))
}

/// Resolve a file-backed [`StoreConfig`].
///
/// # Errors
///
/// Returns [`Error::Config`] if no location can be determined.
pub fn resolve_store_config(explicit_path: Option<&Path>) -> Result<StoreConfig> {
    resolve_db_path(explicit_path)
        .map(StoreConfig::file)
        .ok_or_else(|| Error::Config("Could not determine a database location".to_string()))
}
