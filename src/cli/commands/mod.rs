//! Command implementations.

pub mod migrate;
pub mod person;
pub mod version;
pub mod watch;

use crate::config::resolve_store_config;
use crate::error::Result;
use crate::storage::{default_registry, AccessCoordinator};
use std::path::PathBuf;

/// Open the roster store, applying migrations on first use.
///
/// # Errors
///
/// Returns an error if no location resolves, the store cannot be opened,
/// or a migration fails.
pub fn open_store(db_path: Option<&PathBuf>) -> Result<AccessCoordinator> {
    let config = resolve_store_config(db_path.map(PathBuf::as_path))?;
    AccessCoordinator::open(config, &default_registry())
}
