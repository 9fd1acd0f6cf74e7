//! Migrate command implementation.

use crate::config::resolve_store_config;
use crate::error::Result;
use crate::storage::{default_registry, AccessCoordinator, MigrationRegistry};
use std::path::PathBuf;

/// Execute the migrate command.
///
/// Opens the store without applying anything, then applies the roster
/// registry so the report lists exactly what this run changed.
///
/// # Errors
///
/// Returns an error naming the failed step if a migration fails.
pub fn execute(db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let config = resolve_store_config(db_path.map(PathBuf::as_path))?;
    let store = AccessCoordinator::open(config, &MigrationRegistry::new())?;
    let report = store.apply_migrations(&default_registry())?;

    if json {
        println!("{}", serde_json::to_string(&report)?);
        return Ok(());
    }

    if report.applied.is_empty() {
        println!("Schema up to date ({} migrations applied)", report.skipped);
    } else {
        for name in &report.applied {
            println!("Applied: {name}");
        }
    }
    Ok(())
}
