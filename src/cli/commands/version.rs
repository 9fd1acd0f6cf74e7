//! Version command implementation.

use crate::error::Result;
use crate::storage::default_registry;
use serde::Serialize;

#[derive(Serialize)]
struct VersionOutput<'a> {
    version: &'a str,
    build: &'a str,
    migrations: Vec<&'a str>,
}

/// Execute the version command.
///
/// Also lists the schema migrations this build knows how to apply.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    let build = if cfg!(debug_assertions) { "dev" } else { "release" };
    let registry = default_registry();

    if json {
        let output = VersionOutput {
            version,
            build,
            migrations: registry.names(),
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("roster version {version} ({build})");
    println!("schema: {}", registry.names().join(" -> "));
    Ok(())
}
