//! Ordered, named, forward-only schema migrations.
//!
//! Applied names are recorded in the `schema_migrations` table of the store
//! itself, so running a registry against an already-migrated database is a
//! no-op for names it has seen and applies only new ones. Each step runs in
//! its own IMMEDIATE transaction together with its bookkeeping row: a step is
//! either fully applied and recorded, or not at all.

use crate::error::{Error, Result};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info};

type MigrationFn = Box<dyn Fn(&Transaction<'_>) -> Result<()> + Send + Sync>;

/// A single named schema step.
pub struct Migration {
    name: String,
    step: MigrationFn,
}

impl Migration {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Outcome of [`MigrationRegistry::apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct MigrationReport {
    /// Names applied by this run, in order.
    pub applied: Vec<String>,
    /// Registered names that were already recorded as applied.
    pub skipped: usize,
}

impl MigrationReport {
    /// Returns true if this run changed the schema.
    #[must_use]
    pub fn any(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Migrations in registration order.
#[derive(Debug, Default)]
pub struct MigrationRegistry {
    migrations: Vec<Migration>,
}

impl MigrationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step. Steps run in registration order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateMigration`] if the name is already registered.
    pub fn register<F>(&mut self, name: &str, step: F) -> Result<()>
    where
        F: Fn(&Transaction<'_>) -> Result<()> + Send + Sync + 'static,
    {
        if self.migrations.iter().any(|m| m.name == name) {
            return Err(Error::DuplicateMigration {
                name: name.to_string(),
            });
        }
        self.migrations.push(Migration {
            name: name.to_string(),
            step: Box::new(step),
        });
        Ok(())
    }

    /// Register a step that executes a static SQL batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateMigration`] if the name is already registered.
    pub fn register_sql(&mut self, name: &str, sql: &'static str) -> Result<()> {
        self.register(name, move |tx| tx.execute_batch(sql).map_err(Error::from))
    }

    /// Registered names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.migrations.iter().map(Migration::name).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Names recorded as applied in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the bookkeeping table cannot be read.
    pub fn applied(conn: &Connection) -> Result<HashSet<String>> {
        // Read-only connections may call this, so never create the table here
        let tracked = conn
            .prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations'")?
            .exists([])?;
        if !tracked {
            return Ok(HashSet::new());
        }

        let applied = conn
            .prepare("SELECT version FROM schema_migrations")?
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(applied)
    }

    /// Registered names not yet applied, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the bookkeeping table cannot be read.
    pub fn pending(&self, conn: &Connection) -> Result<Vec<&str>> {
        let applied = Self::applied(conn)?;
        Ok(self
            .migrations
            .iter()
            .map(Migration::name)
            .filter(|name| !applied.contains(*name))
            .collect())
    }

    /// Apply every pending step in registration order.
    ///
    /// Halts at the first failing step; steps before it stay applied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Migration`] naming the failed step, or a database
    /// error if the bookkeeping table cannot be read.
    pub fn apply(&self, conn: &mut Connection) -> Result<MigrationReport> {
        ensure_bookkeeping(conn)?;
        let applied = Self::applied(conn)?;
        let mut report = MigrationReport::default();

        for migration in &self.migrations {
            if applied.contains(&migration.name) {
                report.skipped += 1;
                continue;
            }

            info!(version = %migration.name, "Applying migration");
            apply_one(conn, migration).map_err(|e| Error::Migration {
                name: migration.name.clone(),
                source: Box::new(e),
            })?;
            info!(version = %migration.name, "Migration complete");

            report.applied.push(migration.name.clone());
        }

        debug!(
            applied = report.applied.len(),
            skipped = report.skipped,
            "Migrations up to date"
        );
        Ok(report)
    }
}

fn ensure_bookkeeping(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;
    Ok(())
}

fn apply_one(conn: &mut Connection, migration: &Migration) -> Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    (migration.step)(&tx)?;
    tx.execute(
        "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![migration.name, chrono::Utc::now().timestamp_millis()],
    )?;
    tx.commit()?;
    Ok(())
}
