//! SQLite storage layer for Roster.
//!
//! This module provides the persistence layer using SQLite with:
//! - WAL mode for concurrent reads
//! - A single serialized writer with transaction discipline
//! - Named, ordered migrations applied before first use
//! - Post-commit change epochs for live queries
//!
//! # Submodules
//!
//! - [`coordinator`] - Exclusive owner of the store's connections
//! - [`dispatch`] - Change epoch delivery to observers
//! - [`migrations`] - Migration registry
//! - [`record`] - Record contract and CRUD helpers
//! - [`schema`] - Roster's migration sequence

pub mod coordinator;
pub mod dispatch;
pub mod migrations;
pub mod record;
pub mod schema;

pub use coordinator::{AccessCoordinator, MutationContext};
pub use dispatch::{ChangeEpoch, ChangeObserver};
pub use migrations::{Migration, MigrationRegistry, MigrationReport};
pub use record::Record;
pub use schema::default_registry;
