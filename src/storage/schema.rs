//! Roster schema, expressed as the default migration sequence.

use crate::storage::migrations::MigrationRegistry;

/// Creates the `person` table.
pub const CREATE_PEOPLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS person (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    age INTEGER NOT NULL
);
"#;

/// Adds the `house` column. Rows that predate it are Gryffindor.
pub const ADD_HOUSE_SQL: &str = r#"
ALTER TABLE person ADD COLUMN house TEXT NOT NULL DEFAULT 'gryffindor';
CREATE INDEX IF NOT EXISTS idx_person_house ON person(house);
"#;

/// The registry every roster store is opened with.
#[must_use]
pub fn default_registry() -> MigrationRegistry {
    let mut registry = MigrationRegistry::new();
    for (name, sql) in [("Create people", CREATE_PEOPLE_SQL), ("Add house", ADD_HOUSE_SQL)] {
        let registered = registry.register_sql(name, sql);
        debug_assert!(registered.is_ok(), "duplicate default migration {name}");
    }
    registry
}
