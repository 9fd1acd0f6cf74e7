//! Value-typed fetch descriptions.

use crate::error::Result;
use crate::model::{House, IdentifiedVec, Person};
use crate::storage::record::{self, Record};
use rusqlite::types::Value;
use rusqlite::Connection;
use std::fmt::Debug;
use std::hash::Hash;

/// What to fetch, plus how.
///
/// Queries are plain values: two queries describing the same fetch are equal
/// and hash equal. They own no state, so a bridge can re-run one any number
/// of times.
pub trait Query: Debug + Clone + Eq + Hash + Send + Sync + 'static {
    /// Result of the fetch; compared by value to detect changes.
    type Value: Clone + PartialEq + Send + Sync + 'static;

    /// Run the fetch against a storage handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying statement fails.
    fn fetch(&self, conn: &Connection) -> Result<Self::Value>;

    /// Tables the fetch reads. Empty means unknown: re-run after every write.
    fn tables(&self) -> &'static [&'static str] {
        &[]
    }
}

const PEOPLE_TABLES: &[&str] = &[Person::TABLE];

/// The people fetches roster knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeopleQuery {
    /// Everyone, by identity.
    All,
    /// At most one person.
    ById(i64),
    InHouse(House),
    /// Strictly older than the given age.
    OlderThan(i64),
}

impl Query for PeopleQuery {
    type Value = IdentifiedVec<Person>;

    fn fetch(&self, conn: &Connection) -> Result<Self::Value> {
        let people = match *self {
            Self::All => record::fetch_all::<Person>(conn)?,
            Self::ById(id) => record::fetch_where(conn, "\"id\" = ?1", vec![Value::Integer(id)])?,
            Self::InHouse(house) => record::fetch_where(
                conn,
                "\"house\" = ?1",
                vec![Value::Text(house.as_str().to_string())],
            )?,
            Self::OlderThan(age) => {
                record::fetch_where(conn, "\"age\" > ?1", vec![Value::Integer(age)])?
            }
        };
        Ok(IdentifiedVec::new(people))
    }

    fn tables(&self) -> &'static [&'static str] {
        PEOPLE_TABLES
    }
}
