//! Person model for Roster.
//!
//! A person is the record kept in the `person` table. The `house` column is
//! added by the "Add house" migration and defaults to Gryffindor for rows
//! written before it existed.

use crate::storage::record::Record;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Hogwarts house.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum House {
    Ravenclaw,
    #[default]
    Gryffindor,
    Hufflepuff,
    Slytherin,
}

impl House {
    /// All houses, in display order.
    pub const ALL: [Self; 4] = [
        Self::Gryffindor,
        Self::Hufflepuff,
        Self::Ravenclaw,
        Self::Slytherin,
    ];

    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ravenclaw => "ravenclaw",
            Self::Gryffindor => "gryffindor",
            Self::Hufflepuff => "hufflepuff",
            Self::Slytherin => "slytherin",
        }
    }
}

impl fmt::Display for House {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for House {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ravenclaw" => Ok(Self::Ravenclaw),
            "gryffindor" => Ok(Self::Gryffindor),
            "hufflepuff" => Ok(Self::Hufflepuff),
            "slytherin" => Ok(Self::Slytherin),
            other => Err(format!(
                "unknown house '{other}' (expected gryffindor, hufflepuff, ravenclaw or slytherin)"
            )),
        }
    }
}

impl ToSql for House {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for House {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// A person stored in the roster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Person {
    /// Storage-assigned identity; `None` until inserted
    pub id: Option<i64>,

    pub name: String,

    pub age: i64,

    #[serde(default)]
    pub house: House,
}

impl Person {
    /// Create an unsaved person in the default house.
    pub fn new(name: impl Into<String>, age: i64) -> Self {
        Self {
            id: None,
            name: name.into(),
            age,
            house: House::default(),
        }
    }

    /// Builder-style house override.
    #[must_use]
    pub fn with_house(mut self, house: House) -> Self {
        self.house = house;
        self
    }
}

impl Record for Person {
    const TABLE: &'static str = "person";
    const COLUMNS: &'static [&'static str] = &["name", "age", "house"];

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn did_insert(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get("id")?),
            name: row.get("name")?,
            age: row.get("age")?,
            house: row.get("house")?,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.name.clone()),
            Value::Integer(self.age),
            Value::Text(self.house.as_str().to_string()),
        ]
    }
}
