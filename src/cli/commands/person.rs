//! Person command implementations.

use crate::cli::commands::open_store;
use crate::error::{Error, Result};
use crate::feature::{delete_person, insert_person, set_person_age};
use crate::model::{House, IdentifiedVec, Person};
use crate::observation::{PeopleQuery, Query};
use crate::storage::record::{self, Record};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

/// Output for list.
#[derive(Serialize)]
struct ListOutput<'a> {
    people: &'a IdentifiedVec<Person>,
    count: usize,
}

/// Output for delete.
#[derive(Serialize)]
struct DeleteOutput {
    id: i64,
    deleted: bool,
}

/// Execute the add command.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the insert fails.
pub fn add(name: &str, age: i64, house: Option<House>, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidArgument("name must not be empty".to_string()));
    }

    let store = open_store(db_path)?;
    let person = insert_person(&store, Person::new(name.trim(), age).with_house(house.unwrap_or_default()))?;

    if json {
        println!("{}", serde_json::to_string(&person)?);
    } else {
        println!(
            "Added {} {}",
            format!("#{}", person.id.unwrap_or_default()).cyan(),
            describe(&person)
        );
    }
    Ok(())
}

/// Execute the list command.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or read.
pub fn list(house: Option<House>, older_than: Option<i64>, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let store = open_store(db_path)?;
    let query = match (house, older_than) {
        (Some(house), _) => PeopleQuery::InHouse(house),
        (None, Some(age)) => PeopleQuery::OlderThan(age),
        (None, None) => PeopleQuery::All,
    };

    // Listing surfaces read errors instead of falling back like a bound view
    let people = store.read(|conn| query.fetch(conn))?;
    print_people(&people, json)
}

/// Execute the show command.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if no person has the ID.
pub fn show(id: i64, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let store = open_store(db_path)?;
    let person: Person = store
        .read(|conn| record::fetch_one(conn, id))?
        .ok_or(Error::NotFound {
            table: Person::TABLE,
            id,
        })?;

    if json {
        println!("{}", serde_json::to_string(&person)?);
    } else {
        println!("{} {}", format!("#{id}").cyan(), describe(&person));
    }
    Ok(())
}

/// Execute the set-age command.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if no person has the ID.
pub fn set_age(id: i64, age: i64, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let store = open_store(db_path)?;
    let person = set_person_age(&store, id, age)?;

    if json {
        println!("{}", serde_json::to_string(&person)?);
    } else {
        println!("Updated {} {}", format!("#{id}").cyan(), describe(&person));
    }
    Ok(())
}

/// Execute the delete command.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if no person has the ID.
pub fn delete(id: i64, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let store = open_store(db_path)?;
    delete_person(&store, id)?;

    if json {
        println!("{}", serde_json::to_string(&DeleteOutput { id, deleted: true })?);
    } else {
        println!("Deleted {}", format!("#{id}").cyan());
    }
    Ok(())
}

pub(crate) fn print_people(people: &IdentifiedVec<Person>, json: bool) -> Result<()> {
    if json {
        let output = ListOutput {
            people,
            count: people.len(),
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if people.is_empty() {
        println!("{}", "No people yet.".dimmed());
        return Ok(());
    }

    for person in people {
        println!(
            "{:>5}  {}",
            format!("#{}", person.id.unwrap_or_default()).cyan(),
            describe(person)
        );
    }
    println!("{}", format!("{} total", people.len()).dimmed());
    Ok(())
}

fn describe(person: &Person) -> String {
    format!(
        "Name: {} Age: {} House: {}",
        person.name.bold(),
        person.age,
        person.house
    )
}
