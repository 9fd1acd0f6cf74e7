//! Watch command implementation.

use crate::cli::commands::open_store;
use crate::cli::commands::person::print_people;
use crate::error::{Error, Result};
use crate::feature::{Action, Feature};
use crate::model::{House, Person};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Execute the watch command.
///
/// Prints the current list, then applies person commands read from stdin,
/// one per line, and prints the list again whenever a committed write changes
/// it. Only writes made through this process are seen. Stops at end of
/// input, on Ctrl-C, or after `seconds`.
///
/// Input lines:
/// - `add <name> [age] [house]`
/// - `set-age <id> <age>`
/// - `delete <id>`
///
/// A bad line is reported on stderr and skipped.
///
/// # Errors
///
/// Returns an error if the store cannot be opened, stdin cannot be read,
/// or the runtime fails to start.
pub fn execute(seconds: Option<u64>, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let store = open_store(db_path)?;
    let feature = Feature::new(store.clone());
    let mut changes = feature.state().watch();

    print_people(&feature.people(), json)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let outcome = runtime.block_on(async {
        let deadline = async {
            match seconds {
                Some(s) => tokio::time::sleep(Duration::from_secs(s)).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = changes.borrow_and_update().clone();
                    print_people(&current, json)?;
                }
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        break;
                    };
                    if let Err(e) = apply_line(&feature, &line) {
                        report(&e, json);
                    }
                }
                _ = tokio::signal::ctrl_c() => break,
                () = &mut deadline => break,
            }
        }
        Ok::<(), Error>(())
    });

    // A pending stdin read cannot be cancelled; don't wait on it
    runtime.shutdown_background();
    outcome?;

    // Show what the last writes changed before exiting
    store.flush_notifications();
    if changes.has_changed().unwrap_or(false) {
        print_people(&changes.borrow_and_update(), json)?;
    }
    Ok(())
}

fn apply_line(feature: &Feature, line: &str) -> Result<()> {
    match parse_action(line)? {
        Some(action) => feature.send(action).map(|_| ()),
        None => Ok(()),
    }
}

fn report(error: &Error, json: bool) {
    if json {
        eprintln!("{}", error.to_structured_json());
    } else {
        eprintln!("Error: {error}");
    }
}

/// Parse one input line. Blank lines and `#` comments yield `None`.
pub(crate) fn parse_action(line: &str) -> Result<Option<Action>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    if verb.starts_with('#') {
        return Ok(None);
    }

    let args: Vec<&str> = words.collect();
    let action = match (verb, args.as_slice()) {
        ("add", [name, rest @ ..]) if rest.len() <= 2 => {
            let age = rest.first().map(|a| parse_int(a)).transpose()?.unwrap_or(30);
            let house = rest
                .get(1)
                .map(|h| h.parse::<House>().map_err(Error::InvalidArgument))
                .transpose()?
                .unwrap_or_default();
            Action::AddPerson(Person::new(*name, age).with_house(house))
        }
        ("set-age", [id, age]) => Action::UpdatePersonAge(parse_int(id)?, parse_int(age)?),
        ("delete", [id]) => Action::PersonDeleted(parse_int(id)?),
        _ => {
            return Err(Error::InvalidArgument(format!(
                "unrecognized input: {}",
                line.trim()
            )));
        }
    };
    Ok(Some(action))
}

fn parse_int(word: &str) -> Result<i64> {
    word.parse()
        .map_err(|_| Error::InvalidArgument(format!("not a number: {word}")))
}
