//! Persisted record contract and CRUD helpers.
//!
//! A [`Record`] is a plain value with an optional integer identity. The
//! identity is `None` until storage assigns one on insert and never changes
//! afterwards. All helpers take a borrowed connection (usually the
//! transaction handed out by [`AccessCoordinator::write`]) so that they
//! compose inside a single write.
//!
//! [`AccessCoordinator::write`]: crate::storage::AccessCoordinator::write

use crate::error::{Error, Result};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};

/// A row-mapped entity stored in a single table with an `id INTEGER PRIMARY KEY`.
pub trait Record: Sized {
    /// Table holding this record type.
    const TABLE: &'static str;

    /// Attribute columns, in [`Record::values`] order. Excludes `id`.
    const COLUMNS: &'static [&'static str];

    /// Storage-assigned identity, `None` if never persisted.
    fn id(&self) -> Option<i64>;

    /// Called once after a successful insert with the new row id.
    fn did_insert(&mut self, id: i64);

    /// Decode a row selected with [`select_sql`].
    ///
    /// # Errors
    ///
    /// Returns an error if a column is missing or has the wrong type.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Encode the attribute columns.
    fn values(&self) -> Vec<Value>;
}

/// `SELECT id, <columns> FROM <table>` for a record type.
#[must_use]
pub fn select_sql<R: Record>() -> String {
    let mut columns = vec!["\"id\"".to_string()];
    columns.extend(R::COLUMNS.iter().map(|c| format!("\"{c}\"")));
    format!("SELECT {} FROM \"{}\"", columns.join(", "), R::TABLE)
}

/// Insert a new record and write the assigned identity back into it.
///
/// # Errors
///
/// Returns [`Error::IdentityAssigned`] if the record already has an identity,
/// or a database error if the insert fails.
pub fn insert<R: Record>(conn: &Connection, record: &mut R) -> Result<i64> {
    if let Some(id) = record.id() {
        return Err(Error::IdentityAssigned {
            table: R::TABLE,
            id,
        });
    }

    let columns: Vec<String> = R::COLUMNS.iter().map(|c| format!("\"{c}\"")).collect();
    let placeholders: Vec<String> = (1..=R::COLUMNS.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO \"{}\" ({}) VALUES ({})",
        R::TABLE,
        columns.join(", "),
        placeholders.join(", ")
    );

    conn.execute(&sql, params_from_iter(record.values()))?;
    let id = conn.last_insert_rowid();
    record.did_insert(id);
    Ok(id)
}

/// Overwrite all attribute columns of an existing record.
///
/// # Errors
///
/// Returns [`Error::MissingIdentity`] for a record that was never inserted and
/// [`Error::NotFound`] if no row carries its identity.
pub fn update<R: Record>(conn: &Connection, record: &R) -> Result<()> {
    let id = record.id().ok_or(Error::MissingIdentity { table: R::TABLE })?;

    let assignments: Vec<String> = R::COLUMNS
        .iter()
        .enumerate()
        .map(|(i, c)| format!("\"{c}\" = ?{}", i + 1))
        .collect();
    let sql = format!(
        "UPDATE \"{}\" SET {} WHERE \"id\" = ?{}",
        R::TABLE,
        assignments.join(", "),
        R::COLUMNS.len() + 1
    );

    let mut values = record.values();
    values.push(Value::Integer(id));
    let changed = conn.execute(&sql, params_from_iter(values))?;
    if changed == 0 {
        return Err(Error::NotFound { table: R::TABLE, id });
    }
    Ok(())
}

/// Delete a record by identity.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if no row carries the identity.
pub fn delete<R: Record>(conn: &Connection, id: i64) -> Result<()> {
    let sql = format!("DELETE FROM \"{}\" WHERE \"id\" = ?1", R::TABLE);
    let changed = conn.execute(&sql, [id])?;
    if changed == 0 {
        return Err(Error::NotFound { table: R::TABLE, id });
    }
    Ok(())
}

/// Fetch every record of a type, ordered by identity.
///
/// # Errors
///
/// Returns an error if the query fails or a row cannot be decoded.
pub fn fetch_all<R: Record>(conn: &Connection) -> Result<Vec<R>> {
    fetch_where(conn, "1 = 1", Vec::new())
}

/// Fetch a single record by identity.
///
/// # Errors
///
/// Returns an error if the query fails or the row cannot be decoded.
pub fn fetch_one<R: Record>(conn: &Connection, id: i64) -> Result<Option<R>> {
    let sql = format!("{} WHERE \"id\" = ?1", select_sql::<R>());
    let record = conn.query_row(&sql, [id], R::from_row).optional()?;
    Ok(record)
}

/// Fetch records matching a `WHERE` clause, ordered by identity.
///
/// The clause must use positional `?N` parameters matching `params`.
///
/// # Errors
///
/// Returns an error if the query fails or a row cannot be decoded.
pub fn fetch_where<R: Record>(conn: &Connection, clause: &str, params: Vec<Value>) -> Result<Vec<R>> {
    let sql = format!("{} WHERE {clause} ORDER BY \"id\"", select_sql::<R>());
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(params), R::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Count records of a type.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn count<R: Record>(conn: &Connection) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM \"{}\"", R::TABLE);
    let n = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(n)
}
