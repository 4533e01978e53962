//! Nested-entity reconciliation.
//!
//! Maps a list of tag or ingredient names onto rows owned by one user,
//! creating the ones that are missing, and attaches the result to a recipe.
//! All functions take a connection that the caller has already put inside a
//! transaction; nothing here commits.

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{Error, Result};
use crate::types::AttrKind;

fn find_id(conn: &Connection, kind: AttrKind, user_id: i64, name: &str) -> Result<Option<i64>> {
    let sql = format!(
        "SELECT id FROM {} WHERE user_id = ?1 AND name = ?2",
        kind.table()
    );
    conn.query_row(&sql, params![user_id, name], |row| row.get(0))
        .optional()
        .map_err(Error::from)
}

fn insert(conn: &Connection, kind: AttrKind, user_id: i64, name: &str) -> Result<i64> {
    let sql = format!(
        "INSERT INTO {} (user_id, name) VALUES (?1, ?2)",
        kind.table()
    );
    match conn.execute(&sql, params![user_id, name]) {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            Err(Error::ConflictRetry(format!("{} '{name}'", kind.label())))
        }
        Err(e) => Err(Error::from(e)),
    }
}

/// Returns the id of the user's entity called `name`, creating it if absent.
pub(super) fn get_or_create(
    conn: &Connection,
    kind: AttrKind,
    user_id: i64,
    name: &str,
) -> Result<i64> {
    if let Some(id) = find_id(conn, kind, user_id, name)? {
        return Ok(id);
    }

    match insert(conn, kind, user_id, name) {
        Ok(id) => {
            tracing::debug!("Created {} '{}' for user {}", kind.label(), name, user_id);
            Ok(id)
        }
        Err(Error::ConflictRetry(what)) => {
            tracing::debug!("Lost create race for {what}, re-fetching");
            recover_conflict(conn, kind, user_id, name)
        }
        Err(e) => Err(e),
    }
}

/// Returns the row another writer created first. It must exist once the
/// insert has hit the (user_id, name) constraint.
fn recover_conflict(conn: &Connection, kind: AttrKind, user_id: i64, name: &str) -> Result<i64> {
    find_id(conn, kind, user_id, name)?.ok_or(Error::NotFound)
}

/// Attaching an already attached entity is a no-op.
pub(super) fn attach(conn: &Connection, kind: AttrKind, recipe_id: i64, attr_id: i64) -> Result<()> {
    let sql = format!(
        "INSERT OR IGNORE INTO {} (recipe_id, {}) VALUES (?1, ?2)",
        kind.join_table(),
        kind.join_column()
    );
    conn.execute(&sql, params![recipe_id, attr_id])?;
    Ok(())
}

pub(super) fn clear(conn: &Connection, kind: AttrKind, recipe_id: i64) -> Result<()> {
    let sql = format!("DELETE FROM {} WHERE recipe_id = ?1", kind.join_table());
    conn.execute(&sql, params![recipe_id])?;
    Ok(())
}

/// Resolves each name in input order and attaches it to the recipe.
pub(super) fn attach_names(
    conn: &Connection,
    kind: AttrKind,
    user_id: i64,
    recipe_id: i64,
    names: &[String],
) -> Result<()> {
    for name in names {
        let attr_id = get_or_create(conn, kind, user_id, name)?;
        attach(conn, kind, recipe_id, attr_id)?;
    }
    Ok(())
}

/// Replaces the recipe's set with exactly the named entities.
pub(super) fn replace_names(
    conn: &Connection,
    kind: AttrKind,
    user_id: i64,
    recipe_id: i64,
    names: &[String],
) -> Result<()> {
    clear(conn, kind, recipe_id)?;
    attach_names(conn, kind, user_id, recipe_id, names)
}
