//! # chansign-db
//!
//! Database access layer for the co-signing server.
//! Manages the single SQLite database at `$CHANSIGN_DATA_DIR/chansign.db`.
//!
//! ## Schema
//!
//! - WAL mode mandatory
//! - Foreign keys enforced
//! - All timestamps are Unix epoch seconds (u64)
//! - Outpoints are 36-byte consensus encodings
//! - Schema version stored in `PRAGMA user_version`
//!
//! Query functions take a plain `&Connection` so callers can run several of
//! them inside one transaction.

pub mod migrations;
pub mod queries;
pub mod schema;

use rusqlite::{Connection, TransactionBehavior};
use std::path::Path;

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Open or create the database at the given path.
///
/// Pending migrations run before the connection is returned.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Open a private in-memory database, used by tests and tooling.
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Run `f` inside one `IMMEDIATE` transaction, committing only on `Ok`.
///
/// `IMMEDIATE` takes the write lock up front, so two writers can never both
/// read a row as absent and then both insert it.
pub fn with_transaction<T, E, F>(conn: &mut Connection, f: F) -> std::result::Result<T, E>
where
    F: FnOnce(&Connection) -> std::result::Result<T, E>,
    E: From<DbError>,
{
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(DbError::Sqlite)?;
    let value = f(&tx)?;
    tx.commit().map_err(DbError::Sqlite)?;
    Ok(value)
}

fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -8000;",
    )?;
    Ok(())
}

/// Map a UNIQUE/PRIMARY KEY violation to [`DbError::Constraint`].
pub(crate) fn map_constraint(err: rusqlite::Error, what: &str) -> DbError {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            DbError::Constraint(what.to_string())
        }
        other => DbError::Sqlite(other),
    }
}

/// Read a fixed-width blob column.
pub(crate) fn blob_array<const N: usize>(bytes: Vec<u8>, column: &str) -> rusqlite::Result<[u8; N]> {
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Blob,
            format!("{column}: expected {N} bytes, got {}", bytes.len()).into(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_database_has_channel_tables() {
        let conn = open_memory().expect("open in-memory db");
        let version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .expect("user_version");
        assert_eq!(version, SCHEMA_VERSION);
        let fk: i32 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .expect("foreign_keys");
        assert_eq!(fk, 1);

        for table in [
            "key_pairs",
            "time_locked_addresses",
            "burned_outputs",
            "spent_outputs",
            "replay_protection",
            "signed_transactions",
        ] {
            let found: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .expect("sqlite_master");
            assert_eq!(found, 1, "missing table {table}");
        }
    }

    #[test]
    fn test_with_transaction_rolls_back_on_error() {
        let mut conn = open_memory().expect("open");
        let result: std::result::Result<(), DbError> = with_transaction(&mut conn, |tx| {
            queries::settings::set(tx, "marker", "1")?;
            Err(DbError::Constraint("forced".into()))
        });
        assert!(result.is_err());
        assert!(queries::settings::get(&conn, "marker").expect("get").is_none());
    }

    #[test]
    fn test_with_transaction_commits() {
        let mut conn = open_memory().expect("open");
        with_transaction::<_, DbError, _>(&mut conn, |tx| queries::settings::set(tx, "marker", "1"))
            .expect("commit");
        assert_eq!(
            queries::settings::get(&conn, "marker").expect("get").as_deref(),
            Some("1")
        );
    }
}
