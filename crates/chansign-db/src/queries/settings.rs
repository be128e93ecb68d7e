//! Server-wide values that are not tied to any client.

use rusqlite::{Connection, OptionalExtension};

use crate::{DbError, Result};

/// Network the database was created for, in `bitcoin::Network` display form.
pub const NETWORK: &str = "network";
/// Unix time the last maintenance sweep finished.
pub const LAST_SWEEP_AT: &str = "last_sweep_at";

pub fn get(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| row.get(0))
        .optional()?;
    Ok(value)
}

pub fn set(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        rusqlite::params![key, value],
    )?;
    Ok(())
}

/// Bind the database to `network` on first open.
///
/// Returns the network the database belongs to, which differs from `network`
/// only when the file was created for another chain.
pub fn pin_network(conn: &Connection, network: &str) -> Result<String> {
    conn.execute(
        "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
        rusqlite::params![NETWORK, network],
    )?;
    get(conn, NETWORK)?.ok_or_else(|| DbError::NotFound(format!("setting '{NETWORK}'")))
}

/// Zero when no sweep has run.
pub fn last_sweep_at(conn: &Connection) -> Result<u64> {
    match get(conn, LAST_SWEEP_AT)? {
        Some(raw) => raw
            .parse()
            .map_err(|e: std::num::ParseIntError| DbError::Serialization(format!("{LAST_SWEEP_AT}: {e}"))),
        None => Ok(0),
    }
}

pub fn record_sweep(conn: &Connection, at: u64) -> Result<()> {
    set(conn, LAST_SWEEP_AT, &at.to_string())
}
