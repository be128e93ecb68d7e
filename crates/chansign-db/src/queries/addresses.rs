//! Time-locked address queries.

use chansign_types::records::TimeLockedAddressRecord;
use chansign_types::ScriptHash;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::{blob_array, Result};

const COLUMNS: &str =
    "client_public_key, server_public_key, lock_time, address_hash, redeem_script, created_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<TimeLockedAddressRecord> {
    Ok(TimeLockedAddressRecord {
        client_public_key: row.get(0)?,
        server_public_key: row.get(1)?,
        lock_time: row.get::<_, i64>(2)? as u32,
        address_hash: blob_array(row.get(3)?, "address_hash")?,
        redeem_script: row.get(4)?,
        created_at: row.get::<_, i64>(5)? as u64,
    })
}

/// Store an address unless one with the same hash exists.
///
/// Returns `true` if a row was inserted.
pub fn insert_if_absent(conn: &Connection, record: &TimeLockedAddressRecord) -> Result<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO time_locked_addresses
         (client_public_key, server_public_key, lock_time, address_hash, redeem_script, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            record.client_public_key,
            record.server_public_key,
            record.lock_time as i64,
            record.address_hash.as_slice(),
            record.redeem_script,
            record.created_at as i64,
        ],
    )?;
    Ok(changed == 1)
}

/// Look up an address by its script hash.
pub fn find(conn: &Connection, address_hash: &ScriptHash) -> Result<Option<TimeLockedAddressRecord>> {
    let record = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM time_locked_addresses WHERE address_hash = ?1"),
            [address_hash.as_slice()],
            from_row,
        )
        .optional()?;
    Ok(record)
}

/// All addresses of a client, oldest first.
pub fn list_by_client(conn: &Connection, client_public_key: &[u8]) -> Result<Vec<TimeLockedAddressRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM time_locked_addresses
         WHERE client_public_key = ?1 ORDER BY created_at, lock_time"
    ))?;
    let rows = stmt
        .query_map([client_public_key], from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
