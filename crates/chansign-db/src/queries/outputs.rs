//! Burned and spent output queries.
//!
//! A burned output is reserved by an in-flight signing request. A spent
//! output has been committed to a fully signed transaction.

use chansign_types::outpoint::OutPointBytes;
use chansign_types::records::{BurnedOutputRecord, SpentOutputRecord};
use chansign_types::TxHash;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::{blob_array, map_constraint, Result};

fn burned_from_row(row: &Row<'_>) -> rusqlite::Result<BurnedOutputRecord> {
    Ok(BurnedOutputRecord {
        outpoint: blob_array(row.get(0)?, "outpoint")?,
        client_public_key: row.get(1)?,
        txid: blob_array(row.get(2)?, "txid")?,
        burned_at: row.get::<_, i64>(3)? as u64,
    })
}

fn spent_from_row(row: &Row<'_>) -> rusqlite::Result<SpentOutputRecord> {
    Ok(SpentOutputRecord {
        outpoint: blob_array(row.get(0)?, "outpoint")?,
        client_public_key: row.get(1)?,
        txid: blob_array(row.get(2)?, "txid")?,
        inserted_at: row.get::<_, i64>(3)? as u64,
    })
}

/// Reserve an outpoint. Fails with a constraint error if already reserved.
pub fn insert_burned(conn: &Connection, record: &BurnedOutputRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO burned_outputs (outpoint, client_public_key, txid, burned_at)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            record.outpoint.as_slice(),
            record.client_public_key,
            record.txid.as_slice(),
            record.burned_at as i64,
        ],
    )
    .map_err(|e| map_constraint(e, "output already burned"))?;
    Ok(())
}

pub fn find_burned(conn: &Connection, outpoint: &OutPointBytes) -> Result<Option<BurnedOutputRecord>> {
    let record = conn
        .query_row(
            "SELECT outpoint, client_public_key, txid, burned_at FROM burned_outputs WHERE outpoint = ?1",
            [outpoint.as_slice()],
            burned_from_row,
        )
        .optional()?;
    Ok(record)
}

/// Release a reservation held by `client_public_key`. Returns `true` if one was removed.
pub fn delete_burned(conn: &Connection, client_public_key: &[u8], outpoint: &OutPointBytes) -> Result<bool> {
    let changed = conn.execute(
        "DELETE FROM burned_outputs WHERE outpoint = ?1 AND client_public_key = ?2",
        rusqlite::params![outpoint.as_slice(), client_public_key],
    )?;
    Ok(changed == 1)
}

/// Reservations made before `cutoff`.
pub fn burned_before(conn: &Connection, cutoff: u64) -> Result<Vec<BurnedOutputRecord>> {
    let mut stmt = conn.prepare(
        "SELECT outpoint, client_public_key, txid, burned_at FROM burned_outputs
         WHERE burned_at < ?1 ORDER BY burned_at",
    )?;
    let rows = stmt
        .query_map([cutoff as i64], burned_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Drop reservations made before `cutoff`. Returns the number removed.
pub fn delete_burned_before(conn: &Connection, cutoff: u64) -> Result<usize> {
    Ok(conn.execute("DELETE FROM burned_outputs WHERE burned_at < ?1", [cutoff as i64])?)
}

/// Record an outpoint as spent by `txid`.
///
/// Re-recording the same spend refreshes its timestamp. A row for a different
/// txid is left untouched; callers check [`find_spent`] first.
pub fn insert_spent(conn: &Connection, record: &SpentOutputRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO spent_outputs (outpoint, client_public_key, txid, inserted_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(outpoint) DO UPDATE SET inserted_at = excluded.inserted_at
         WHERE spent_outputs.txid = excluded.txid",
        rusqlite::params![
            record.outpoint.as_slice(),
            record.client_public_key,
            record.txid.as_slice(),
            record.inserted_at as i64,
        ],
    )?;
    Ok(())
}

pub fn find_spent(conn: &Connection, outpoint: &OutPointBytes) -> Result<Option<SpentOutputRecord>> {
    let record = conn
        .query_row(
            "SELECT outpoint, client_public_key, txid, inserted_at FROM spent_outputs WHERE outpoint = ?1",
            [outpoint.as_slice()],
            spent_from_row,
        )
        .optional()?;
    Ok(record)
}

/// Txids that spent any of a client's outputs.
pub fn spent_txids_by_client(conn: &Connection, client_public_key: &[u8]) -> Result<Vec<TxHash>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT txid FROM spent_outputs WHERE client_public_key = ?1 ORDER BY txid",
    )?;
    let rows = stmt
        .query_map([client_public_key], |row| blob_array(row.get(0)?, "txid"))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Drop spent rows older than `cutoff`. Returns the number removed.
pub fn delete_spent_before(conn: &Connection, cutoff: u64) -> Result<usize> {
    Ok(conn.execute("DELETE FROM spent_outputs WHERE inserted_at < ?1", [cutoff as i64])?)
}
