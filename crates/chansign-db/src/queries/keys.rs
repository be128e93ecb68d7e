//! Channel key pair queries.

use chansign_types::records::KeyPairRecord;
use rusqlite::{Connection, OptionalExtension};
use zeroize::Zeroizing;

use crate::{map_constraint, Result};

/// Insert the server key pair for a client.
///
/// Fails with [`crate::DbError::Constraint`] if the client already has one.
pub fn insert(conn: &Connection, record: &KeyPairRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO key_pairs (client_public_key, server_public_key, server_private_key, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            record.client_public_key,
            record.server_public_key,
            record.server_private_key.as_slice(),
            record.created_at as i64,
        ],
    )
    .map_err(|e| map_constraint(e, "key pair already exists"))?;
    Ok(())
}

/// Look up the key pair for a client.
pub fn find(conn: &Connection, client_public_key: &[u8]) -> Result<Option<KeyPairRecord>> {
    let record = conn
        .query_row(
            "SELECT client_public_key, server_public_key, server_private_key, created_at
             FROM key_pairs WHERE client_public_key = ?1",
            [client_public_key],
            |row| {
                Ok(KeyPairRecord {
                    client_public_key: row.get(0)?,
                    server_public_key: row.get(1)?,
                    server_private_key: Zeroizing::new(row.get::<_, Vec<u8>>(2)?),
                    created_at: row.get::<_, i64>(3)? as u64,
                })
            },
        )
        .optional()?;
    Ok(record)
}

/// Number of registered clients.
pub fn count(conn: &Connection) -> Result<u64> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM key_pairs", [], |row| row.get(0))?;
    Ok(n as u64)
}
