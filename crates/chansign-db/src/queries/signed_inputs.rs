//! Last refund lock time signed per outpoint.

use chansign_types::outpoint::OutPointBytes;
use chansign_types::records::SignedInputRecord;
use rusqlite::{Connection, OptionalExtension};

use crate::{blob_array, Result};

pub fn find(conn: &Connection, outpoint: &OutPointBytes) -> Result<Option<SignedInputRecord>> {
    let record = conn
        .query_row(
            "SELECT outpoint, lock_time, txid, updated_at FROM signed_inputs WHERE outpoint = ?1",
            [outpoint.as_slice()],
            |row| {
                Ok(SignedInputRecord {
                    outpoint: blob_array(row.get(0)?, "outpoint")?,
                    lock_time: row.get::<_, i64>(1)? as u32,
                    txid: blob_array(row.get(2)?, "txid")?,
                    updated_at: row.get::<_, i64>(3)? as u64,
                })
            },
        )
        .optional()?;
    Ok(record)
}

/// Insert or overwrite the stored lock time for an outpoint.
pub fn upsert(conn: &Connection, record: &SignedInputRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO signed_inputs (outpoint, lock_time, txid, updated_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(outpoint) DO UPDATE SET
             lock_time = excluded.lock_time,
             txid = excluded.txid,
             updated_at = excluded.updated_at",
        rusqlite::params![
            record.outpoint.as_slice(),
            record.lock_time as i64,
            record.txid.as_slice(),
            record.updated_at as i64,
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_overwrites() {
        let conn = crate::open_memory().expect("open");
        let mut record = SignedInputRecord {
            outpoint: [5; 36],
            lock_time: 600_000,
            txid: [1; 32],
            updated_at: 10,
        };
        upsert(&conn, &record).expect("insert");

        record.lock_time = 610_000;
        record.txid = [2; 32];
        upsert(&conn, &record).expect("update");

        let found = find(&conn, &[5; 36]).expect("find").expect("present");
        assert_eq!(found.lock_time, 610_000);
        assert_eq!(found.txid, [2; 32]);
        assert!(find(&conn, &[6; 36]).expect("find").is_none());
    }
}
