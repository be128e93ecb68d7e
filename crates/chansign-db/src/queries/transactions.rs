//! Log of fully signed transactions.

use chansign_types::records::SignedTransactionRecord;
use chansign_types::TxHash;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::{blob_array, Result};

fn from_row(row: &Row<'_>) -> rusqlite::Result<SignedTransactionRecord> {
    Ok(SignedTransactionRecord {
        txid: blob_array(row.get(0)?, "txid")?,
        client_public_key: row.get(1)?,
        raw_tx: row.get(2)?,
        approved: row.get(3)?,
        created_at: row.get::<_, i64>(4)? as u64,
    })
}

/// Log a signed transaction. Logging the same txid again keeps the first row
/// but never clears its approval.
pub fn record(conn: &Connection, record: &SignedTransactionRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO signed_transactions (txid, client_public_key, raw_tx, approved, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(txid) DO UPDATE SET approved = MAX(approved, excluded.approved)",
        rusqlite::params![
            record.txid.as_slice(),
            record.client_public_key,
            record.raw_tx,
            record.approved,
            record.created_at as i64,
        ],
    )?;
    Ok(())
}

pub fn find(conn: &Connection, txid: &TxHash) -> Result<Option<SignedTransactionRecord>> {
    let record = conn
        .query_row(
            "SELECT txid, client_public_key, raw_tx, approved, created_at
             FROM signed_transactions WHERE txid = ?1",
            [txid.as_slice()],
            from_row,
        )
        .optional()?;
    Ok(record)
}

/// Mark a logged transaction as an approved instant payment.
pub fn set_approved(conn: &Connection, txid: &TxHash) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE signed_transactions SET approved = 1 WHERE txid = ?1",
        [txid.as_slice()],
    )?;
    Ok(changed == 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(approved: bool) -> SignedTransactionRecord {
        SignedTransactionRecord {
            txid: [7; 32],
            client_public_key: vec![2; 33],
            raw_tx: vec![1, 2, 3],
            approved,
            created_at: 50,
        }
    }

    #[test]
    fn test_record_and_find() {
        let conn = crate::open_memory().expect("open");
        record(&conn, &entry(false)).expect("record");
        let found = find(&conn, &[7; 32]).expect("find").expect("present");
        assert_eq!(found.raw_tx, vec![1, 2, 3]);
        assert!(!found.approved);
    }

    #[test]
    fn test_approval_is_sticky() {
        let conn = crate::open_memory().expect("open");
        record(&conn, &entry(false)).expect("record");
        assert!(set_approved(&conn, &[7; 32]).expect("approve"));
        record(&conn, &entry(false)).expect("re-record");
        assert!(find(&conn, &[7; 32]).expect("find").expect("present").approved);
        assert!(!set_approved(&conn, &[8; 32]).expect("missing"));
    }
}
