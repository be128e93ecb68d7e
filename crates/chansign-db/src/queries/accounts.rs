//! Per-client ledger accounts.

use chansign_types::records::AccountRecord;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::{DbError, Result};

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<AccountRecord> {
    Ok(AccountRecord {
        client_public_key: row.get(0)?,
        virtual_balance: row.get(1)?,
        nonce: row.get::<_, i64>(2)? as u64,
        updated_at: row.get::<_, i64>(3)? as u64,
    })
}

/// Create an empty account for a client if none exists.
pub fn ensure(conn: &Connection, client_public_key: &[u8], now: u64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO accounts (client_public_key, virtual_balance, nonce, updated_at)
         VALUES (?1, 0, 0, ?2)",
        rusqlite::params![client_public_key, now as i64],
    )?;
    Ok(())
}

pub fn find(conn: &Connection, client_public_key: &[u8]) -> Result<Option<AccountRecord>> {
    let record = conn
        .query_row(
            "SELECT client_public_key, virtual_balance, nonce, updated_at
             FROM accounts WHERE client_public_key = ?1",
            [client_public_key],
            account_from_row,
        )
        .optional()?;
    Ok(record)
}

/// Virtual balance of a client, zero when there is no account.
pub fn virtual_balance(conn: &Connection, client_public_key: &[u8]) -> Result<i64> {
    let balance = conn
        .query_row(
            "SELECT virtual_balance FROM accounts WHERE client_public_key = ?1",
            [client_public_key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(balance.unwrap_or(0))
}

/// Add `delta` (possibly negative) to an existing account. Returns the new balance.
pub fn credit(conn: &Connection, client_public_key: &[u8], delta: i64, now: u64) -> Result<i64> {
    let changed = conn.execute(
        "UPDATE accounts SET virtual_balance = virtual_balance + ?2, updated_at = ?3
         WHERE client_public_key = ?1",
        rusqlite::params![client_public_key, delta, now as i64],
    )?;
    if changed != 1 {
        return Err(DbError::NotFound("account".into()));
    }
    virtual_balance(conn, client_public_key)
}

/// Record the last accepted payment nonce of an existing account.
pub fn set_nonce(conn: &Connection, client_public_key: &[u8], nonce: u64, now: u64) -> Result<()> {
    let changed = conn.execute(
        "UPDATE accounts SET nonce = ?2, updated_at = ?3 WHERE client_public_key = ?1",
        rusqlite::params![client_public_key, nonce as i64, now as i64],
    )?;
    if changed != 1 {
        return Err(DbError::NotFound("account".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::keys;
    use chansign_types::records::KeyPairRecord;
    use zeroize::Zeroizing;

    fn with_key_pair(conn: &Connection, client: u8) {
        keys::insert(
            conn,
            &KeyPairRecord {
                client_public_key: vec![client; 33],
                server_public_key: vec![3; 33],
                server_private_key: Zeroizing::new(vec![1; 32]),
                created_at: 1,
            },
        )
        .expect("key pair");
    }

    #[test]
    fn test_ensure_and_read() {
        let conn = crate::open_memory().expect("open");
        assert_eq!(virtual_balance(&conn, &[2; 33]).expect("missing"), 0);
        assert!(find(&conn, &[2; 33]).expect("find").is_none());

        with_key_pair(&conn, 2);
        ensure(&conn, &[2; 33], 5).expect("ensure");
        ensure(&conn, &[2; 33], 6).expect("ensure twice");

        assert_eq!(credit(&conn, &[2; 33], -250, 7).expect("debit"), -250);
        assert_eq!(virtual_balance(&conn, &[2; 33]).expect("read"), -250);
        let account = find(&conn, &[2; 33]).expect("find").expect("present");
        assert_eq!(account.nonce, 0);
        assert_eq!(account.updated_at, 7);
    }

    #[test]
    fn test_credit_and_nonce_need_account() {
        let conn = crate::open_memory().expect("open");
        assert!(matches!(credit(&conn, &[9; 33], 10, 1), Err(DbError::NotFound(_))));
        assert!(matches!(set_nonce(&conn, &[9; 33], 1, 1), Err(DbError::NotFound(_))));

        with_key_pair(&conn, 9);
        ensure(&conn, &[9; 33], 1).expect("ensure");
        set_nonce(&conn, &[9; 33], 42, 2).expect("nonce");
        assert_eq!(find(&conn, &[9; 33]).expect("find").expect("present").nonce, 42);
    }
}
