//! Replay protection rows keyed by (client, endpoint, declared date).

use rusqlite::Connection;

use crate::Result;

/// Record a request. Returns `false` if the same triple was already seen.
pub fn insert_if_absent(
    conn: &Connection,
    client_public_key: &[u8],
    endpoint: &str,
    seen_date: u64,
    inserted_at: u64,
) -> Result<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO replay_protection (client_public_key, endpoint, seen_date, inserted_at)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![client_public_key, endpoint, seen_date as i64, inserted_at as i64],
    )?;
    Ok(changed == 1)
}

/// Drop rows inserted before `cutoff`. Returns the number removed.
pub fn delete_before(conn: &Connection, cutoff: u64) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM replay_protection WHERE inserted_at < ?1",
        [cutoff as i64],
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_triple_unique() {
        let conn = crate::open_memory().expect("open");
        assert!(insert_if_absent(&conn, &[2; 33], "sign", 1000, 1000).expect("first"));
        assert!(!insert_if_absent(&conn, &[2; 33], "sign", 1000, 1001).expect("replay"));
        assert!(insert_if_absent(&conn, &[2; 33], "refund", 1000, 1001).expect("other endpoint"));
        assert!(insert_if_absent(&conn, &[2; 33], "sign", 1001, 1001).expect("other date"));
    }

    #[test]
    fn test_delete_before() {
        let conn = crate::open_memory().expect("open");
        insert_if_absent(&conn, &[2; 33], "sign", 1, 100).expect("old");
        insert_if_absent(&conn, &[2; 33], "sign", 2, 900).expect("new");
        assert_eq!(delete_before(&conn, 500).expect("purge"), 1);
        assert!(insert_if_absent(&conn, &[2; 33], "sign", 1, 1000).expect("reusable after purge"));
    }
}
