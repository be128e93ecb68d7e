//! The virtual balance seam.

use rusqlite::Connection;

use chansign_db::queries::accounts;
use chansign_types::records::AccountRecord;

use crate::Result;

/// Off-chain balances owned outside the signing core.
///
/// Calls take the request's connection so reads and writes stay inside the
/// request's single transaction.
pub trait ChannelLedger: Send + Sync {
    /// Open an empty account for a newly registered client.
    fn open_account(&self, conn: &Connection, client_public_key: &[u8], now: u64) -> Result<()>;

    fn account(&self, conn: &Connection, client_public_key: &[u8]) -> Result<Option<AccountRecord>>;

    /// Virtual balance in satoshis. May be negative.
    fn virtual_balance(&self, conn: &Connection, client_public_key: &[u8]) -> Result<i64>;

    /// Move `amount_sat` between two existing accounts. Returns the sender's
    /// and the receiver's new balances. Funds are checked by the caller.
    fn transfer(
        &self,
        conn: &Connection,
        sender: &[u8],
        receiver: &[u8],
        amount_sat: i64,
        now: u64,
    ) -> Result<(i64, i64)>;

    /// Remember the last payment nonce accepted from `client_public_key`.
    fn record_nonce(&self, conn: &Connection, client_public_key: &[u8], nonce: u64, now: u64) -> Result<()>;
}

/// Ledger backed by the `accounts` table.
#[derive(Clone, Copy, Debug, Default)]
pub struct SqliteLedger;

impl ChannelLedger for SqliteLedger {
    fn open_account(&self, conn: &Connection, client_public_key: &[u8], now: u64) -> Result<()> {
        accounts::ensure(conn, client_public_key, now)?;
        Ok(())
    }

    fn account(&self, conn: &Connection, client_public_key: &[u8]) -> Result<Option<AccountRecord>> {
        Ok(accounts::find(conn, client_public_key)?)
    }

    fn virtual_balance(&self, conn: &Connection, client_public_key: &[u8]) -> Result<i64> {
        Ok(accounts::virtual_balance(conn, client_public_key)?)
    }

    fn transfer(
        &self,
        conn: &Connection,
        sender: &[u8],
        receiver: &[u8],
        amount_sat: i64,
        now: u64,
    ) -> Result<(i64, i64)> {
        let sender_balance = accounts::credit(conn, sender, -amount_sat, now)?;
        let receiver_balance = accounts::credit(conn, receiver, amount_sat, now)?;
        Ok((sender_balance, receiver_balance))
    }

    fn record_nonce(&self, conn: &Connection, client_public_key: &[u8], nonce: u64, now: u64) -> Result<()> {
        accounts::set_nonce(conn, client_public_key, nonce, now)?;
        Ok(())
    }
}
