//! The outpoint state machine.

use bitcoin::{OutPoint, Transaction, Txid};
use bitcoin::hashes::Hash;
use chansign_db::queries::{outputs, replay, signed_inputs};
use chansign_types::outpoint::{self, OutPointBytes};
use chansign_types::records::{BurnedOutputRecord, SignedInputRecord, SpentOutputRecord};
use chansign_types::{Endpoint, TxHash};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{GuardError, Result};

/// Time windows the guard enforces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardPolicy {
    /// Accepted distance between a declared timestamp and server time.
    pub time_skew_secs: u64,
    /// How long spent rows are kept.
    pub spent_retention_secs: u64,
    /// Age after which an unresolved burn is released.
    pub burn_expiry_secs: u64,
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self {
            time_skew_secs: chansign_types::DEFAULT_TIME_SKEW_SECS,
            spent_retention_secs: chansign_types::DEFAULT_SPENT_RETENTION_SECS,
            burn_expiry_secs: chansign_types::DAY_SECS,
        }
    }
}

/// Where an outpoint is in its lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutpointState {
    Free,
    /// Reserved by a pending transaction of this client, identified by its
    /// unsigned txid.
    Burned { client_public_key: Vec<u8>, txid: TxHash },
    /// Committed to a signed transaction.
    Spent { txid: TxHash },
}

fn display(outpoint: &OutPoint) -> String {
    format!("{}:{}", outpoint.txid, outpoint.vout)
}

fn conflict(outpoint: &OutPoint) -> GuardError {
    GuardError::BurnedOutputs {
        outpoint: display(outpoint),
    }
}

/// Double-spend and replay guard.
#[derive(Clone, Debug, Default)]
pub struct DoubleSpendGuard {
    policy: GuardPolicy,
}

impl DoubleSpendGuard {
    pub fn new(policy: GuardPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &GuardPolicy {
        &self.policy
    }

    /// Current state of one outpoint. A spend takes precedence over a burn.
    pub fn state(&self, conn: &Connection, outpoint: &OutPoint) -> Result<OutpointState> {
        let key = outpoint::encode(outpoint);
        if let Some(spent) = outputs::find_spent(conn, &key)? {
            return Ok(OutpointState::Spent { txid: spent.txid });
        }
        if let Some(burned) = outputs::find_burned(conn, &key)? {
            return Ok(OutpointState::Burned {
                client_public_key: burned.client_public_key,
                txid: burned.txid,
            });
        }
        Ok(OutpointState::Free)
    }

    /// Reserve `outpoints` for `client_public_key` and the transaction whose
    /// unsigned txid is `unsigned`.
    ///
    /// Fails if any of them is burned by any client (the requester included)
    /// or already spent. Nothing is reserved on failure as long as the caller
    /// rolls back its transaction.
    pub fn check_and_burn(
        &self,
        conn: &Connection,
        client_public_key: &[u8],
        outpoints: &[OutPoint],
        unsigned: &Txid,
        now: u64,
    ) -> Result<()> {
        for outpoint in outpoints {
            if self.state(conn, outpoint)? != OutpointState::Free {
                tracing::warn!(outpoint = %display(outpoint), "burn rejected: output not free");
                return Err(conflict(outpoint));
            }
            let record = BurnedOutputRecord {
                outpoint: outpoint::encode(outpoint),
                client_public_key: client_public_key.to_vec(),
                txid: unsigned.to_byte_array(),
                burned_at: now,
            };
            // Also catches the same outpoint listed twice.
            outputs::insert_burned(conn, &record).map_err(|e| match e {
                chansign_db::DbError::Constraint(_) => conflict(outpoint),
                other => GuardError::Db(other),
            })?;
        }
        tracing::debug!(count = outpoints.len(), "outputs burned");
        Ok(())
    }

    /// Move `outpoints` to `Spent` by `txid`, whose unsigned form is `unsigned`.
    ///
    /// An outpoint may be free or burned by the same client for this very
    /// transaction. Burned by another client or for another transaction, or
    /// spent by a different transaction, is a conflict. Committing the same
    /// transaction again is a no-op.
    pub fn commit_spent(
        &self,
        conn: &Connection,
        client_public_key: &[u8],
        outpoints: &[OutPoint],
        unsigned: &Txid,
        txid: &Txid,
        now: u64,
    ) -> Result<()> {
        let unsigned = unsigned.to_byte_array();
        let txid = txid.to_byte_array();
        for outpoint in outpoints {
            match self.state(conn, outpoint)? {
                OutpointState::Spent { txid: spent_by } if spent_by != txid => {
                    return Err(conflict(outpoint));
                }
                OutpointState::Burned { client_public_key: owner, txid: reserved_for }
                    if owner != client_public_key || reserved_for != unsigned =>
                {
                    tracing::warn!(outpoint = %display(outpoint), "commit rejected: burned for another transaction");
                    return Err(conflict(outpoint));
                }
                _ => {}
            }
            let key = outpoint::encode(outpoint);
            outputs::delete_burned(conn, client_public_key, &key)?;
            outputs::insert_spent(
                conn,
                &SpentOutputRecord {
                    outpoint: key,
                    client_public_key: client_public_key.to_vec(),
                    txid,
                    inserted_at: now,
                },
            )?;
        }
        tracing::debug!(count = outpoints.len(), "outputs committed spent");
        Ok(())
    }

    /// Release burns held by `client_public_key`. Outpoints burned by someone
    /// else or not burned at all are skipped. Returns how many were released.
    pub fn abort_burn(&self, conn: &Connection, client_public_key: &[u8], outpoints: &[OutPoint]) -> Result<usize> {
        let mut released = 0;
        for outpoint in outpoints {
            if outputs::delete_burned(conn, client_public_key, &outpoint::encode(outpoint))? {
                released += 1;
            }
        }
        tracing::debug!(released, "burns aborted");
        Ok(released)
    }

    /// Record a refund lock time for `outpoint`.
    ///
    /// Rejects a lock time strictly below the highest one already signed.
    /// Equal or higher values are stored along with the signing txid.
    pub fn record_signed_lock_time(
        &self,
        conn: &Connection,
        outpoint: &OutPoint,
        lock_time: u32,
        txid: &Txid,
        now: u64,
    ) -> Result<()> {
        let key: OutPointBytes = outpoint::encode(outpoint);
        if let Some(stored) = signed_inputs::find(conn, &key)? {
            if stored.lock_time > lock_time {
                tracing::warn!(
                    outpoint = %display(outpoint),
                    stored = stored.lock_time,
                    proposed = lock_time,
                    "lock time regression"
                );
                return Err(GuardError::LockTimeRegression {
                    stored: stored.lock_time,
                    proposed: lock_time,
                });
            }
        }
        signed_inputs::upsert(
            conn,
            &SignedInputRecord {
                outpoint: key,
                lock_time,
                txid: txid.to_byte_array(),
                updated_at: now,
            },
        )?;
        Ok(())
    }

    /// Whether any input of `tx` spends an outpoint already committed spent
    /// by a different transaction.
    pub fn is_double_spend(&self, conn: &Connection, tx: &Transaction) -> Result<bool> {
        let txid = tx.compute_txid().to_byte_array();
        for input in &tx.input {
            if let OutpointState::Spent { txid: spent_by } = self.state(conn, &input.previous_output)? {
                if spent_by != txid {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Reject timestamps outside `now ± time_skew_secs`.
    pub fn check_time_skew(&self, declared: u64, now: u64) -> Result<()> {
        let window = self.policy.time_skew_secs;
        if declared.abs_diff(now) > window {
            return Err(GuardError::TimeSkewTooLarge { declared, now, window });
        }
        Ok(())
    }

    /// Accept a (client, endpoint, timestamp) triple at most once.
    pub fn check_replay(
        &self,
        conn: &Connection,
        client_public_key: &[u8],
        endpoint: Endpoint,
        seen_date: u64,
        now: u64,
    ) -> Result<()> {
        self.check_time_skew(seen_date, now)?;
        if !replay::insert_if_absent(conn, client_public_key, endpoint.as_str(), seen_date, now)? {
            tracing::warn!(%endpoint, seen_date, "replayed request");
            return Err(GuardError::ReplayDetected);
        }
        Ok(())
    }
}
