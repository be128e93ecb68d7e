//! Periodic purge of expired guard rows.
//!
//! Spent rows only shadow chain state for a while, replay rows only matter
//! while their timestamp could still pass the skew check, and a burn nobody
//! completes or aborts must not hold an output forever.

use rusqlite::Connection;

use chansign_db::queries::{outputs, replay};

use crate::{DoubleSpendGuard, Result};

/// What one sweep removed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub spent_purged: usize,
    pub replay_purged: usize,
    pub burns_released: usize,
}

impl DoubleSpendGuard {
    /// Remove every row whose retention window ended before `now`.
    pub fn sweep(&self, conn: &Connection, now: u64) -> Result<SweepReport> {
        let policy = self.policy();
        let spent_purged =
            outputs::delete_spent_before(conn, now.saturating_sub(policy.spent_retention_secs))?;
        let replay_purged =
            replay::delete_before(conn, now.saturating_sub(2 * policy.time_skew_secs))?;

        let burn_cutoff = now.saturating_sub(policy.burn_expiry_secs);
        for stale in outputs::burned_before(conn, burn_cutoff)? {
            tracing::warn!(
                burned_at = stale.burned_at,
                outpoint = %hex_outpoint(&stale.outpoint),
                "releasing expired burn"
            );
        }
        let burns_released = outputs::delete_burned_before(conn, burn_cutoff)?;

        let report = SweepReport {
            spent_purged,
            replay_purged,
            burns_released,
        };
        tracing::info!(?report, "guard sweep complete");
        Ok(report)
    }
}

fn hex_outpoint(bytes: &[u8]) -> String {
    match chansign_types::outpoint::decode(bytes) {
        Ok(op) => format!("{}:{}", op.txid, op.vout),
        Err(_) => "<malformed>".to_string(),
    }
}
