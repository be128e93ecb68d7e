//! Background broadcast with retry.
//!
//! Once a transaction is fully signed its guard and ledger state is already
//! committed, so a failed broadcast is never reported to the client. The
//! worker keeps retrying after a fixed backoff until the wallet accepts it,
//! the attempt limit is hit, or the process shuts down.

use std::sync::Arc;
use std::time::Duration;

use bitcoin::Transaction;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::wallet::Wallet;

/// Retry behaviour of the broadcast worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BroadcastConfig {
    pub retry_backoff: Duration,
    /// Give up after this many failed attempts. Zero means never give up.
    pub max_attempts: u32,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            retry_backoff: Duration::from_secs(60),
            max_attempts: 0,
        }
    }
}

/// Sending side of the broadcast queue.
#[derive(Clone, Debug)]
pub struct BroadcastHandle {
    queue: mpsc::UnboundedSender<Transaction>,
}

impl BroadcastHandle {
    /// Queue a transaction. Never blocks.
    pub fn submit(&self, tx: Transaction) {
        let txid = tx.compute_txid();
        if self.queue.send(tx).is_err() {
            tracing::error!(%txid, "broadcast worker stopped, transaction not queued");
        } else {
            tracing::debug!(%txid, "transaction queued for broadcast");
        }
    }
}

struct Pending {
    tx: Transaction,
    attempts: u32,
    retry_at: Instant,
}

/// Start the worker. It stops on `shutdown`, or once every handle is dropped
/// and nothing is left to retry.
pub fn spawn(
    wallet: Arc<dyn Wallet>,
    config: BroadcastConfig,
    shutdown: broadcast::Receiver<()>,
) -> (BroadcastHandle, JoinHandle<()>) {
    let (queue, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(wallet, config, rx, shutdown));
    (BroadcastHandle { queue }, task)
}

async fn run(
    wallet: Arc<dyn Wallet>,
    config: BroadcastConfig,
    mut rx: mpsc::UnboundedReceiver<Transaction>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut pending: Vec<Pending> = Vec::new();
    let mut open = true;

    loop {
        if !open && pending.is_empty() {
            break;
        }
        let next_retry = pending.iter().map(|p| p.retry_at).min();
        let sleep_until = next_retry.unwrap_or_else(|| Instant::now() + config.retry_backoff);

        tokio::select! {
            received = rx.recv(), if open => match received {
                Some(tx) => {
                    let job = Pending { tx, attempts: 0, retry_at: Instant::now() };
                    if let Some(retry) = attempt(wallet.as_ref(), &config, job) {
                        pending.push(retry);
                    }
                }
                None => open = false,
            },
            _ = tokio::time::sleep_until(sleep_until), if next_retry.is_some() => {
                let now = Instant::now();
                let (due, later): (Vec<_>, Vec<_>) =
                    pending.drain(..).partition(|p| p.retry_at <= now);
                pending = later;
                for job in due {
                    if let Some(retry) = attempt(wallet.as_ref(), &config, job) {
                        pending.push(retry);
                    }
                }
            }
            _ = shutdown.recv() => {
                if !pending.is_empty() {
                    tracing::warn!(pending = pending.len(), "broadcast worker stopping with unsent transactions");
                }
                break;
            }
        }
    }
    tracing::info!("broadcast worker stopped");
}

/// One broadcast attempt. Returns the job back if it should be retried.
fn attempt(wallet: &dyn Wallet, config: &BroadcastConfig, mut job: Pending) -> Option<Pending> {
    let txid = job.tx.compute_txid();
    if let Ok(Some(status)) = wallet.transaction_status(&txid) {
        tracing::debug!(%txid, ?status, "transaction already known to wallet");
        return None;
    }

    match wallet.broadcast(&job.tx) {
        Ok(()) => {
            tracing::info!(%txid, attempts = job.attempts + 1, "transaction broadcast");
            None
        }
        Err(e) => {
            job.attempts += 1;
            if config.max_attempts != 0 && job.attempts >= config.max_attempts {
                tracing::error!(%txid, attempts = job.attempts, error = %e, "giving up on broadcast");
                return None;
            }
            tracing::warn!(
                %txid,
                attempts = job.attempts,
                retry_in_secs = config.retry_backoff.as_secs(),
                error = %e,
                "broadcast failed, will retry"
            );
            job.retry_at = Instant::now() + config.retry_backoff;
            Some(job)
        }
    }
}
