//! Periodic sweep of expired guard state.
//!
//! Runs every `sweep_interval_secs`. The time of the last sweep is kept in the
//! settings table so a restart does not sweep again before the interval is up.

use std::sync::Arc;
use std::time::Duration;

use chansign_db::queries::settings;
use chansign_guard::sweep::SweepReport;
use chansign_types::current_timestamp;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info};

use crate::DaemonState;

pub fn spawn(state: Arc<DaemonState>, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
    tokio::spawn(run(state, shutdown))
}

async fn run(state: Arc<DaemonState>, mut shutdown: broadcast::Receiver<()>) {
    let period = state.config.sweep_interval();
    let first = Instant::now() + initial_delay(&state, period).await;
    let mut ticker = tokio::time::interval_at(first, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = sweep_once(&state).await {
                    error!(error = %e, "maintenance sweep failed");
                }
            }
            _ = shutdown.recv() => break,
        }
    }
    info!("maintenance task stopped");
}

/// Time left until the next sweep is due.
async fn initial_delay(state: &DaemonState, period: Duration) -> Duration {
    let db = state.db.lock().await;
    let last = settings::last_sweep_at(&db).unwrap_or(0);
    let elapsed = Duration::from_secs(current_timestamp().saturating_sub(last));
    period.saturating_sub(elapsed)
}

/// Sweep once and record when.
pub async fn sweep_once(state: &DaemonState) -> anyhow::Result<SweepReport> {
    let report = state.engine.sweep().await?;
    {
        let db = state.db.lock().await;
        settings::record_sweep(&db, current_timestamp())?;
    }
    info!(
        spent_purged = report.spent_purged,
        replay_purged = report.replay_purged,
        burns_released = report.burns_released,
        "maintenance sweep complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaemonConfig;
    use chansign_engine::wallet::MemoryWallet;

    #[tokio::test]
    async fn test_sweep_records_timestamp() {
        let (shutdown_tx, _) = broadcast::channel(1);
        let conn = chansign_db::open_memory().expect("open test db");
        let (state, _worker) = DaemonState::new(
            DaemonConfig::default(),
            conn,
            Arc::new(MemoryWallet::new(0)),
            shutdown_tx,
        );

        let period = state.config.sweep_interval();
        assert_eq!(initial_delay(&state, period).await, Duration::ZERO);

        sweep_once(&state).await.expect("sweep");
        let db = state.db.lock().await;
        let last = settings::last_sweep_at(&db).expect("setting");
        assert!(last > 0);
        drop(db);
        assert!(initial_delay(&state, period).await > Duration::from_secs(60));
    }
}
