//! chansign-daemon: the co-signing server process.
//!
//! Single OS process running a Tokio async runtime. Channel clients talk to
//! it with JSON-RPC over a Unix socket.

mod commands;
mod config;
mod maintenance;
mod rpc;

use std::sync::Arc;

use anyhow::Context;
use bitcoin::Network;
use chansign_db::queries::settings;
use chansign_engine::broadcast;
use chansign_engine::ledger::SqliteLedger;
use chansign_engine::wallet::{MemoryWallet, Wallet};
use chansign_engine::SigningEngine;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::DaemonConfig;
use crate::rpc::RpcServer;

/// Daemon-wide shared state.
pub struct DaemonState {
    /// The engine's connection, shared for maintenance bookkeeping.
    pub db: Arc<tokio::sync::Mutex<rusqlite::Connection>>,
    pub engine: SigningEngine,
    pub config: DaemonConfig,
}

impl DaemonState {
    /// Build the engine and start its broadcast worker.
    pub fn new(
        config: DaemonConfig,
        conn: rusqlite::Connection,
        wallet: Arc<dyn Wallet>,
        shutdown_tx: tokio::sync::broadcast::Sender<()>,
    ) -> (Self, JoinHandle<()>) {
        let db = Arc::new(tokio::sync::Mutex::new(conn));
        let (broadcaster, worker) =
            broadcast::spawn(wallet.clone(), config.broadcast_config(), shutdown_tx.subscribe());
        let engine = SigningEngine::new(
            db.clone(),
            wallet,
            Arc::new(SqliteLedger),
            broadcaster,
            config.engine_config(),
        );
        (Self { db, engine, config }, worker)
    }
}

/// Refuse to run a database created for another network.
fn check_network(conn: &rusqlite::Connection, network: Network) -> anyhow::Result<()> {
    let stored = settings::pin_network(conn, &network.to_string())?;
    if stored != network.to_string() {
        anyhow::bail!("database belongs to network {stored}, configured {network}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = DaemonConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("chansign={}", config.logging.log_level).parse()?),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), network = %config.bitcoin.network, "chansign daemon starting");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;

    // 2. Open database
    let conn = chansign_db::open(&data_dir.join("chansign.db"))?;
    check_network(&conn, config.bitcoin.network)?;

    // 3. Wallet backend
    warn!("using the in-memory wallet; funds are not tracked across restarts");
    let wallet: Arc<dyn Wallet> = Arc::new(MemoryWallet::new(0));

    // 4. Engine, broadcast worker and maintenance
    let (shutdown_tx, _shutdown_rx) = tokio::sync::broadcast::channel(1);
    let (state, broadcast_worker) = DaemonState::new(config, conn, wallet, shutdown_tx.clone());
    let state = Arc::new(state);
    let maintenance = maintenance::spawn(state.clone(), shutdown_tx.subscribe());

    // 5. Serve until shutdown
    let socket_path = data_dir.join("chansign.sock");
    let rpc_server = RpcServer::new(state.clone(), socket_path.clone());
    let mut shutdown_rx = shutdown_tx.subscribe();
    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "RPC server error");
            }
        }
        _ = shutdown_rx.recv() => {
            info!("shutdown signal received");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    // Graceful shutdown
    let _ = shutdown_tx.send(());
    for (name, task) in [("broadcast", broadcast_worker), ("maintenance", maintenance)] {
        if let Err(e) = task.await {
            warn!(task = name, error = %e, "background task ended abnormally");
        }
    }
    let _ = std::fs::remove_file(&socket_path);

    info!("daemon stopped");
    Ok(())
}
