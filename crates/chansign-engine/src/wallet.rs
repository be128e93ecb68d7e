//! The on-chain wallet seam.
//!
//! The engine never talks to the Bitcoin network itself. It asks a [`Wallet`]
//! for the unspent outputs locked by a channel script, tells it which scripts
//! to watch, and hands it finished transactions to broadcast.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use bitcoin::script::{Script, ScriptBuf};
use bitcoin::{Amount, OutPoint, Transaction, Txid};

/// Wallet collaborator failures.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    /// The network refused or could not be reached.
    #[error("broadcast failed: {0}")]
    Broadcast(String),

    #[error("wallet backend unavailable: {0}")]
    Unavailable(String),
}

/// An unspent output the wallet knows about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Utxo {
    pub outpoint: OutPoint,
    pub value: Amount,
    pub script_pubkey: ScriptBuf,
}

/// Where a transaction the wallet has seen stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Confirmed { height: u32 },
}

/// Capability the engine consumes for chain access.
pub trait Wallet: Send + Sync {
    /// Unspent outputs paying `script_pubkey`, pending ones included.
    fn unspent_outputs(&self, script_pubkey: &Script) -> Result<Vec<Utxo>, WalletError>;

    /// Look up a single unspent output.
    fn find_output(&self, outpoint: &OutPoint) -> Result<Option<Utxo>, WalletError>;

    /// Start tracking outputs paying `script_pubkey`.
    fn watch_script(&self, script_pubkey: &Script) -> Result<(), WalletError>;

    fn broadcast(&self, tx: &Transaction) -> Result<(), WalletError>;

    /// Status of a transaction the wallet has seen, if any.
    fn transaction_status(&self, txid: &Txid) -> Result<Option<TxStatus>, WalletError>;

    /// Height of the best block.
    fn best_height(&self) -> Result<u32, WalletError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    utxos: BTreeMap<OutPoint, Utxo>,
    watched: BTreeSet<ScriptBuf>,
    transactions: HashMap<Txid, TxStatus>,
    broadcasts: Vec<Transaction>,
    failures_left: u32,
    best_height: u32,
}

/// A [`Wallet`] held entirely in memory.
///
/// Broadcasting a transaction removes the outputs it spends and adds any of
/// its outputs that pay a watched script, so change shows up immediately.
#[derive(Debug, Default)]
pub struct MemoryWallet {
    state: Mutex<MemoryState>,
}

impl MemoryWallet {
    pub fn new(best_height: u32) -> Self {
        let wallet = Self::default();
        wallet.lock().best_height = best_height;
        wallet
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Credit an output, as if a funding transaction confirmed.
    pub fn add_utxo(&self, outpoint: OutPoint, value: Amount, script_pubkey: ScriptBuf) {
        self.lock().utxos.insert(
            outpoint,
            Utxo {
                outpoint,
                value,
                script_pubkey,
            },
        );
    }

    pub fn set_best_height(&self, height: u32) {
        self.lock().best_height = height;
    }

    /// Make the next `count` broadcasts fail.
    pub fn fail_next_broadcasts(&self, count: u32) {
        self.lock().failures_left = count;
    }

    /// Every transaction successfully broadcast so far.
    pub fn broadcasts(&self) -> Vec<Transaction> {
        self.lock().broadcasts.clone()
    }

    pub fn is_watched(&self, script_pubkey: &Script) -> bool {
        self.lock().watched.contains(script_pubkey)
    }
}

impl Wallet for MemoryWallet {
    fn unspent_outputs(&self, script_pubkey: &Script) -> Result<Vec<Utxo>, WalletError> {
        Ok(self
            .lock()
            .utxos
            .values()
            .filter(|utxo| utxo.script_pubkey.as_script() == script_pubkey)
            .cloned()
            .collect())
    }

    fn find_output(&self, outpoint: &OutPoint) -> Result<Option<Utxo>, WalletError> {
        Ok(self.lock().utxos.get(outpoint).cloned())
    }

    fn watch_script(&self, script_pubkey: &Script) -> Result<(), WalletError> {
        self.lock().watched.insert(script_pubkey.to_owned());
        Ok(())
    }

    fn broadcast(&self, tx: &Transaction) -> Result<(), WalletError> {
        let mut state = self.lock();
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(WalletError::Broadcast("simulated network failure".into()));
        }

        let txid = tx.compute_txid();
        for input in &tx.input {
            state.utxos.remove(&input.previous_output);
        }
        for (vout, output) in tx.output.iter().enumerate() {
            if state.watched.contains(&output.script_pubkey) {
                let outpoint = OutPoint {
                    txid,
                    vout: vout as u32,
                };
                state.utxos.insert(
                    outpoint,
                    Utxo {
                        outpoint,
                        value: output.value,
                        script_pubkey: output.script_pubkey.clone(),
                    },
                );
            }
        }
        state.transactions.insert(txid, TxStatus::Pending);
        state.broadcasts.push(tx.clone());
        Ok(())
    }

    fn transaction_status(&self, txid: &Txid) -> Result<Option<TxStatus>, WalletError> {
        Ok(self.lock().transactions.get(txid).copied())
    }

    fn best_height(&self) -> Result<u32, WalletError> {
        Ok(self.lock().best_height)
    }
}
