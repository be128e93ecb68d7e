//! Integration test crate for the co-signing server.
//!
//! The library half holds the fixtures shared by the scenario tests under
//! `tests/`: an engine over an in-memory database and wallet, a simulated
//! channel client that signs its half of every spend, and helpers to build
//! and complete transactions.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p chansign-integration-tests
//! ```

use std::sync::Arc;

use bitcoin::consensus::encode::{deserialize, serialize};
use bitcoin::address::NetworkUnchecked;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::PublicKey;
use bitcoin::{Address, Amount, Network, OutPoint, Transaction, Txid};
use chansign_crypto::ecdsa::parse_signature;
use chansign_crypto::keys::{parse_public_key, ServerKey};
use chansign_engine::auth::sign_request;
use chansign_engine::broadcast::{self, BroadcastConfig};
use chansign_engine::ledger::SqliteLedger;
use chansign_engine::wallet::{MemoryWallet, Wallet};
use chansign_engine::{EngineConfig, SigningEngine};
use chansign_guard::{DoubleSpendGuard, OutpointState};
use chansign_script::assemble::cosigned_script_sig;
use chansign_script::sighash::sign_input;
use chansign_script::{ChannelScript, MultisigScript, TimeLockedScript};
use chansign_types::api::{
    KeyExchangeRequest, SignRequest, SignResponse, SignedRequest, TimeLockedAddressRequest,
    VerifyRequest, VerifyResponse,
};
use chansign_types::current_timestamp;
use rusqlite::Connection;
use tokio::sync::Mutex;

/// Best height every test wallet starts at.
pub const START_HEIGHT: u32 = 500_000;

/// A running engine plus direct handles on its database and wallet.
pub struct Server {
    pub engine: Arc<SigningEngine>,
    pub db: Arc<Mutex<Connection>>,
    pub wallet: Arc<MemoryWallet>,
    shutdown: tokio::sync::broadcast::Sender<()>,
}

impl Server {
    /// Start a server with default policy. Needs a tokio runtime.
    pub fn start() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let db = Arc::new(Mutex::new(chansign_db::open_memory().expect("open test db")));
        let wallet = Arc::new(MemoryWallet::new(START_HEIGHT));
        let (shutdown, _) = tokio::sync::broadcast::channel(1);
        let (broadcaster, _worker) = broadcast::spawn(
            wallet.clone(),
            BroadcastConfig {
                retry_backoff: std::time::Duration::from_millis(10),
                max_attempts: 0,
            },
            shutdown.subscribe(),
        );
        let engine = Arc::new(SigningEngine::new(
            db.clone(),
            wallet.clone(),
            Arc::new(SqliteLedger),
            broadcaster,
            config,
        ));
        Self {
            engine,
            db,
            wallet,
            shutdown,
        }
    }

    /// Guard state of an outpoint, read directly from the database.
    pub async fn state(&self, outpoint: &OutPoint) -> OutpointState {
        let conn = self.db.lock().await;
        DoubleSpendGuard::default().state(&conn, outpoint).expect("guard state")
    }

    /// Wait until the wallet has accepted `count` broadcasts.
    pub async fn wait_for_broadcasts(&self, count: usize) -> Vec<Transaction> {
        for _ in 0..400 {
            let broadcasts = self.wallet.broadcasts();
            if broadcasts.len() >= count {
                return broadcasts;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        self.wallet.broadcasts()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
    }
}

/// A channel client holding its own key and signing its half of each spend.
pub struct Client {
    pub key: ServerKey,
    pub server_key: Option<PublicKey>,
    timestamp: u64,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Self {
        Self {
            key: ServerKey::generate(),
            server_key: None,
            timestamp: current_timestamp(),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }

    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.key.public_key_bytes().to_vec()
    }

    /// A second handle on the same channel whose timestamps never collide
    /// with this one's.
    pub fn sibling(&self) -> Self {
        Self {
            key: self.key.clone(),
            server_key: self.server_key,
            timestamp: self.timestamp + 10_000,
        }
    }

    /// `request` with the client's request signature filled in.
    pub fn signed<R: SignedRequest>(&self, mut request: R) -> R {
        sign_request(&self.key, &mut request).expect("sign request");
        request
    }

    /// A fresh declared timestamp for the next request.
    pub fn next_timestamp(&mut self) -> u64 {
        self.timestamp += 1;
        self.timestamp
    }

    /// Register with the server and remember its key.
    pub async fn exchange_keys(&mut self, server: &Server) -> MultisigScript {
        let timestamp = self.next_timestamp();
        let response = server
            .engine
            .key_exchange(self.signed(KeyExchangeRequest {
                client_public_key: self.public_key_bytes(),
                timestamp,
                signature: Vec::new(),
            }))
            .await
            .expect("key exchange");
        let server_key = parse_public_key(&response.server_public_key).expect("server key");
        self.server_key = Some(server_key);
        MultisigScript::new(self.public_key(), server_key)
    }

    pub fn server_key(&self) -> PublicKey {
        self.server_key.expect("keys exchanged")
    }

    /// Request a time-locked address and check it against a local derivation.
    pub async fn time_locked_address(&mut self, server: &Server, lock_time: i64) -> TimeLockedScript {
        let timestamp = self.next_timestamp();
        let response = server
            .engine
            .create_time_locked_address(self.signed(TimeLockedAddressRequest {
                client_public_key: self.public_key_bytes(),
                lock_time,
                timestamp,
                signature: Vec::new(),
            }))
            .await
            .expect("time-locked address");
        let script = TimeLockedScript::new(
            self.public_key(),
            self.server_key(),
            u32::try_from(lock_time).expect("lock time fits"),
        )
        .expect("local derivation");
        assert_eq!(response.redeem_script, script.redeem_script().to_bytes());
        script
    }

    /// Ask the server to build and half-sign a payment.
    pub async fn pay(&mut self, server: &Server, amount_sat: u64) -> chansign_engine::Result<SignResponse> {
        let timestamp = self.next_timestamp();
        server
            .engine
            .sign(self.signed(SignRequest {
                client_public_key: self.public_key_bytes(),
                timestamp,
                destination: Some(destination()),
                amount_sat: Some(amount_sat),
                ..SignRequest::default()
            }))
            .await
    }

    /// Ask the server to half-sign a client-built transaction.
    pub async fn half_sign(&mut self, server: &Server, tx: &Transaction) -> chansign_engine::Result<SignResponse> {
        let timestamp = self.next_timestamp();
        self.half_sign_at(server, tx, timestamp).await
    }

    pub async fn half_sign_at(
        &self,
        server: &Server,
        tx: &Transaction,
        timestamp: u64,
    ) -> chansign_engine::Result<SignResponse> {
        server
            .engine
            .sign(self.signed(SignRequest {
                client_public_key: self.public_key_bytes(),
                timestamp,
                transaction: Some(serialize(tx)),
                ..SignRequest::default()
            }))
            .await
    }

    /// Ask the server to co-sign a transaction the client has already signed.
    pub async fn cosign(
        &mut self,
        server: &Server,
        tx: &Transaction,
        scripts: &[ChannelScript],
    ) -> chansign_engine::Result<SignResponse> {
        let timestamp = self.next_timestamp();
        server
            .engine
            .sign(self.signed(SignRequest {
                client_public_key: self.public_key_bytes(),
                timestamp,
                transaction: Some(serialize(tx)),
                client_signatures: Some(self.sign_all(tx, scripts)),
                ..SignRequest::default()
            }))
            .await
    }

    pub async fn verify(&mut self, server: &Server, tx: &Transaction) -> chansign_engine::Result<VerifyResponse> {
        let timestamp = self.next_timestamp();
        server
            .engine
            .verify(self.signed(VerifyRequest {
                client_public_key: self.public_key_bytes(),
                timestamp,
                transaction: serialize(tx),
                signature: Vec::new(),
            }))
            .await
    }

    /// Add the client's signatures to a half-signed response.
    ///
    /// `scripts[i]` is the channel script locking input `i`.
    pub fn complete(&self, response: &SignResponse, scripts: &[ChannelScript]) -> Transaction {
        let unsigned: Transaction = deserialize(&response.transaction).expect("decode");
        let mut tx = unsigned.clone();
        for (i, (server_sig, script)) in response.server_signatures.iter().zip(scripts).enumerate() {
            let server_sig = parse_signature(server_sig).expect("server signature");
            let client_sig = sign_input(&unsigned, i, script.redeem_script(), &self.key).expect("client signature");
            tx.input[i].script_sig =
                cosigned_script_sig(script, &self.public_key(), &client_sig, &server_sig).expect("assemble");
        }
        tx
    }

    /// The client's signature over every input, each against `redeem`.
    pub fn sign_all(&self, tx: &Transaction, scripts: &[ChannelScript]) -> Vec<Vec<u8>> {
        scripts
            .iter()
            .enumerate()
            .map(|(i, script)| {
                sign_input(tx, i, script.redeem_script(), &self.key)
                    .expect("client signature")
                    .to_vec()
            })
            .collect()
    }
}

/// Fund `script_pubkey` with a confirmed output.
pub fn fund(wallet: &MemoryWallet, byte: u8, value_sat: u64, script: &ChannelScript) -> OutPoint {
    let outpoint = OutPoint {
        txid: Txid::from_byte_array([byte; 32]),
        vout: 0,
    };
    wallet.add_utxo(outpoint, Amount::from_sat(value_sat), script.script_pubkey());
    outpoint
}

/// An unsigned one-output spend of `inputs` to a fresh address.
pub fn spend(wallet: &MemoryWallet, inputs: &[OutPoint], fee_sat: u64) -> Transaction {
    use bitcoin::absolute::LockTime;
    use bitcoin::transaction::Version;
    use bitcoin::{ScriptBuf, Sequence, TxIn, TxOut, Witness};

    let total: u64 = inputs
        .iter()
        .map(|op| wallet.find_output(op).expect("wallet").expect("funded").value.to_sat())
        .sum();
    let destination: Address = destination()
        .parse::<Address<NetworkUnchecked>>()
        .expect("address")
        .assume_checked();
    Transaction {
        version: Version::ONE,
        lock_time: LockTime::ZERO,
        input: inputs
            .iter()
            .map(|op| TxIn {
                previous_output: *op,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            })
            .collect(),
        output: vec![TxOut {
            value: Amount::from_sat(total - fee_sat),
            script_pubkey: destination.script_pubkey(),
        }],
    }
}

/// A testnet P2PKH address of a throwaway key.
pub fn destination() -> String {
    let key = bitcoin::PublicKey::new(ServerKey::generate().public_key());
    Address::p2pkh(key.pubkey_hash(), Network::Testnet).to_string()
}
