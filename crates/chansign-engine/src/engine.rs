//! The signing engine service and its request envelope.
//!
//! Every mutating request goes through [`SigningEngine::handle`]:
//!
//! 1. the declared timestamp must be within the skew window and the request
//!    signature must verify against the declared client key;
//! 2. an identical earlier request is answered from the [`RequestCache`];
//! 3. under the database lock, one `IMMEDIATE` transaction records the
//!    replay triple and runs the operation;
//! 4. the response is cached and any finished transaction is queued for
//!    broadcast.
//!
//! A failed request rolls back its replay row too, so a retry after an error
//! is processed again rather than rejected as a replay.

use std::sync::Arc;

use bitcoin::secp256k1::PublicKey;
use bitcoin::{Network, Transaction};
use chansign_crypto::blake3::request_fingerprint;
use chansign_crypto::keys::parse_public_key;
use chansign_db::queries::addresses;
use chansign_guard::sweep::SweepReport;
use chansign_guard::{DoubleSpendGuard, GuardPolicy, OutpointState};
use chansign_script::timelock::{checked_lock_time, derive_time_locked_address};
use chansign_script::{ChannelScript, MultisigScript, TimeLockedScript};
use chansign_types::api::{
    BalanceRequest, BalanceResponse, KeyExchangeRequest, KeyExchangeResponse, SignedRequest,
    TimeLockedAddressRequest, TimeLockedAddressResponse,
};
use chansign_types::records::TimeLockedAddressRecord;
use chansign_types::{current_timestamp, normalize_timestamp, Endpoint, DAY_SECS, LOCKTIME_THRESHOLD};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::auth::authenticate;
use crate::broadcast::BroadcastHandle;
use crate::cache::{CacheKey, CacheLookup, RequestCache};
use crate::keystore::KeyStore;
use crate::ledger::ChannelLedger;
use crate::wallet::Wallet;
use crate::{EngineError, Result};

/// Channel policy the engine enforces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub network: Network,
    /// Earliest accepted timestamp lock time, relative to now.
    pub min_lock_time_secs: u64,
    /// Latest accepted lock time, relative to now.
    pub max_lock_time_days: u64,
    /// Time-locked inputs expiring within this window do not count as
    /// locked for instant payments.
    pub lock_time_threshold_secs: u64,
    pub refund_fee_sat: u64,
    pub payment_fee_sat: u64,
    pub dust_limit_sat: u64,
    pub cache_capacity: usize,
    pub guard: GuardPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            network: Network::Testnet,
            min_lock_time_secs: 3_600,
            max_lock_time_days: 30,
            lock_time_threshold_secs: 4 * 3_600,
            refund_fee_sat: 10_000,
            payment_fee_sat: 10_000,
            dust_limit_sat: chansign_types::DUST_LIMIT_SAT,
            cache_capacity: chansign_types::DEFAULT_CACHE_CAPACITY,
            guard: GuardPolicy::default(),
        }
    }
}

/// What an operation produced inside its transaction.
pub(crate) struct Processed<R> {
    pub response: R,
    /// A fully signed transaction to hand to the wallet after commit.
    pub broadcast: Option<Transaction>,
}

impl<R> Processed<R> {
    pub fn reply(response: R) -> Self {
        Self {
            response,
            broadcast: None,
        }
    }
}

/// The co-signing service. Construct once and share behind an `Arc`.
pub struct SigningEngine {
    pub(crate) db: Arc<Mutex<Connection>>,
    pub(crate) wallet: Arc<dyn Wallet>,
    pub(crate) ledger: Arc<dyn ChannelLedger>,
    pub(crate) broadcaster: BroadcastHandle,
    pub(crate) keys: KeyStore,
    pub(crate) guard: DoubleSpendGuard,
    cache: RequestCache,
    pub(crate) config: EngineConfig,
}

/// Parse the client key of a request.
pub(crate) fn client_key(bytes: &[u8]) -> Result<PublicKey> {
    parse_public_key(bytes).map_err(|e| EngineError::InvalidPublicKey(e.to_string()))
}

impl SigningEngine {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        wallet: Arc<dyn Wallet>,
        ledger: Arc<dyn ChannelLedger>,
        broadcaster: BroadcastHandle,
        config: EngineConfig,
    ) -> Self {
        Self {
            db,
            wallet,
            ledger,
            broadcaster,
            keys: KeyStore,
            guard: DoubleSpendGuard::new(config.guard),
            cache: RequestCache::new(config.cache_capacity),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one mutating request through skew, signature, cache and replay checks.
    pub(crate) async fn handle<Req, Resp, F>(&self, request: &Req, process: F) -> Result<Resp>
    where
        Req: SignedRequest,
        Resp: Serialize + DeserializeOwned,
        F: FnOnce(&Connection, u64) -> Result<Processed<Resp>>,
    {
        let endpoint = Req::ENDPOINT;
        let client_public_key = request.client_public_key();
        let now = current_timestamp();
        let declared = normalize_timestamp(request.timestamp());
        self.guard.check_time_skew(declared, now)?;
        let payload = authenticate(&client_key(client_public_key)?, request)
            .inspect_err(|e| log_rejection(endpoint, e))?;

        let key = CacheKey {
            client_public_key: client_public_key.to_vec(),
            endpoint,
            timestamp: declared,
        };
        let fingerprint = request_fingerprint(endpoint.as_str(), &payload);
        if let Some(cached) = self.cached(&key, &fingerprint)? {
            return Ok(cached);
        }

        let mut conn = self.db.lock().await;
        // A concurrent identical request may have finished while we waited.
        if let Some(cached) = self.cached(&key, &fingerprint)? {
            return Ok(cached);
        }

        let processed = chansign_db::with_transaction(&mut conn, |tx| {
            self.guard
                .check_replay(tx, client_public_key, endpoint, declared, now)?;
            process(tx, now)
        })
        .inspect_err(|e| log_rejection(endpoint, e))?;
        drop(conn);

        self.cache
            .store(key, fingerprint, serde_json::to_value(&processed.response)?);
        if let Some(tx) = processed.broadcast {
            self.broadcaster.submit(tx);
        }
        Ok(processed.response)
    }

    fn cached<Resp: DeserializeOwned>(&self, key: &CacheKey, fingerprint: &[u8; 32]) -> Result<Option<Resp>> {
        match self.cache.lookup(key, fingerprint) {
            CacheLookup::Miss => Ok(None),
            CacheLookup::Hit(body) => {
                tracing::debug!(endpoint = %key.endpoint, "answered from request cache");
                Ok(Some(serde_json::from_value(body)?))
            }
            CacheLookup::Conflict => {
                tracing::warn!(endpoint = %key.endpoint, "cached key reused with a different request");
                Err(EngineError::ReplayDetected)
            }
        }
    }

    /// Validate a requested lock time against policy.
    ///
    /// Timestamps must fall in `[now + min_lock_time_secs, now + max_lock_time_days]`.
    /// Block heights must be above the current best height.
    pub(crate) fn check_lock_time(&self, lock_time: i64, now: u64) -> Result<u32> {
        let lock_time = checked_lock_time(lock_time)?;
        if lock_time >= LOCKTIME_THRESHOLD {
            let value = u64::from(lock_time);
            let earliest = now + self.config.min_lock_time_secs;
            let latest = now + self.config.max_lock_time_days * DAY_SECS;
            if value < earliest || value > latest {
                return Err(EngineError::InvalidLockTime(format!(
                    "timestamp lock time {lock_time} outside accepted window"
                )));
            }
        } else {
            let height = self.wallet.best_height()?;
            if lock_time <= height {
                return Err(EngineError::InvalidLockTime(format!(
                    "height lock time {lock_time} is not above best height {height}"
                )));
            }
        }
        Ok(lock_time)
    }

    /// The client's multisig script and every time-locked script on record.
    pub(crate) fn channel_scripts(
        &self,
        conn: &Connection,
        client: &PublicKey,
        server: &PublicKey,
    ) -> Result<Vec<ChannelScript>> {
        let mut scripts = vec![ChannelScript::Multisig(MultisigScript::new(*client, *server))];
        for record in addresses::list_by_client(conn, &client.serialize())? {
            scripts.push(ChannelScript::TimeLocked(TimeLockedScript::new(
                *client,
                *server,
                record.lock_time,
            )?));
        }
        Ok(scripts)
    }

    /// Register a client and return the server's public key for its channel.
    pub async fn key_exchange(&self, request: KeyExchangeRequest) -> Result<KeyExchangeResponse> {
        let client = client_key(&request.client_public_key)?;
        self.handle(&request, |conn, now| {
            let server = self.keys.provision(conn, &client, now)?;
            self.ledger.open_account(conn, &request.client_public_key, now)?;
            let multisig = MultisigScript::new(client, server.public_key());
            self.wallet.watch_script(&multisig.script_pubkey())?;
            Ok(Processed::reply(KeyExchangeResponse {
                server_public_key: server.public_key_bytes().to_vec(),
            }))
        })
        .await
    }

    /// Derive (or re-derive) a time-locked funding address for the client.
    pub async fn create_time_locked_address(
        &self,
        request: TimeLockedAddressRequest,
    ) -> Result<TimeLockedAddressResponse> {
        let client = client_key(&request.client_public_key)?;
        self.handle(&request, |conn, now| {
            let server = self.keys.load(conn, &client)?;
            let lock_time = self.check_lock_time(request.lock_time, now)?;
            let (script, address_hash) =
                derive_time_locked_address(client, server.public_key(), i64::from(lock_time))?;

            let created = addresses::insert_if_absent(
                conn,
                &TimeLockedAddressRecord {
                    client_public_key: request.client_public_key.clone(),
                    server_public_key: server.public_key_bytes().to_vec(),
                    lock_time,
                    address_hash,
                    redeem_script: script.redeem_script().to_bytes(),
                    created_at: now,
                },
            )?;
            if created {
                self.wallet.watch_script(&script.script_pubkey())?;
                tracing::info!(client = %client, lock_time, "time-locked address created");
            }

            let address = script.address(self.config.network)?;
            Ok(Processed::reply(TimeLockedAddressResponse {
                redeem_script: script.redeem_script().to_bytes(),
                address_hash: address_hash.to_vec(),
                address: address.to_string(),
                lock_time,
            }))
        })
        .await
    }

    /// On-chain funds across the client's channel addresses plus its virtual balance.
    ///
    /// Outputs that are burned or spent do not count.
    pub async fn balance(&self, request: BalanceRequest) -> Result<BalanceResponse> {
        let client = client_key(&request.client_public_key)?;
        let conn = self.db.lock().await;
        let server = self.keys.load(&conn, &client)?;

        let mut onchain = 0u64;
        for script in self.channel_scripts(&conn, &client, &server.public_key())? {
            for utxo in self.wallet.unspent_outputs(&script.script_pubkey())? {
                if self.guard.state(&conn, &utxo.outpoint)? == OutpointState::Free {
                    onchain += utxo.value.to_sat();
                }
            }
        }
        let virtual_balance = self.ledger.virtual_balance(&conn, &request.client_public_key)?;
        let total = i64::try_from(onchain)
            .map_err(|_| EngineError::Internal("on-chain balance overflow".into()))?
            .saturating_add(virtual_balance);

        Ok(BalanceResponse {
            onchain_satoshis: onchain,
            virtual_satoshis: virtual_balance,
            total_satoshis: total,
        })
    }

    /// Purge expired guard rows. Run periodically.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let now = current_timestamp();
        let mut conn = self.db.lock().await;
        let guard = &self.guard;
        let report = chansign_db::with_transaction(&mut conn, |tx| {
            guard.sweep(tx, now).map_err(EngineError::from)
        })?;
        Ok(report)
    }
}

fn log_rejection(endpoint: Endpoint, err: &EngineError) {
    match err.kind() {
        crate::ErrorKind::Internal => tracing::error!(%endpoint, error = %err, "request failed"),
        crate::ErrorKind::ProtocolSafety => {
            tracing::warn!(%endpoint, code = err.code(), error = %err, "request rejected")
        }
        _ => tracing::debug!(%endpoint, code = err.code(), error = %err, "request rejected"),
    }
}
