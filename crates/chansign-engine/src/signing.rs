//! Counter-signing rules.
//!
//! `sign` accepts exactly one of three request shapes:
//!
//! 1. a client-built `transaction`, with or without the client's signatures;
//! 2. a `destination` and `amountSat`, for which the server selects coins and
//!    builds the payment;
//! 3. refund `outpoints`, a `lockTime` and the client's signatures over the
//!    refund the server rebuilds from them.
//!
//! Without client signatures the server burns the inputs and returns only its
//! own signatures. With them it verifies the client's signatures, assembles
//! the scriptSigs in canonical key order, checks the result against the
//! channel templates and commits the inputs as spent.
//!
//! A burn remembers the unsigned txid (scriptSigs cleared) of the transaction
//! it was made for. Co-signing or verifying over a burned input succeeds only
//! for that same transaction.
//!
//! Refunds are time-locked and never broadcast. Their inputs are burned only
//! for the duration of the request, which makes a refund over an output with
//! a pending payment fail, and the lock time per input may only grow.

use std::str::FromStr;

use bitcoin::consensus::encode::{deserialize, serialize};
use bitcoin::hashes::Hash;
use bitcoin::script::ScriptBuf;
use bitcoin::secp256k1::PublicKey;
use bitcoin::{Address, Amount, OutPoint, Transaction, Txid};
use chansign_crypto::ecdsa::{parse_signature, TxSignature};
use chansign_crypto::keys::ServerKey;
use chansign_db::queries::transactions;
use chansign_guard::bloom::OutpointFilter;
use chansign_guard::OutpointState;
use chansign_script::assemble::cosigned_script_sig;
use chansign_script::sighash::{sign_input, verify_input_signature};
use chansign_script::verify::verify_transaction;
use chansign_script::{ChannelScript, MultisigScript};
use chansign_types::api::{
    AbortSignRequest, AbortSignResponse, OutpointCoin, OutpointFilterPayload, OutpointRef,
    RefundRequest, RefundResponse, SignRequest, SignResponse, VerifyRequest, VerifyResponse,
};
use chansign_types::outpoint::parse_txid;
use chansign_types::records::SignedTransactionRecord;
use chansign_types::is_timestamp_lock;
use rusqlite::Connection;

use crate::builder::{
    amount_with_fee, build_payment, build_refund, select_coins, sum_sat, Coin, PaymentParams,
};
use crate::engine::{client_key, Processed};
use crate::{EngineError, Result, SigningEngine};

/// Seconds per block when turning the lock-time threshold into blocks.
const BLOCK_INTERVAL_SECS: u64 = 600;

/// The populated shape of a sign request.
enum SignShape<'a> {
    Transaction {
        raw: &'a [u8],
        client_signatures: Option<&'a [Vec<u8>]>,
    },
    Payment {
        destination: &'a str,
        amount_sat: u64,
        filter: Option<&'a OutpointFilterPayload>,
    },
    Refund {
        outpoints: &'a [OutpointCoin],
        lock_time: u32,
        client_signatures: &'a [Vec<u8>],
        filter: Option<&'a OutpointFilterPayload>,
    },
}

fn classify(request: &SignRequest) -> Result<SignShape<'_>> {
    let has_transaction = request.transaction.is_some();
    let has_payment = request.destination.is_some() || request.amount_sat.is_some();
    let has_refund = request.outpoints.is_some() || request.lock_time.is_some();

    match (has_transaction, has_payment, has_refund) {
        (true, false, false) => Ok(SignShape::Transaction {
            raw: request.transaction.as_deref().unwrap_or_default(),
            client_signatures: request.client_signatures.as_deref(),
        }),
        (false, true, false) => {
            let destination = request
                .destination
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .ok_or(EngineError::AddressEmpty)?;
            let amount_sat = request
                .amount_sat
                .filter(|amount| *amount > 0)
                .ok_or_else(|| EngineError::InputMismatch("amount must be positive".into()))?;
            Ok(SignShape::Payment {
                destination,
                amount_sat,
                filter: request.bloom_filter.as_ref(),
            })
        }
        (false, false, true) => {
            let (Some(outpoints), Some(lock_time), Some(client_signatures)) = (
                request.outpoints.as_deref(),
                request.lock_time,
                request.client_signatures.as_deref(),
            ) else {
                return Err(EngineError::InputMismatch(
                    "refund needs outpoints, lockTime and clientSignatures".into(),
                ));
            };
            Ok(SignShape::Refund {
                outpoints,
                lock_time,
                client_signatures,
                filter: request.bloom_filter.as_ref(),
            })
        }
        _ => Err(EngineError::InputMismatch(
            "exactly one of transaction, destination/amount or outpoints/lockTime is required".into(),
        )),
    }
}

fn decode_transaction(raw: &[u8]) -> Result<Transaction> {
    let tx: Transaction =
        deserialize(raw).map_err(|e| EngineError::InputMismatch(format!("malformed transaction: {e}")))?;
    if tx.input.is_empty() || tx.output.is_empty() {
        return Err(EngineError::InputMismatch("transaction has no inputs or no outputs".into()));
    }
    Ok(tx)
}

fn parse_client_signatures(raw: &[Vec<u8>], inputs: usize) -> Result<Vec<TxSignature>> {
    if raw.len() != inputs {
        return Err(EngineError::InputMismatch(format!(
            "{} client signatures for {inputs} inputs",
            raw.len()
        )));
    }
    raw.iter()
        .map(|bytes| parse_signature(bytes).map_err(|e| EngineError::SignatureError(e.to_string())))
        .collect()
}

fn parse_outpoint(txid: &str, vout: u32) -> Result<OutPoint> {
    let txid = parse_txid(txid).map_err(|e| EngineError::InputMismatch(e.to_string()))?;
    Ok(OutPoint { txid, vout })
}

fn input_outpoints(tx: &Transaction) -> Vec<OutPoint> {
    tx.input.iter().map(|input| input.previous_output).collect()
}

/// Txid of `tx` with every scriptSig cleared. Stable across the signing
/// round trip, unlike the txid of a legacy transaction being signed.
fn unsigned_txid(tx: &Transaction) -> Txid {
    let mut unsigned = tx.clone();
    for input in &mut unsigned.input {
        input.script_sig = ScriptBuf::new();
    }
    unsigned.compute_txid()
}

fn load_filter(payload: Option<&OutpointFilterPayload>) -> Result<Option<OutpointFilter>> {
    Ok(payload.map(OutpointFilter::from_payload).transpose()?)
}

impl SigningEngine {
    /// Counter-sign a channel spend. See the module docs for the three shapes.
    pub async fn sign(&self, request: SignRequest) -> Result<SignResponse> {
        let client = client_key(&request.client_public_key)?;
        let shape = classify(&request)?;
        self.handle(&request, |conn, now| match shape {
            SignShape::Transaction {
                raw,
                client_signatures: None,
            } => self.half_sign_transaction(conn, &client, raw, now),
            SignShape::Transaction {
                raw,
                client_signatures: Some(signatures),
            } => self.cosign_transaction(conn, &client, raw, signatures, now),
            SignShape::Payment {
                destination,
                amount_sat,
                filter,
            } => self.build_and_sign_payment(conn, &client, destination, amount_sat, filter, now),
            SignShape::Refund {
                outpoints,
                lock_time,
                client_signatures,
                filter,
            } => self.rebuild_and_sign_refund(
                conn,
                &client,
                outpoints,
                lock_time,
                client_signatures,
                filter,
                now,
            ),
        })
        .await
    }

    /// Counter-sign a client-built refund transaction.
    pub async fn refund(&self, request: RefundRequest) -> Result<RefundResponse> {
        let client = client_key(&request.client_public_key)?;
        self.handle(&request, |conn, now| {
            let server = self.keys.load(conn, &client)?;
            let multisig = MultisigScript::new(client, server.public_key());
            let tx = decode_transaction(&request.transaction)?;

            let mut input_values = Vec::with_capacity(tx.input.len());
            for input in &tx.input {
                if input.sequence.is_final() {
                    return Err(EngineError::InputMismatch(
                        "refund inputs must not be final".into(),
                    ));
                }
                let utxo = self.wallet.find_output(&input.previous_output)?.ok_or_else(|| {
                    EngineError::InputMismatch(format!("unknown output {}", input.previous_output))
                })?;
                if utxo.script_pubkey != multisig.script_pubkey() {
                    return Err(EngineError::InputMismatch(format!(
                        "output {} is not on the channel address",
                        input.previous_output
                    )));
                }
                input_values.push(utxo.value.to_sat());
            }
            let input_total = sum_sat(input_values)?;
            let output_total = sum_sat(tx.output.iter().map(|o| o.value.to_sat()))?;
            if output_total > input_total {
                return Err(EngineError::InputMismatch(format!(
                    "outputs {output_total} exceed inputs {input_total}"
                )));
            }

            let (server_signatures, signed) = self.countersign_refund(
                conn,
                &client,
                &server,
                &multisig,
                tx,
                &request.client_signatures,
                now,
            )?;
            Ok(Processed::reply(RefundResponse {
                server_signatures,
                transaction: serialize(&signed),
            }))
        })
        .await
    }

    /// Accept a fully signed transaction for broadcast and report whether it
    /// qualifies as an instant payment.
    pub async fn verify(&self, request: VerifyRequest) -> Result<VerifyResponse> {
        let client = client_key(&request.client_public_key)?;
        self.handle(&request, |conn, now| {
            let server = self.keys.load(conn, &client)?;
            let tx = decode_transaction(&request.transaction)?;
            let txid = tx.compute_txid();
            let outpoints = input_outpoints(&tx);

            if let Some(logged) = transactions::find(conn, &txid.to_byte_array())? {
                if self.all_spent_by(conn, &outpoints, &logged.txid)? {
                    return Ok(Processed::reply(VerifyResponse {
                        txid: txid.to_string(),
                        instant: logged.approved,
                    }));
                }
            }

            let scripts = self.channel_scripts(conn, &client, &server.public_key())?;
            let input_scripts = self.resolve_inputs(&tx, &scripts)?;
            let script_pubkeys: Vec<ScriptBuf> =
                input_scripts.iter().map(ChannelScript::script_pubkey).collect();
            verify_transaction(&tx, &script_pubkeys)?;

            let client_bytes = client.serialize();
            let unsigned = unsigned_txid(&tx);
            let reserved = self.check_claims(conn, &client_bytes, &outpoints, &unsigned, &txid)?;
            let instant = reserved && self.inputs_locked(&input_scripts, now)?;

            self.guard
                .commit_spent(conn, &client_bytes, &outpoints, &unsigned, &txid, now)?;
            transactions::record(
                conn,
                &SignedTransactionRecord {
                    txid: txid.to_byte_array(),
                    client_public_key: client_bytes.to_vec(),
                    raw_tx: request.transaction.clone(),
                    approved: instant,
                    created_at: now,
                },
            )?;
            tracing::info!(%txid, instant, "transaction verified");

            Ok(Processed {
                response: VerifyResponse {
                    txid: txid.to_string(),
                    instant,
                },
                broadcast: Some(tx),
            })
        })
        .await
    }

    /// Release outputs the client burned but will not complete.
    pub async fn abort_sign(&self, request: AbortSignRequest) -> Result<AbortSignResponse> {
        let client = client_key(&request.client_public_key)?;
        let outpoints = request
            .outpoints
            .iter()
            .map(|OutpointRef { txid, vout }| parse_outpoint(txid, *vout))
            .collect::<Result<Vec<_>>>()?;
        self.handle(&request, |conn, _now| {
            self.keys.load(conn, &client)?;
            let released = self.guard.abort_burn(conn, &client.serialize(), &outpoints)?;
            tracing::info!(client = %client, released, "sign aborted");
            Ok(Processed::reply(AbortSignResponse { released }))
        })
        .await
    }

    /// Shape 1 without client signatures: burn the inputs and return the
    /// server's signatures only.
    fn half_sign_transaction(
        &self,
        conn: &Connection,
        client: &PublicKey,
        raw: &[u8],
        now: u64,
    ) -> Result<Processed<SignResponse>> {
        let server = self.keys.load(conn, client)?;
        let tx = decode_transaction(raw)?;
        let scripts = self.channel_scripts(conn, client, &server.public_key())?;
        let input_scripts = self.resolve_inputs(&tx, &scripts)?;

        if self.guard.is_double_spend(conn, &tx)? {
            return Err(EngineError::BurnedOutputs("transaction spends committed outputs".into()));
        }
        let unsigned = unsigned_txid(&tx);
        self.guard
            .check_and_burn(conn, &client.serialize(), &input_outpoints(&tx), &unsigned, now)?;
        let server_signatures = sign_all(&tx, &input_scripts, &server)?;

        tracing::info!(txid = %unsigned, inputs = tx.input.len(), "transaction half-signed");
        Ok(Processed::reply(SignResponse {
            server_signatures: encode_signatures(&server_signatures),
            transaction: raw.to_vec(),
            complete: false,
            filtered: false,
        }))
    }

    /// Shape 1 with client signatures: verify, sign, assemble and commit.
    fn cosign_transaction(
        &self,
        conn: &Connection,
        client: &PublicKey,
        raw: &[u8],
        client_signatures: &[Vec<u8>],
        now: u64,
    ) -> Result<Processed<SignResponse>> {
        let server = self.keys.load(conn, client)?;
        let mut tx = decode_transaction(raw)?;
        let scripts = self.channel_scripts(conn, client, &server.public_key())?;
        let input_scripts = self.resolve_inputs(&tx, &scripts)?;
        let client_signatures = parse_client_signatures(client_signatures, tx.input.len())?;

        for (index, (script, signature)) in input_scripts.iter().zip(&client_signatures).enumerate() {
            verify_input_signature(&tx, index, script.redeem_script(), client, signature)?;
        }

        let unsigned = unsigned_txid(&tx);
        let server_signatures = sign_all(&tx, &input_scripts, &server)?;
        for (index, script) in input_scripts.iter().enumerate() {
            tx.input[index].script_sig = cosigned_script_sig(
                script,
                client,
                &client_signatures[index],
                &server_signatures[index],
            )?;
        }
        self.check_assembled(&tx, &input_scripts)?;

        let client_bytes = client.serialize();
        let txid = tx.compute_txid();
        let outpoints = input_outpoints(&tx);
        self.check_claims(conn, &client_bytes, &outpoints, &unsigned, &txid)?;
        self.guard
            .commit_spent(conn, &client_bytes, &outpoints, &unsigned, &txid, now)?;
        let signed = serialize(&tx);
        let instant = self.inputs_locked(&input_scripts, now)?;
        self.log_signed(conn, &client_bytes, &tx, &signed, instant, now)?;
        tracing::info!(%txid, instant, "transaction co-signed");

        Ok(Processed {
            response: SignResponse {
                server_signatures: encode_signatures(&server_signatures),
                transaction: signed,
                complete: true,
                filtered: false,
            },
            broadcast: Some(tx),
        })
    }

    /// Shape 2: select coins, build the payment, burn and half-sign it.
    fn build_and_sign_payment(
        &self,
        conn: &Connection,
        client: &PublicKey,
        destination: &str,
        amount_sat: u64,
        filter: Option<&OutpointFilterPayload>,
        now: u64,
    ) -> Result<Processed<SignResponse>> {
        let server = self.keys.load(conn, client)?;
        let destination = Address::from_str(destination)
            .map_err(|e| EngineError::InputMismatch(format!("invalid destination: {e}")))?
            .require_network(self.config.network)
            .map_err(|e| EngineError::InputMismatch(format!("invalid destination: {e}")))?;
        let filter = load_filter(filter)?;

        let mut coins = Vec::new();
        for script in self.channel_scripts(conn, client, &server.public_key())? {
            if let Some(lock_time) = script.lock_time() {
                if !self.still_locked(lock_time, now)? {
                    continue;
                }
            }
            for utxo in self.wallet.unspent_outputs(&script.script_pubkey())? {
                if filter.as_ref().is_some_and(|f| !f.contains(&utxo.outpoint)) {
                    continue;
                }
                if self.guard.state(conn, &utxo.outpoint)? != OutpointState::Free {
                    continue;
                }
                coins.push(Coin {
                    utxo,
                    script: script.clone(),
                });
            }
        }

        let fee_sat = self.config.payment_fee_sat;
        let selected = select_coins(coins, amount_with_fee(amount_sat, fee_sat)?)?;
        let multisig = MultisigScript::new(*client, server.public_key());
        let tx = build_payment(
            &selected,
            &PaymentParams {
                destination: destination.script_pubkey(),
                amount_sat,
                fee_sat,
                change: multisig.script_pubkey(),
                dust_limit_sat: self.config.dust_limit_sat,
            },
        )?;

        let unsigned = unsigned_txid(&tx);
        self.guard
            .check_and_burn(conn, &client.serialize(), &input_outpoints(&tx), &unsigned, now)?;
        let input_scripts: Vec<ChannelScript> = selected.into_iter().map(|coin| coin.script).collect();
        let server_signatures = sign_all(&tx, &input_scripts, &server)?;

        tracing::info!(
            txid = %unsigned,
            amount_sat,
            inputs = tx.input.len(),
            "payment built and half-signed"
        );
        Ok(Processed::reply(SignResponse {
            server_signatures: encode_signatures(&server_signatures),
            transaction: serialize(&tx),
            complete: false,
            filtered: filter.is_some(),
        }))
    }

    /// Shape 3: rebuild the refund from outpoints and counter-sign it.
    #[allow(clippy::too_many_arguments)]
    fn rebuild_and_sign_refund(
        &self,
        conn: &Connection,
        client: &PublicKey,
        outpoints: &[OutpointCoin],
        lock_time: u32,
        client_signatures: &[Vec<u8>],
        filter: Option<&OutpointFilterPayload>,
        now: u64,
    ) -> Result<Processed<SignResponse>> {
        let server = self.keys.load(conn, client)?;
        let multisig = MultisigScript::new(*client, server.public_key());
        let filter = load_filter(filter)?;

        let mut coins = Vec::with_capacity(outpoints.len());
        for coin in outpoints {
            let outpoint = parse_outpoint(&coin.txid, coin.vout)?;
            if filter.as_ref().is_some_and(|f| !f.contains(&outpoint)) {
                return Err(EngineError::InputMismatch(format!(
                    "outpoint {outpoint} does not match the filter"
                )));
            }
            let utxo = self
                .wallet
                .find_output(&outpoint)?
                .ok_or_else(|| EngineError::InputMismatch(format!("unknown output {outpoint}")))?;
            if utxo.script_pubkey != multisig.script_pubkey() || utxo.value.to_sat() != coin.value_sat {
                return Err(EngineError::InputMismatch(format!(
                    "output {outpoint} does not match the channel address or value"
                )));
            }
            coins.push((outpoint, Amount::from_sat(coin.value_sat)));
        }

        let tx = build_refund(
            &coins,
            client,
            lock_time,
            self.config.refund_fee_sat,
            self.config.dust_limit_sat,
        )?;
        let (server_signatures, signed) =
            self.countersign_refund(conn, client, &server, &multisig, tx, client_signatures, now)?;
        Ok(Processed::reply(SignResponse {
            server_signatures,
            transaction: serialize(&signed),
            complete: true,
            filtered: filter.is_some(),
        }))
    }

    /// Verify the client's refund signatures, enforce lock-time monotonicity
    /// and return the server signatures with the assembled refund.
    #[allow(clippy::too_many_arguments)]
    fn countersign_refund(
        &self,
        conn: &Connection,
        client: &PublicKey,
        server: &ServerKey,
        multisig: &MultisigScript,
        mut tx: Transaction,
        client_signatures: &[Vec<u8>],
        now: u64,
    ) -> Result<(Vec<Vec<u8>>, Transaction)> {
        let lock_time = self.check_lock_time(i64::from(tx.lock_time.to_consensus_u32()), now)?;
        let client_signatures = parse_client_signatures(client_signatures, tx.input.len())?;
        for (index, signature) in client_signatures.iter().enumerate() {
            verify_input_signature(&tx, index, multisig.redeem_script(), client, signature)?;
        }

        let client_bytes = client.serialize();
        let outpoints = input_outpoints(&tx);
        self.guard
            .check_and_burn(conn, &client_bytes, &outpoints, &unsigned_txid(&tx), now)?;

        let script = ChannelScript::Multisig(multisig.clone());
        let input_scripts = vec![script; tx.input.len()];
        let server_signatures = sign_all(&tx, &input_scripts, server)?;
        for (index, script) in input_scripts.iter().enumerate() {
            tx.input[index].script_sig = cosigned_script_sig(
                script,
                client,
                &client_signatures[index],
                &server_signatures[index],
            )?;
        }
        self.check_assembled(&tx, &input_scripts)?;

        let txid = tx.compute_txid();
        for outpoint in &outpoints {
            self.guard
                .record_signed_lock_time(conn, outpoint, lock_time, &txid, now)?;
        }
        self.guard.abort_burn(conn, &client_bytes, &outpoints)?;
        self.log_signed(conn, &client_bytes, &tx, &serialize(&tx), false, now)?;

        tracing::info!(%txid, lock_time, inputs = outpoints.len(), "refund counter-signed");
        Ok((encode_signatures(&server_signatures), tx))
    }

    /// Map each input to the channel script locking the output it spends.
    fn resolve_inputs(&self, tx: &Transaction, scripts: &[ChannelScript]) -> Result<Vec<ChannelScript>> {
        tx.input
            .iter()
            .map(|input| {
                let outpoint = input.previous_output;
                let utxo = self
                    .wallet
                    .find_output(&outpoint)?
                    .ok_or_else(|| EngineError::InputMismatch(format!("unknown output {outpoint}")))?;
                scripts
                    .iter()
                    .find(|script| script.script_pubkey() == utxo.script_pubkey)
                    .cloned()
                    .ok_or_else(|| {
                        EngineError::InputMismatch(format!("output {outpoint} is not on a channel address"))
                    })
            })
            .collect()
    }

    /// Whether a time-locked input is still safely locked.
    fn still_locked(&self, lock_time: u32, now: u64) -> Result<bool> {
        let threshold = self.config.lock_time_threshold_secs;
        if is_timestamp_lock(lock_time) {
            Ok(u64::from(lock_time) > now + threshold)
        } else {
            let height = u64::from(self.wallet.best_height()?);
            Ok(u64::from(lock_time) > height + threshold / BLOCK_INTERVAL_SECS)
        }
    }

    /// Reject inputs claimed by another client or another transaction.
    ///
    /// `unsigned` identifies the transaction a burn must have been made for,
    /// `txid` the signed transaction a spend must have been committed by.
    /// Returns whether every input was already reserved, either burned for
    /// this transaction or committed spent by it.
    fn check_claims(
        &self,
        conn: &Connection,
        client_bytes: &[u8],
        outpoints: &[OutPoint],
        unsigned: &Txid,
        txid: &Txid,
    ) -> Result<bool> {
        let unsigned = unsigned.to_byte_array();
        let txid = txid.to_byte_array();
        let mut reserved = true;
        for outpoint in outpoints {
            match self.guard.state(conn, outpoint)? {
                OutpointState::Spent { txid: spent_by } if spent_by != txid => {
                    return Err(EngineError::BurnedOutputs(outpoint.to_string()));
                }
                OutpointState::Burned {
                    client_public_key,
                    txid: reserved_for,
                } if client_public_key != client_bytes || reserved_for != unsigned => {
                    tracing::warn!(%outpoint, "input burned for another transaction");
                    return Err(EngineError::BurnedOutputs(outpoint.to_string()));
                }
                OutpointState::Free => reserved = false,
                _ => {}
            }
        }
        Ok(reserved)
    }

    /// Whether every time-locked input stays locked past the threshold.
    fn inputs_locked(&self, input_scripts: &[ChannelScript], now: u64) -> Result<bool> {
        for lock_time in input_scripts.iter().filter_map(ChannelScript::lock_time) {
            if !self.still_locked(lock_time, now)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn all_spent_by(&self, conn: &Connection, outpoints: &[OutPoint], txid: &[u8; 32]) -> Result<bool> {
        for outpoint in outpoints {
            match self.guard.state(conn, outpoint)? {
                OutpointState::Spent { txid: spent_by } if &spent_by == txid => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    /// Re-verify an assembled transaction. Failure means the server built a
    /// bad scriptSig, which is an internal fault.
    fn check_assembled(&self, tx: &Transaction, input_scripts: &[ChannelScript]) -> Result<()> {
        let script_pubkeys: Vec<ScriptBuf> = input_scripts.iter().map(ChannelScript::script_pubkey).collect();
        verify_transaction(tx, &script_pubkeys).map_err(|e| {
            tracing::error!(txid = %tx.compute_txid(), error = %e, "assembled transaction failed verification");
            EngineError::Internal("assembled transaction failed verification".into())
        })?;
        Ok(())
    }

    fn log_signed(
        &self,
        conn: &Connection,
        client_bytes: &[u8],
        tx: &Transaction,
        raw: &[u8],
        approved: bool,
        now: u64,
    ) -> Result<()> {
        transactions::record(
            conn,
            &SignedTransactionRecord {
                txid: tx.compute_txid().to_byte_array(),
                client_public_key: client_bytes.to_vec(),
                raw_tx: raw.to_vec(),
                approved,
                created_at: now,
            },
        )?;
        Ok(())
    }
}

/// Server signature for every input, each over its own redeem script.
fn sign_all(tx: &Transaction, input_scripts: &[ChannelScript], server: &ServerKey) -> Result<Vec<TxSignature>> {
    input_scripts
        .iter()
        .enumerate()
        .map(|(index, script)| Ok(sign_input(tx, index, script.redeem_script(), server)?))
        .collect()
}

fn encode_signatures(signatures: &[TxSignature]) -> Vec<Vec<u8>> {
    signatures.iter().map(|signature| signature.to_vec()).collect()
}
