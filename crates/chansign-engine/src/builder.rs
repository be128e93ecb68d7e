//! Coin selection and transaction construction.
//!
//! Everything here is deterministic: the same coins and parameters always
//! produce the same unsigned transaction, so a client can rebuild exactly what
//! the server signs.

use bitcoin::absolute::LockTime;
use bitcoin::script::ScriptBuf;
use bitcoin::secp256k1::PublicKey;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, Sequence, Transaction, TxIn, TxOut, Witness};
use chansign_script::ChannelScript;

use crate::wallet::Utxo;
use crate::{EngineError, Result};

/// An unspent output together with the channel script that locks it.
#[derive(Clone, Debug)]
pub struct Coin {
    pub utxo: Utxo,
    pub script: ChannelScript,
}

impl Coin {
    pub fn value_sat(&self) -> u64 {
        self.utxo.value.to_sat()
    }
}

/// Sum satoshi values, rejecting totals that do not fit in a `u64`.
pub fn sum_sat(values: impl IntoIterator<Item = u64>) -> Result<u64> {
    values
        .into_iter()
        .try_fold(0u64, u64::checked_add)
        .ok_or_else(|| EngineError::InputMismatch("value total overflows".into()))
}

/// `amount + fee`, rejecting amounts too large to pay.
pub fn amount_with_fee(amount_sat: u64, fee_sat: u64) -> Result<u64> {
    amount_sat
        .checked_add(fee_sat)
        .ok_or_else(|| EngineError::InputMismatch(format!("amount {amount_sat} plus fee overflows")))
}

/// Largest-first selection until `target` satoshis are covered.
///
/// Ties are broken by outpoint so the choice does not depend on the order the
/// wallet reported the coins in.
pub fn select_coins(mut coins: Vec<Coin>, target: u64) -> Result<Vec<Coin>> {
    coins.sort_by(|a, b| {
        b.value_sat()
            .cmp(&a.value_sat())
            .then_with(|| a.utxo.outpoint.cmp(&b.utxo.outpoint))
    });

    let available = sum_sat(coins.iter().map(Coin::value_sat))?;
    let mut selected = Vec::new();
    let mut total = 0u64;
    for coin in coins {
        if total >= target {
            break;
        }
        total += coin.value_sat();
        selected.push(coin);
    }
    if total < target {
        return Err(EngineError::NotEnoughCoins {
            available,
            required: target,
        });
    }
    Ok(selected)
}

fn unsigned_input(previous_output: OutPoint, sequence: Sequence) -> TxIn {
    TxIn {
        previous_output,
        script_sig: ScriptBuf::new(),
        sequence,
        witness: Witness::new(),
    }
}

/// Parameters of a channel payment.
#[derive(Clone, Debug)]
pub struct PaymentParams {
    pub destination: ScriptBuf,
    pub amount_sat: u64,
    pub fee_sat: u64,
    /// Where change goes, normally the client's multisig address.
    pub change: ScriptBuf,
    pub dust_limit_sat: u64,
}

/// Build an unsigned payment spending `coins`.
///
/// Change at or below the dust limit is left to the fee.
pub fn build_payment(coins: &[Coin], params: &PaymentParams) -> Result<Transaction> {
    if params.amount_sat <= params.dust_limit_sat {
        return Err(EngineError::InputMismatch(format!(
            "amount {} must exceed the dust limit {}",
            params.amount_sat, params.dust_limit_sat
        )));
    }
    let total = sum_sat(coins.iter().map(Coin::value_sat))?;
    let required = amount_with_fee(params.amount_sat, params.fee_sat)?;
    if total < required {
        return Err(EngineError::NotEnoughCoins {
            available: total,
            required,
        });
    }

    let mut output = vec![TxOut {
        value: Amount::from_sat(params.amount_sat),
        script_pubkey: params.destination.clone(),
    }];
    let change = total - required;
    if change > params.dust_limit_sat {
        output.push(TxOut {
            value: Amount::from_sat(change),
            script_pubkey: params.change.clone(),
        });
    }

    Ok(Transaction {
        version: Version::ONE,
        lock_time: LockTime::ZERO,
        input: coins
            .iter()
            .map(|coin| unsigned_input(coin.utxo.outpoint, Sequence::MAX))
            .collect(),
        output,
    })
}

/// Pay-to-pubkey-hash script of the client's key, the refund destination.
pub fn refund_script_pubkey(client: &PublicKey) -> ScriptBuf {
    ScriptBuf::new_p2pkh(&bitcoin::PublicKey::new(*client).pubkey_hash())
}

/// Build the unsigned refund of `coins` back to `client`, valid from `lock_time`.
///
/// Inputs are ordered by outpoint and carry a non-final sequence so the lock
/// time is enforced.
pub fn build_refund(
    coins: &[(OutPoint, Amount)],
    client: &PublicKey,
    lock_time: u32,
    fee_sat: u64,
    dust_limit_sat: u64,
) -> Result<Transaction> {
    if coins.is_empty() {
        return Err(EngineError::InputMismatch("refund has no outpoints".into()));
    }
    let mut ordered = coins.to_vec();
    ordered.sort_by_key(|(outpoint, _)| *outpoint);

    let total = sum_sat(ordered.iter().map(|(_, value)| value.to_sat()))?;
    let refund = total.saturating_sub(fee_sat);
    if refund <= dust_limit_sat {
        return Err(EngineError::NotEnoughCoins {
            available: total,
            required: fee_sat.saturating_add(dust_limit_sat).saturating_add(1),
        });
    }

    Ok(Transaction {
        version: Version::ONE,
        lock_time: LockTime::from_consensus(lock_time),
        input: ordered
            .iter()
            .map(|(outpoint, _)| unsigned_input(*outpoint, Sequence::ENABLE_LOCKTIME_NO_RBF))
            .collect(),
        output: vec![TxOut {
            value: Amount::from_sat(refund),
            script_pubkey: refund_script_pubkey(client),
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;
    use bitcoin::Txid;
    use chansign_crypto::keys::ServerKey;
    use chansign_script::MultisigScript;

    fn coin(byte: u8, value: u64, script: &ChannelScript) -> Coin {
        Coin {
            utxo: Utxo {
                outpoint: OutPoint {
                    txid: Txid::from_byte_array([byte; 32]),
                    vout: 0,
                },
                value: Amount::from_sat(value),
                script_pubkey: script.script_pubkey(),
            },
            script: script.clone(),
        }
    }

    fn multisig() -> ChannelScript {
        ChannelScript::Multisig(MultisigScript::new(
            ServerKey::generate().public_key(),
            ServerKey::generate().public_key(),
        ))
    }

    #[test]
    fn test_select_largest_first() {
        let script = multisig();
        let coins = vec![
            coin(1, 1_000, &script),
            coin(2, 50_000, &script),
            coin(3, 20_000, &script),
        ];
        let selected = select_coins(coins, 60_000).expect("select");
        let values: Vec<u64> = selected.iter().map(Coin::value_sat).collect();
        assert_eq!(values, vec![50_000, 20_000]);
    }

    #[test]
    fn test_select_not_enough() {
        let script = multisig();
        let err = select_coins(vec![coin(1, 1_000, &script)], 5_000).expect_err("short");
        assert!(matches!(
            err,
            EngineError::NotEnoughCoins { available: 1_000, required: 5_000 }
        ));
    }

    #[test]
    fn test_payment_change_and_dust() {
        let script = multisig();
        let coins = vec![coin(1, 100_000, &script)];
        let mut params = PaymentParams {
            destination: ScriptBuf::from_bytes(vec![0x51]),
            amount_sat: 50_000,
            fee_sat: 10_000,
            change: script.script_pubkey(),
            dust_limit_sat: 546,
        };
        let tx = build_payment(&coins, &params).expect("build");
        assert_eq!(tx.output.len(), 2);
        assert_eq!(tx.output[1].value, Amount::from_sat(40_000));
        assert_eq!(tx.output[1].script_pubkey, script.script_pubkey());

        params.amount_sat = 89_700;
        let tx = build_payment(&coins, &params).expect("build");
        assert_eq!(tx.output.len(), 1, "dust change goes to fee");

        params.amount_sat = 100;
        assert!(matches!(build_payment(&coins, &params), Err(EngineError::InputMismatch(_))));
    }

    #[test]
    fn test_payment_amount_overflow() {
        let script = multisig();
        let params = PaymentParams {
            destination: ScriptBuf::from_bytes(vec![0x51]),
            amount_sat: u64::MAX,
            fee_sat: 10_000,
            change: script.script_pubkey(),
            dust_limit_sat: 546,
        };
        assert!(matches!(
            build_payment(&[coin(1, 100_000, &script)], &params),
            Err(EngineError::InputMismatch(_))
        ));
        assert!(matches!(sum_sat([u64::MAX, 2]), Err(EngineError::InputMismatch(_))));
        assert_eq!(sum_sat([u64::MAX - 2, 2]).expect("fits"), u64::MAX);
    }

    #[test]
    fn test_refund_is_order_independent() {
        let client = ServerKey::generate().public_key();
        let a = (
            OutPoint { txid: Txid::from_byte_array([1; 32]), vout: 1 },
            Amount::from_sat(30_000),
        );
        let b = (
            OutPoint { txid: Txid::from_byte_array([2; 32]), vout: 0 },
            Amount::from_sat(40_000),
        );
        let one = build_refund(&[a, b], &client, 600_000, 10_000, 546).expect("refund");
        let two = build_refund(&[b, a], &client, 600_000, 10_000, 546).expect("refund");
        assert_eq!(one, two);
        assert_eq!(one.output[0].value, Amount::from_sat(60_000));
        assert_eq!(one.lock_time.to_consensus_u32(), 600_000);
        assert!(one.input.iter().all(|input| !input.sequence.is_final()));
        assert_eq!(one.output[0].script_pubkey, refund_script_pubkey(&client));
    }

    #[test]
    fn test_refund_too_small() {
        let client = ServerKey::generate().public_key();
        let coin = (
            OutPoint { txid: Txid::from_byte_array([1; 32]), vout: 0 },
            Amount::from_sat(10_500),
        );
        assert!(matches!(
            build_refund(&[coin], &client, 600_000, 10_000, 546),
            Err(EngineError::NotEnoughCoins { .. })
        ));
        assert!(build_refund(&[], &client, 600_000, 10_000, 546).is_err());
    }
}
