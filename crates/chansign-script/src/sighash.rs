//! Legacy P2SH sighash and per-input signing.

use bitcoin::hashes::Hash;
use bitcoin::script::Script;
use bitcoin::secp256k1::PublicKey;
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::Transaction;
use chansign_crypto::ecdsa::{self, TxSignature};
use chansign_crypto::keys::ServerKey;

use crate::{Result, ScriptError};

/// `SIGHASH_ALL` digest of `input` with `redeem_script` as the script code.
pub fn legacy_sighash(tx: &Transaction, input: usize, redeem_script: &Script) -> Result<[u8; 32]> {
    if input >= tx.input.len() {
        return Err(ScriptError::InputIndex {
            index: input,
            len: tx.input.len(),
        });
    }
    let cache = SighashCache::new(tx);
    let sighash = cache
        .legacy_signature_hash(input, redeem_script, EcdsaSighashType::All.to_u32())
        .map_err(|e| ScriptError::Sighash(e.to_string()))?;
    Ok(sighash.to_byte_array())
}

/// Produce the server's signature for one input.
pub fn sign_input(
    tx: &Transaction,
    input: usize,
    redeem_script: &Script,
    key: &ServerKey,
) -> Result<TxSignature> {
    let sighash = legacy_sighash(tx, input, redeem_script)?;
    Ok(ecdsa::sign_sighash(key, sighash))
}

/// Check one signature for one input against one key.
pub fn verify_input_signature(
    tx: &Transaction,
    input: usize,
    redeem_script: &Script,
    public: &PublicKey,
    signature: &TxSignature,
) -> Result<()> {
    let sighash = legacy_sighash(tx, input, redeem_script)?;
    ecdsa::verify_sighash(public, sighash, signature)
        .map_err(|_| ScriptError::SignatureMismatch { input })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::spending_tx;
    use crate::MultisigScript;

    #[test]
    fn test_sign_and_verify_input() {
        let server = ServerKey::generate();
        let client = ServerKey::generate();
        let script = MultisigScript::new(client.public_key(), server.public_key());
        let tx = spending_tx(2, 0);

        let sig = sign_input(&tx, 1, script.redeem_script(), &server).expect("sign");
        verify_input_signature(&tx, 1, script.redeem_script(), &server.public_key(), &sig)
            .expect("verify");
    }

    #[test]
    fn test_signature_bound_to_input() {
        let server = ServerKey::generate();
        let client = ServerKey::generate();
        let script = MultisigScript::new(client.public_key(), server.public_key());
        let tx = spending_tx(2, 0);

        let sig = sign_input(&tx, 0, script.redeem_script(), &server).expect("sign");
        assert!(matches!(
            verify_input_signature(&tx, 1, script.redeem_script(), &server.public_key(), &sig),
            Err(ScriptError::SignatureMismatch { input: 1 })
        ));
    }

    #[test]
    fn test_input_out_of_range() {
        let server = ServerKey::generate();
        let script = MultisigScript::new(server.public_key(), ServerKey::generate().public_key());
        let tx = spending_tx(1, 0);
        assert!(matches!(
            sign_input(&tx, 3, script.redeem_script(), &server),
            Err(ScriptError::InputIndex { index: 3, len: 1 })
        ));
    }
}
