//! Independent verification of spends from channel scripts.
//!
//! This does not run a general script interpreter. It evaluates exactly the
//! two channel templates the way the network would: the redeem script must
//! hash to the spent output, `OP_CHECKMULTISIG` signatures must appear in key
//! order, and the time-locked refund branch must satisfy CLTV.

use bitcoin::opcodes::all::{OP_PUSHBYTES_0, OP_PUSHNUM_1};
use bitcoin::script::{Instruction, Script, ScriptBuf};
use bitcoin::Transaction;
use chansign_crypto::ecdsa::{parse_signature, TxSignature};

use crate::sighash::verify_input_signature;
use crate::{ChannelScript, Result, ScriptError};

/// Collect the data pushes of a push-only scriptSig.
fn push_items(script_sig: &Script) -> Result<Vec<Vec<u8>>> {
    let mut items = Vec::new();
    for instruction in script_sig.instructions() {
        match instruction.map_err(|e| ScriptError::InvalidScriptSig(e.to_string()))? {
            Instruction::PushBytes(bytes) => items.push(bytes.as_bytes().to_vec()),
            Instruction::Op(op) if op == OP_PUSHNUM_1 => items.push(vec![1]),
            Instruction::Op(op) if op == OP_PUSHBYTES_0 => items.push(Vec::new()),
            Instruction::Op(op) => {
                return Err(ScriptError::InvalidScriptSig(format!("non-push opcode {op}")))
            }
        }
    }
    Ok(items)
}

fn signature_at(items: &[Vec<u8>], idx: usize) -> Result<TxSignature> {
    parse_signature(&items[idx]).map_err(|e| ScriptError::InvalidScriptSig(e.to_string()))
}

/// Verify that input `index` of `tx` validly spends an output locked by
/// `script_pubkey`, returning the redeem script it revealed.
pub fn verify_input(tx: &Transaction, index: usize, script_pubkey: &Script) -> Result<ChannelScript> {
    let input = tx.input.get(index).ok_or(ScriptError::InputIndex {
        index,
        len: tx.input.len(),
    })?;

    let items = push_items(&input.script_sig)?;
    let redeem_bytes = items
        .last()
        .ok_or_else(|| ScriptError::InvalidScriptSig("empty scriptSig".into()))?;
    let redeem = ScriptBuf::from_bytes(redeem_bytes.clone());

    let redeem_hash = chansign_crypto::keys::hash160(redeem.as_bytes());
    if !script_pubkey.is_p2sh() || script_pubkey.as_bytes()[2..22] != redeem_hash {
        return Err(ScriptError::ScriptHashMismatch);
    }

    let script = ChannelScript::from_redeem_script(&redeem)?;
    let args = &items[..items.len() - 1];

    match &script {
        ChannelScript::Multisig(multisig) => {
            // OP_CHECKMULTISIG consumes one extra element, which must be empty.
            if args.len() != 3 || !args[0].is_empty() {
                return Err(ScriptError::InvalidScriptSig(
                    "expected OP_0 <sig> <sig> <redeem>".into(),
                ));
            }
            for (slot, key) in multisig.keys().iter().enumerate() {
                let signature = signature_at(args, slot + 1)?;
                verify_input_signature(tx, index, &redeem, key, &signature)?;
            }
        }
        ChannelScript::TimeLocked(tla) => match args {
            [_, _, flag] if flag.as_slice() == [1] => {
                verify_input_signature(tx, index, &redeem, tla.server_key(), &signature_at(args, 1)?)?;
                verify_input_signature(tx, index, &redeem, tla.client_key(), &signature_at(args, 0)?)?;
            }
            [_, flag] if flag.is_empty() => {
                check_lock_time(tx, index, tla.lock_time())?;
                verify_input_signature(tx, index, &redeem, tla.client_key(), &signature_at(args, 0)?)?;
            }
            _ => {
                return Err(ScriptError::InvalidScriptSig(
                    "unexpected time-locked branch layout".into(),
                ))
            }
        },
    }

    tracing::trace!(index, "input verified");
    Ok(script)
}

/// OP_CHECKLOCKTIMEVERIFY semantics for a script lock time.
fn check_lock_time(tx: &Transaction, index: usize, required: u32) -> Result<()> {
    let actual = tx.lock_time.to_consensus_u32();
    let same_kind = chansign_types::is_timestamp_lock(actual) == chansign_types::is_timestamp_lock(required);
    let final_input = tx.input[index].sequence.is_final();
    if !same_kind || actual < required || final_input {
        return Err(ScriptError::LockTimeNotReached { required, actual });
    }
    Ok(())
}

/// Verify every input against the output it spends.
pub fn verify_transaction(tx: &Transaction, spent: &[ScriptBuf]) -> Result<Vec<ChannelScript>> {
    if spent.len() != tx.input.len() {
        return Err(ScriptError::InputIndex {
            index: spent.len(),
            len: tx.input.len(),
        });
    }
    spent
        .iter()
        .enumerate()
        .map(|(index, script_pubkey)| verify_input(tx, index, script_pubkey))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::{cosigned_script_sig, refund_path_script_sig};
    use crate::sighash::sign_input;
    use crate::test_util::spending_tx;
    use crate::{MultisigScript, TimeLockedScript};
    use bitcoin::script::{Builder, PushBytesBuf};
    use chansign_crypto::keys::ServerKey;

    fn multisig_fixture() -> (ServerKey, ServerKey, ChannelScript, Transaction) {
        let client = ServerKey::generate();
        let server = ServerKey::generate();
        let script = ChannelScript::Multisig(MultisigScript::new(client.public_key(), server.public_key()));
        (client, server, script, spending_tx(1, 0))
    }

    fn push(builder: Builder, data: Vec<u8>) -> Builder {
        builder.push_slice(PushBytesBuf::try_from(data).expect("push"))
    }

    #[test]
    fn test_multisig_roundtrip_verifies() {
        let (client, server, script, mut tx) = multisig_fixture();
        let client_sig = sign_input(&tx, 0, script.redeem_script(), &client).expect("client");
        let server_sig = sign_input(&tx, 0, script.redeem_script(), &server).expect("server");

        tx.input[0].script_sig =
            cosigned_script_sig(&script, &client.public_key(), &client_sig, &server_sig).expect("assemble");
        verify_input(&tx, 0, &script.script_pubkey()).expect("verify");
    }

    #[test]
    fn test_multisig_swapped_order_fails() {
        let (client, server, script, mut tx) = multisig_fixture();
        let client_sig = sign_input(&tx, 0, script.redeem_script(), &client).expect("client");
        let server_sig = sign_input(&tx, 0, script.redeem_script(), &server).expect("server");
        let ChannelScript::Multisig(multisig) = &script else {
            return;
        };
        let [first, second] =
            crate::assemble::ordered_signatures(multisig, &client.public_key(), &client_sig, &server_sig)
                .expect("order");

        // Reverse of canonical order
        let builder = Builder::new().push_opcode(OP_PUSHBYTES_0);
        let builder = push(builder, second.to_vec());
        let builder = push(builder, first.to_vec());
        let builder = push(builder, script.redeem_script().to_bytes());
        tx.input[0].script_sig = builder.into_script();

        assert!(matches!(
            verify_input(&tx, 0, &script.script_pubkey()),
            Err(ScriptError::SignatureMismatch { input: 0 })
        ));
    }

    #[test]
    fn test_wrong_script_pubkey_fails() {
        let (client, server, script, mut tx) = multisig_fixture();
        let client_sig = sign_input(&tx, 0, script.redeem_script(), &client).expect("client");
        let server_sig = sign_input(&tx, 0, script.redeem_script(), &server).expect("server");
        tx.input[0].script_sig =
            cosigned_script_sig(&script, &client.public_key(), &client_sig, &server_sig).expect("assemble");

        let other = MultisigScript::new(ServerKey::generate().public_key(), server.public_key());
        assert!(matches!(
            verify_input(&tx, 0, &other.script_pubkey()),
            Err(ScriptError::ScriptHashMismatch)
        ));
    }

    #[test]
    fn test_time_locked_cosigned_verifies() {
        let client = ServerKey::generate();
        let server = ServerKey::generate();
        let tla = TimeLockedScript::new(client.public_key(), server.public_key(), 600_000).expect("tla");
        let script = ChannelScript::TimeLocked(tla);
        let mut tx = spending_tx(1, 0);

        let client_sig = sign_input(&tx, 0, script.redeem_script(), &client).expect("client");
        let server_sig = sign_input(&tx, 0, script.redeem_script(), &server).expect("server");
        tx.input[0].script_sig =
            cosigned_script_sig(&script, &client.public_key(), &client_sig, &server_sig).expect("assemble");
        verify_input(&tx, 0, &script.script_pubkey()).expect("verify");
    }

    #[test]
    fn test_time_locked_refund_path_respects_lock_time() {
        let client = ServerKey::generate();
        let server = ServerKey::generate();
        let tla = TimeLockedScript::new(client.public_key(), server.public_key(), 600_000).expect("tla");

        let mut early = spending_tx(1, 599_999);
        let sig = sign_input(&early, 0, tla.redeem_script(), &client).expect("sign");
        early.input[0].script_sig = refund_path_script_sig(&tla, &sig).expect("assemble");
        assert!(matches!(
            verify_input(&early, 0, &tla.script_pubkey()),
            Err(ScriptError::LockTimeNotReached { required: 600_000, actual: 599_999 })
        ));

        let mut late = spending_tx(1, 600_000);
        let sig = sign_input(&late, 0, tla.redeem_script(), &client).expect("sign");
        late.input[0].script_sig = refund_path_script_sig(&tla, &sig).expect("assemble");
        verify_input(&late, 0, &tla.script_pubkey()).expect("verify");
    }

    #[test]
    fn test_verify_transaction_counts_inputs() {
        let (_, _, script, tx) = multisig_fixture();
        assert!(verify_transaction(&tx, &[script.script_pubkey(), script.script_pubkey()]).is_err());
    }
}
