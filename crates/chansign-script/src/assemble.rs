//! scriptSig assembly.
//!
//! Multisig signatures go in the order of the sorted script keys. Time-locked
//! spends follow the branch layout of the script instead.

use bitcoin::opcodes::all::{OP_PUSHBYTES_0, OP_PUSHNUM_1};
use bitcoin::script::{Builder, PushBytesBuf, ScriptBuf};
use bitcoin::secp256k1::PublicKey;
use chansign_crypto::ecdsa::TxSignature;

use crate::{ChannelScript, MultisigScript, Result, ScriptError, TimeLockedScript};

fn push_data(builder: Builder, data: Vec<u8>) -> Result<Builder> {
    let push = PushBytesBuf::try_from(data).map_err(|e| ScriptError::Push(e.to_string()))?;
    Ok(builder.push_slice(push))
}

/// Order a client/server signature pair by the script's canonical key order.
pub fn ordered_signatures<'a>(
    script: &MultisigScript,
    client: &PublicKey,
    client_sig: &'a TxSignature,
    server_sig: &'a TxSignature,
) -> Result<[&'a TxSignature; 2]> {
    match script.key_index(client) {
        Some(0) => Ok([client_sig, server_sig]),
        Some(_) => Ok([server_sig, client_sig]),
        None => Err(ScriptError::KeyNotInScript),
    }
}

/// scriptSig for a spend signed by both parties.
///
/// - multisig: `OP_0 <sig_key0> <sig_key1> <redeem>`
/// - time-locked: `<client_sig> <server_sig> OP_1 <redeem>`
pub fn cosigned_script_sig(
    script: &ChannelScript,
    client: &PublicKey,
    client_sig: &TxSignature,
    server_sig: &TxSignature,
) -> Result<ScriptBuf> {
    let builder = match script {
        ChannelScript::Multisig(multisig) => {
            let [first, second] = ordered_signatures(multisig, client, client_sig, server_sig)?;
            let builder = Builder::new().push_opcode(OP_PUSHBYTES_0);
            let builder = push_data(builder, first.to_vec())?;
            push_data(builder, second.to_vec())?
        }
        ChannelScript::TimeLocked(tla) => {
            if tla.client_key() != client {
                return Err(ScriptError::KeyNotInScript);
            }
            let builder = push_data(Builder::new(), client_sig.to_vec())?;
            push_data(builder, server_sig.to_vec())?.push_opcode(OP_PUSHNUM_1)
        }
    };
    Ok(push_data(builder, script.redeem_script().to_bytes())?.into_script())
}

/// scriptSig for the client-only branch of a time-locked script:
/// `<client_sig> OP_0 <redeem>`.
pub fn refund_path_script_sig(script: &TimeLockedScript, client_sig: &TxSignature) -> Result<ScriptBuf> {
    let builder = push_data(Builder::new(), client_sig.to_vec())?.push_opcode(OP_PUSHBYTES_0);
    Ok(push_data(builder, script.redeem_script().to_bytes())?.into_script())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chansign_crypto::ecdsa::sign_sighash;
    use chansign_crypto::keys::ServerKey;

    #[test]
    fn test_ordered_signatures_follow_key_order() {
        let client = ServerKey::generate();
        let server = ServerKey::generate();
        let script = MultisigScript::new(client.public_key(), server.public_key());
        let client_sig = sign_sighash(&client, [1u8; 32]);
        let server_sig = sign_sighash(&server, [1u8; 32]);

        let ordered =
            ordered_signatures(&script, &client.public_key(), &client_sig, &server_sig).expect("order");
        let client_first = script.keys()[0] == client.public_key();
        if client_first {
            assert_eq!(ordered[0], &client_sig);
        } else {
            assert_eq!(ordered[0], &server_sig);
        }
    }

    #[test]
    fn test_ordered_signatures_unknown_key() {
        let script = MultisigScript::new(
            ServerKey::generate().public_key(),
            ServerKey::generate().public_key(),
        );
        let stranger = ServerKey::generate();
        let sig = sign_sighash(&stranger, [1u8; 32]);
        assert!(matches!(
            ordered_signatures(&script, &stranger.public_key(), &sig, &sig),
            Err(ScriptError::KeyNotInScript)
        ));
    }

    #[test]
    fn test_time_locked_script_sig_layout() {
        let client = ServerKey::generate();
        let server = ServerKey::generate();
        let tla = TimeLockedScript::new(client.public_key(), server.public_key(), 600_000)
            .expect("tla");
        let client_sig = sign_sighash(&client, [1u8; 32]);
        let server_sig = sign_sighash(&server, [1u8; 32]);

        let script_sig = cosigned_script_sig(
            &ChannelScript::TimeLocked(tla.clone()),
            &client.public_key(),
            &client_sig,
            &server_sig,
        )
        .expect("assemble");
        let pushes: Vec<_> = script_sig.instructions().collect();
        assert_eq!(pushes.len(), 4);

        let refund = refund_path_script_sig(&tla, &client_sig).expect("refund");
        assert_eq!(refund.instructions().count(), 3);
    }

    #[test]
    fn test_time_locked_rejects_wrong_client() {
        let client = ServerKey::generate();
        let server = ServerKey::generate();
        let tla = TimeLockedScript::new(client.public_key(), server.public_key(), 600_000)
            .expect("tla");
        let sig = sign_sighash(&server, [1u8; 32]);
        assert!(cosigned_script_sig(
            &ChannelScript::TimeLocked(tla),
            &server.public_key(),
            &sig,
            &sig,
        )
        .is_err());
    }
}
