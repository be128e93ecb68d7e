//! Canonical 2-of-2 multisig redeem scripts.
//!
//! `OP_2 <key_a> <key_b> OP_2 OP_CHECKMULTISIG` with `key_a < key_b` by their
//! 33-byte compressed encoding. `OP_CHECKMULTISIG` matches signatures to keys
//! in order, so the scriptSig must list signatures in the same sorted order.

use bitcoin::opcodes::all::{OP_CHECKMULTISIG, OP_PUSHNUM_2};
use bitcoin::script::{Builder, Instruction, Script, ScriptBuf};
use bitcoin::secp256k1::PublicKey;
use bitcoin::{Address, Network};

use crate::{Result, ScriptError};

/// A 2-of-2 multisig redeem script with its keys in canonical order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultisigScript {
    keys: [PublicKey; 2],
    redeem_script: ScriptBuf,
}

/// Sort two keys lexicographically by compressed encoding.
pub fn sorted_keys(a: PublicKey, b: PublicKey) -> [PublicKey; 2] {
    if a.serialize() <= b.serialize() {
        [a, b]
    } else {
        [b, a]
    }
}

impl MultisigScript {
    /// Build the redeem script for two keys, in any order.
    pub fn new(a: PublicKey, b: PublicKey) -> Self {
        let keys = sorted_keys(a, b);
        let redeem_script = Builder::new()
            .push_opcode(OP_PUSHNUM_2)
            .push_key(&bitcoin::PublicKey::new(keys[0]))
            .push_key(&bitcoin::PublicKey::new(keys[1]))
            .push_opcode(OP_PUSHNUM_2)
            .push_opcode(OP_CHECKMULTISIG)
            .into_script();
        Self {
            keys,
            redeem_script,
        }
    }

    /// Parse a redeem script, accepting only the canonical encoding.
    pub fn from_redeem_script(script: &Script) -> Result<Self> {
        let mut keys = Vec::with_capacity(2);
        for (i, instruction) in script.instructions().enumerate() {
            let instruction =
                instruction.map_err(|e| ScriptError::UnrecognizedScript(e.to_string()))?;
            match (i, instruction) {
                (0 | 3, Instruction::Op(op)) if op == OP_PUSHNUM_2 => {}
                (1 | 2, Instruction::PushBytes(bytes)) => {
                    keys.push(chansign_crypto::keys::parse_public_key(bytes.as_bytes())?);
                }
                (4, Instruction::Op(op)) if op == OP_CHECKMULTISIG => {}
                _ => {
                    return Err(ScriptError::UnrecognizedScript(
                        "not a 2-of-2 multisig".into(),
                    ))
                }
            }
        }
        if keys.len() != 2 {
            return Err(ScriptError::UnrecognizedScript("not a 2-of-2 multisig".into()));
        }
        let rebuilt = Self::new(keys[0], keys[1]);
        if rebuilt.redeem_script.as_script() != script {
            return Err(ScriptError::UnrecognizedScript(
                "multisig keys are not in canonical order".into(),
            ));
        }
        Ok(rebuilt)
    }

    /// Keys in canonical (script) order.
    pub fn keys(&self) -> &[PublicKey; 2] {
        &self.keys
    }

    /// Position of `key` in the script, which is also its signature position.
    pub fn key_index(&self, key: &PublicKey) -> Option<usize> {
        self.keys.iter().position(|k| k == key)
    }

    pub fn redeem_script(&self) -> &Script {
        &self.redeem_script
    }

    /// hash160 of the redeem script.
    pub fn script_hash(&self) -> [u8; 20] {
        chansign_crypto::keys::hash160(self.redeem_script.as_bytes())
    }

    /// The P2SH output script paying to this redeem script.
    pub fn script_pubkey(&self) -> ScriptBuf {
        ScriptBuf::new_p2sh(&self.redeem_script.script_hash())
    }

    pub fn address(&self, network: Network) -> Result<Address> {
        Address::p2sh(&self.redeem_script, network).map_err(|e| ScriptError::Address(e.to_string()))
    }
}

/// Derive the 2-of-2 redeem script and P2SH address for a key pair.
pub fn derive_multisig_address(
    keys: [PublicKey; 2],
    network: Network,
) -> Result<(MultisigScript, Address)> {
    let script = MultisigScript::new(keys[0], keys[1]);
    let address = script.address(network)?;
    tracing::debug!(address = %address, "derived multisig address");
    Ok((script, address))
}
