//! CLTV time-locked redeem scripts.
//!
//! ```text
//! OP_IF
//!     <server_pub> OP_CHECKSIGVERIFY
//! OP_ELSE
//!     <lock_time> OP_CHECKLOCKTIMEVERIFY OP_DROP
//! OP_ENDIF
//! <client_pub> OP_CHECKSIG
//! ```
//!
//! Before `lock_time` a spend needs both signatures (`<client_sig> <server_sig> OP_1`).
//! From `lock_time` on the client spends alone (`<client_sig> OP_0`).

use bitcoin::opcodes::all::{
    OP_CHECKSIG, OP_CHECKSIGVERIFY, OP_CLTV, OP_DROP, OP_ELSE, OP_ENDIF, OP_IF, OP_PUSHNUM_1,
    OP_PUSHNUM_16,
};
use bitcoin::opcodes::Opcode;
use bitcoin::script::{Builder, Instruction, Script, ScriptBuf};
use bitcoin::secp256k1::PublicKey;
use bitcoin::{Address, Network};

use crate::{Result, ScriptError};

/// A time-locked redeem script for one (client, server, lock time) triple.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeLockedScript {
    client: PublicKey,
    server: PublicKey,
    lock_time: u32,
    redeem_script: ScriptBuf,
}

/// Validate a requested lock time as an nLockTime value.
pub fn checked_lock_time(lock_time: i64) -> Result<u32> {
    match u32::try_from(lock_time) {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ScriptError::InvalidLockTime(lock_time)),
    }
}

impl TimeLockedScript {
    /// Build the redeem script.
    ///
    /// # Errors
    ///
    /// - [`ScriptError::InvalidLockTime`] if `lock_time` is zero
    pub fn new(client: PublicKey, server: PublicKey, lock_time: u32) -> Result<Self> {
        if lock_time == 0 {
            return Err(ScriptError::InvalidLockTime(0));
        }
        let redeem_script = Builder::new()
            .push_opcode(OP_IF)
            .push_key(&bitcoin::PublicKey::new(server))
            .push_opcode(OP_CHECKSIGVERIFY)
            .push_opcode(OP_ELSE)
            .push_int(i64::from(lock_time))
            .push_opcode(OP_CLTV)
            .push_opcode(OP_DROP)
            .push_opcode(OP_ENDIF)
            .push_key(&bitcoin::PublicKey::new(client))
            .push_opcode(OP_CHECKSIG)
            .into_script();
        Ok(Self {
            client,
            server,
            lock_time,
            redeem_script,
        })
    }

    /// Parse a redeem script, accepting only the canonical encoding.
    pub fn from_redeem_script(script: &Script) -> Result<Self> {
        let not_time_locked = || ScriptError::UnrecognizedScript("not a time-locked script".into());

        let instructions = script
            .instructions()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ScriptError::UnrecognizedScript(e.to_string()))?;
        if instructions.len() != 10 {
            return Err(not_time_locked());
        }

        let expect_op = |idx: usize, expected: Opcode| match &instructions[idx] {
            Instruction::Op(op) if *op == expected => Ok(()),
            _ => Err(not_time_locked()),
        };
        let key_at = |idx: usize| match &instructions[idx] {
            Instruction::PushBytes(bytes) => {
                chansign_crypto::keys::parse_public_key(bytes.as_bytes()).map_err(ScriptError::from)
            }
            _ => Err(not_time_locked()),
        };

        expect_op(0, OP_IF)?;
        let server = key_at(1)?;
        expect_op(2, OP_CHECKSIGVERIFY)?;
        expect_op(3, OP_ELSE)?;
        let lock_time = match &instructions[4] {
            Instruction::PushBytes(bytes) => decode_script_num(bytes.as_bytes())?,
            Instruction::Op(op)
                if (OP_PUSHNUM_1.to_u8()..=OP_PUSHNUM_16.to_u8()).contains(&op.to_u8()) =>
            {
                i64::from(op.to_u8() - OP_PUSHNUM_1.to_u8() + 1)
            }
            _ => return Err(not_time_locked()),
        };
        expect_op(5, OP_CLTV)?;
        expect_op(6, OP_DROP)?;
        expect_op(7, OP_ENDIF)?;
        let client = key_at(8)?;
        expect_op(9, OP_CHECKSIG)?;

        let rebuilt = Self::new(client, server, checked_lock_time(lock_time)?)?;
        if rebuilt.redeem_script.as_script() != script {
            return Err(ScriptError::UnrecognizedScript(
                "non-minimal time-locked script encoding".into(),
            ));
        }
        Ok(rebuilt)
    }

    pub fn client_key(&self) -> &PublicKey {
        &self.client
    }

    pub fn server_key(&self) -> &PublicKey {
        &self.server
    }

    pub fn lock_time(&self) -> u32 {
        self.lock_time
    }

    pub fn redeem_script(&self) -> &Script {
        &self.redeem_script
    }

    /// hash160 of the redeem script. Unique per (client, server, lock time).
    pub fn script_hash(&self) -> [u8; 20] {
        chansign_crypto::keys::hash160(self.redeem_script.as_bytes())
    }

    pub fn script_pubkey(&self) -> ScriptBuf {
        ScriptBuf::new_p2sh(&self.redeem_script.script_hash())
    }

    pub fn address(&self, network: Network) -> Result<Address> {
        Address::p2sh(&self.redeem_script, network).map_err(|e| ScriptError::Address(e.to_string()))
    }
}

/// Derive the time-locked redeem script and its hash.
///
/// Pure: identical inputs always give byte-identical scripts.
pub fn derive_time_locked_address(
    client: PublicKey,
    server: PublicKey,
    lock_time: i64,
) -> Result<(TimeLockedScript, [u8; 20])> {
    let script = TimeLockedScript::new(client, server, checked_lock_time(lock_time)?)?;
    let hash = script.script_hash();
    Ok((script, hash))
}

/// Decode a minimally encoded script number of at most 5 bytes.
fn decode_script_num(bytes: &[u8]) -> Result<i64> {
    if bytes.is_empty() {
        return Ok(0);
    }
    if bytes.len() > 5 {
        return Err(ScriptError::UnrecognizedScript("script number overflow".into()));
    }
    let mut value: i64 = 0;
    for (i, byte) in bytes.iter().enumerate() {
        value |= i64::from(*byte) << (8 * i);
    }
    let last = bytes[bytes.len() - 1];
    if last & 0x80 != 0 {
        value &= !(0x80_i64 << (8 * (bytes.len() - 1)));
        value = -value;
    }
    Ok(value)
}
