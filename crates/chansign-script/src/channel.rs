//! A channel redeem script of either template.

use bitcoin::script::{Script, ScriptBuf};
use bitcoin::secp256k1::PublicKey;

use crate::{MultisigScript, Result, ScriptError, TimeLockedScript};

/// A funding script the server holds a key in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelScript {
    Multisig(MultisigScript),
    TimeLocked(TimeLockedScript),
}

impl ChannelScript {
    /// Recognize either template from raw redeem script bytes.
    pub fn from_redeem_script(script: &Script) -> Result<Self> {
        if let Ok(multisig) = MultisigScript::from_redeem_script(script) {
            return Ok(Self::Multisig(multisig));
        }
        TimeLockedScript::from_redeem_script(script)
            .map(Self::TimeLocked)
            .map_err(|_| ScriptError::UnrecognizedScript("not a channel script".into()))
    }

    pub fn redeem_script(&self) -> &Script {
        match self {
            Self::Multisig(s) => s.redeem_script(),
            Self::TimeLocked(s) => s.redeem_script(),
        }
    }

    pub fn script_hash(&self) -> [u8; 20] {
        match self {
            Self::Multisig(s) => s.script_hash(),
            Self::TimeLocked(s) => s.script_hash(),
        }
    }

    pub fn script_pubkey(&self) -> ScriptBuf {
        match self {
            Self::Multisig(s) => s.script_pubkey(),
            Self::TimeLocked(s) => s.script_pubkey(),
        }
    }

    /// Lock time of the refund path, if the script has one.
    pub fn lock_time(&self) -> Option<u32> {
        match self {
            Self::Multisig(_) => None,
            Self::TimeLocked(s) => Some(s.lock_time()),
        }
    }

    /// Whether `client` and `server` are exactly the two keys of this script,
    /// each in its own role.
    pub fn is_channel_of(&self, client: &PublicKey, server: &PublicKey) -> bool {
        match self {
            Self::Multisig(s) => {
                client != server && s.key_index(client).is_some() && s.key_index(server).is_some()
            }
            Self::TimeLocked(s) => s.client_key() == client && s.server_key() == server,
        }
    }
}
