//! # chansign-script
//!
//! Address derivation and script handling for channel funding outputs.
//!
//! A channel is funded into one of two P2SH templates:
//!
//! - a 2-of-2 multisig over the client and server keys, keys sorted
//!   lexicographically by their compressed encoding;
//! - a CLTV time-locked script that needs both signatures before `lock_time`
//!   and the client's alone afterwards.
//!
//! Both are pure functions of their inputs, so the same keys always produce
//! the same redeem script bytes and the same address.
//!
//! ## Modules
//!
//! - [`multisig`]: canonical 2-of-2 redeem scripts
//! - [`timelock`]: CLTV time-locked redeem scripts
//! - [`channel`]: a redeem script of either template
//! - [`assemble`]: scriptSig construction in canonical signature order
//! - [`sighash`]: legacy P2SH sighash and server signing
//! - [`verify`]: independent verification of spends from both templates

pub mod assemble;
pub mod channel;
pub mod multisig;
pub mod sighash;
pub mod timelock;
pub mod verify;

pub use channel::ChannelScript;
pub use multisig::MultisigScript;
pub use timelock::TimeLockedScript;

/// Error types for script operations.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// A key is not a valid compressed secp256k1 point.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// The lock time is zero or otherwise unusable.
    #[error("invalid lock time {0}")]
    InvalidLockTime(i64),

    /// A redeem script does not match either channel template.
    #[error("unrecognized redeem script: {0}")]
    UnrecognizedScript(String),

    /// A key expected in the script is not present.
    #[error("public key is not part of this script")]
    KeyNotInScript,

    /// Input index outside the transaction.
    #[error("input index {index} out of range ({len} inputs)")]
    InputIndex {
        /// Requested index.
        index: usize,
        /// Number of inputs.
        len: usize,
    },

    /// The scriptSig is not push-only or has the wrong shape.
    #[error("invalid scriptSig: {0}")]
    InvalidScriptSig(String),

    /// The redeem script does not hash to the output's script hash.
    #[error("redeem script does not match the spent output")]
    ScriptHashMismatch,

    /// A signature failed to verify against the key it must match.
    #[error("signature verification failed for input {input}")]
    SignatureMismatch {
        /// The failing input.
        input: usize,
    },

    /// The refund path was used before the script's lock time.
    #[error("lock time {required} not reached by transaction lock time {actual}")]
    LockTimeNotReached {
        /// Lock time in the redeem script.
        required: u32,
        /// nLockTime of the spending transaction.
        actual: u32,
    },

    /// Data too large to push.
    #[error("push too large: {0}")]
    Push(String),

    /// Address encoding failed.
    #[error("address error: {0}")]
    Address(String),

    /// Sighash computation failed.
    #[error("sighash error: {0}")]
    Sighash(String),
}

/// Convenience result type for script operations.
pub type Result<T> = std::result::Result<T, ScriptError>;

impl From<chansign_crypto::CryptoError> for ScriptError {
    fn from(err: chansign_crypto::CryptoError) -> Self {
        ScriptError::InvalidPublicKey(err.to_string())
    }
}
