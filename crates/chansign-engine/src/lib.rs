//! # chansign-engine
//!
//! The co-signing engine: key custody, request idempotency, and the rules
//! for when the server may counter-sign a channel spend.
//!
//! ## Modules
//!
//! - [`auth`]: client request signatures
//! - [`keystore`]: per-client server key pairs
//! - [`wallet`]: the on-chain wallet seam and an in-memory implementation
//! - [`ledger`]: the virtual balance seam
//! - [`cache`]: bounded idempotency cache for retried requests
//! - [`builder`]: coin selection and transaction construction
//! - [`engine`]: request envelope, key exchange, addresses, balance
//! - [`signing`]: sign, refund, verify and abort
//! - [`payment`]: virtual payments between clients
//! - [`broadcast`]: background broadcast with retry

pub mod auth;
pub mod broadcast;
pub mod builder;
pub mod cache;
pub mod engine;
pub mod keystore;
pub mod ledger;
pub mod payment;
pub mod signing;
pub mod wallet;

pub use engine::{EngineConfig, SigningEngine};

use chansign_guard::GuardError;
use chansign_script::ScriptError;

/// Broad class of an [`EngineError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or unknown input. Rejected, never retried by the server.
    Input,
    /// A safety rule refused the request.
    ProtocolSafety,
    /// Not enough funds; the client may retry with less.
    Resource,
    /// Unexpected fault. Details are logged, not returned.
    Internal,
}

/// Error types for engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The client has not exchanged keys yet.
    #[error("no key pair for this client")]
    KeysNotFound,

    /// The client already exchanged keys.
    #[error("key pair already exists for this client")]
    KeyAlreadyExists,

    /// No destination address was given.
    #[error("destination address is empty")]
    AddressEmpty,

    /// The request fields do not form a valid request.
    #[error("input mismatch: {0}")]
    InputMismatch(String),

    /// Selected outputs do not cover the amount plus fee.
    #[error("not enough coins: available {available}, required {required}")]
    NotEnoughCoins {
        /// Spendable satoshis after filtering.
        available: u64,
        /// Amount plus fee.
        required: u64,
    },

    /// A client signature failed verification.
    #[error("signature error: {0}")]
    SignatureError(String),

    /// An input is already burned or spent.
    #[error("burned outputs: {0}")]
    BurnedOutputs(String),

    /// A refund with a later lock time was already signed for an input.
    #[error("lock time {proposed} is below previously signed {stored}")]
    LockTimeRegression {
        /// Highest lock time signed so far.
        stored: u32,
        /// Requested lock time.
        proposed: u32,
    },

    #[error("invalid lock time: {0}")]
    InvalidLockTime(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// The request signature does not verify against the declared client key.
    #[error("invalid request signature: {0}")]
    InvalidRequestSignature(String),

    /// A virtual payment nonce that does not exceed the last accepted one.
    #[error("nonce {proposed} does not exceed last accepted {stored}")]
    InvalidNonce {
        stored: u64,
        proposed: u64,
    },

    /// The sender's virtual balance does not cover the payment.
    #[error("insufficient funds: available {available}, required {required}")]
    InsufficientFunds {
        available: i64,
        required: u64,
    },

    /// Same client, endpoint and timestamp seen before.
    #[error("request replay detected")]
    ReplayDetected,

    /// Declared timestamp is outside the accepted window.
    #[error("timestamp {declared} too far from server time {now}")]
    TimeMismatch {
        /// Declared timestamp in seconds.
        declared: u64,
        /// Server time in seconds.
        now: u64,
    },

    /// The wallet collaborator failed.
    #[error("wallet error: {0}")]
    Wallet(#[from] wallet::WalletError),

    /// Storage failure.
    #[error("database error: {0}")]
    Db(#[from] chansign_db::DbError),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// Any other unexpected condition.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::KeysNotFound
            | Self::KeyAlreadyExists
            | Self::AddressEmpty
            | Self::InputMismatch(_)
            | Self::InvalidLockTime(_)
            | Self::InvalidPublicKey(_) => ErrorKind::Input,
            Self::SignatureError(_)
            | Self::BurnedOutputs(_)
            | Self::LockTimeRegression { .. }
            | Self::InvalidRequestSignature(_)
            | Self::InvalidNonce { .. }
            | Self::ReplayDetected
            | Self::TimeMismatch { .. } => ErrorKind::ProtocolSafety,
            Self::NotEnoughCoins { .. } | Self::InsufficientFunds { .. } => ErrorKind::Resource,
            Self::Wallet(_) | Self::Db(_) | Self::Serialization(_) | Self::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Stable upper-snake-case name of the error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::KeysNotFound => "KEYS_NOT_FOUND",
            Self::KeyAlreadyExists => "KEY_ALREADY_EXISTS",
            Self::AddressEmpty => "ADDRESS_EMPTY",
            Self::InputMismatch(_) => "INPUT_MISMATCH",
            Self::NotEnoughCoins { .. } => "NOT_ENOUGH_COINS",
            Self::SignatureError(_) => "SIGNATURE_ERROR",
            Self::BurnedOutputs(_) => "BURNED_OUTPUTS",
            Self::LockTimeRegression { .. } => "LOCK_TIME_REGRESSION",
            Self::InvalidLockTime(_) => "INVALID_LOCK_TIME",
            Self::InvalidPublicKey(_) => "INVALID_PUBLIC_KEY",
            Self::InvalidRequestSignature(_) => "INVALID_REQUEST_SIGNATURE",
            Self::InvalidNonce { .. } => "INVALID_NONCE",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::ReplayDetected => "REPLAY_DETECTED",
            Self::TimeMismatch { .. } => "TIME_MISMATCH",
            Self::Wallet(_) | Self::Db(_) | Self::Serialization(_) | Self::Internal(_) => {
                "SERVER_ERROR"
            }
        }
    }
}

impl From<GuardError> for EngineError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::BurnedOutputs { outpoint } => Self::BurnedOutputs(outpoint),
            GuardError::LockTimeRegression { stored, proposed } => {
                Self::LockTimeRegression { stored, proposed }
            }
            GuardError::ReplayDetected => Self::ReplayDetected,
            GuardError::TimeSkewTooLarge { declared, now, .. } => Self::TimeMismatch { declared, now },
            GuardError::InvalidFilter(msg) => Self::InputMismatch(msg),
            GuardError::Db(e) => Self::Db(e),
        }
    }
}

impl From<ScriptError> for EngineError {
    fn from(err: ScriptError) -> Self {
        match err {
            ScriptError::InvalidPublicKey(msg) => Self::InvalidPublicKey(msg),
            ScriptError::InvalidLockTime(lt) => Self::InvalidLockTime(lt.to_string()),
            ScriptError::SignatureMismatch { input } => {
                Self::SignatureError(format!("input {input} signature does not verify"))
            }
            ScriptError::KeyNotInScript
            | ScriptError::UnrecognizedScript(_)
            | ScriptError::ScriptHashMismatch
            | ScriptError::InputIndex { .. }
            | ScriptError::InvalidScriptSig(_)
            | ScriptError::LockTimeNotReached { .. } => Self::InputMismatch(err.to_string()),
            ScriptError::Push(_) | ScriptError::Address(_) | ScriptError::Sighash(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenience result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_errors_keep_meaning() {
        let err: EngineError = GuardError::LockTimeRegression {
            stored: 600_000,
            proposed: 590_000,
        }
        .into();
        assert_eq!(err.code(), "LOCK_TIME_REGRESSION");
        assert_eq!(err.kind(), ErrorKind::ProtocolSafety);

        let err: EngineError = GuardError::TimeSkewTooLarge {
            declared: 1,
            now: 200_000,
            window: 86_400,
        }
        .into();
        assert_eq!(err.code(), "TIME_MISMATCH");
    }

    #[test]
    fn test_script_signature_mismatch_is_signature_error() {
        let err: EngineError = ScriptError::SignatureMismatch { input: 2 }.into();
        assert!(matches!(err, EngineError::SignatureError(_)));
        assert_eq!(err.kind(), ErrorKind::ProtocolSafety);
    }

    #[test]
    fn test_internal_errors_share_generic_code() {
        let err = EngineError::Internal("boom".into());
        assert_eq!(err.code(), "SERVER_ERROR");
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(
            EngineError::NotEnoughCoins { available: 1, required: 2 }.kind(),
            ErrorKind::Resource
        );
    }
}
