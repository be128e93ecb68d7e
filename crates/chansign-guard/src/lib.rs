//! # chansign-guard
//!
//! Double-spend and replay protection for channel outputs.
//!
//! Every outpoint the server has a key in moves through
//! `Free → Burned → Spent`. Only an explicit abort moves it back from
//! `Burned` to `Free`. The guard also remembers the highest refund lock time
//! signed for each outpoint and every (client, endpoint, timestamp) triple it
//! has accepted.
//!
//! All guard operations take the caller's `&Connection`, which is expected to
//! be inside an `IMMEDIATE` transaction so check-then-write is atomic.
//!
//! ## Modules
//!
//! - [`guard`]: the outpoint state machine, lock-time and replay tracking
//! - [`bloom`]: client-supplied Bloom filter over outpoints
//! - [`sweep`]: periodic purge of expired guard rows

pub mod bloom;
pub mod guard;
pub mod sweep;

pub use guard::{DoubleSpendGuard, GuardPolicy, OutpointState};

/// Error types for guard operations.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// An outpoint is already burned by some client or already spent.
    #[error("output {outpoint} is already burned or spent")]
    BurnedOutputs {
        /// The conflicting outpoint as `txid:vout`.
        outpoint: String,
    },

    /// A refund for this outpoint was already signed with a later lock time.
    #[error("lock time {proposed} is below previously signed lock time {stored}")]
    LockTimeRegression {
        /// Highest lock time signed so far.
        stored: u32,
        /// Lock time of the rejected request.
        proposed: u32,
    },

    /// The same (client, endpoint, timestamp) triple was seen before.
    #[error("request replay detected")]
    ReplayDetected,

    /// The declared timestamp is outside the accepted window.
    #[error("timestamp {declared} is more than {window}s away from server time {now}")]
    TimeSkewTooLarge {
        /// Client-declared timestamp (seconds).
        declared: u64,
        /// Server time (seconds).
        now: u64,
        /// Allowed skew in seconds.
        window: u64,
    },

    /// A Bloom filter payload is malformed.
    #[error("invalid outpoint filter: {0}")]
    InvalidFilter(String),

    /// Storage failure.
    #[error(transparent)]
    Db(#[from] chansign_db::DbError),
}

/// Convenience result type for guard operations.
pub type Result<T> = std::result::Result<T, GuardError>;

