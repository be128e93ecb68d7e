//! # chansign-types
//!
//! Shared domain types used across the chansign workspace: the persistent
//! records, outpoint encoding, and the request/response payloads exchanged
//! with channel clients.

pub mod api;
pub mod outpoint;
pub mod records;

/// Common type aliases.
pub type TxHash = [u8; 32];
pub type ScriptHash = [u8; 20];
pub type Bytes = Vec<u8>;

/// nLockTime values below this are block heights, at or above are unix times.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Outputs below this value are non-standard and never created.
pub const DUST_LIMIT_SAT: u64 = 546;

/// Default bound on the idempotency cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// One day in seconds.
pub const DAY_SECS: u64 = 86_400;

/// Default allowed distance between a declared request timestamp and server time.
pub const DEFAULT_TIME_SKEW_SECS: u64 = DAY_SECS;

/// Default retention for spent-output rows.
pub const DEFAULT_SPENT_RETENTION_SECS: u64 = DAY_SECS;

/// Logical operation names used as the replay-protection endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    KeyExchange,
    CreateTimeLockedAddress,
    Sign,
    Refund,
    Verify,
    AbortSign,
    VirtualPayment,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KeyExchange => "key_exchange",
            Self::CreateTimeLockedAddress => "create_time_locked_address",
            Self::Sign => "sign",
            Self::Refund => "refund",
            Self::Verify => "verify",
            Self::AbortSign => "abort_sign",
            Self::VirtualPayment => "virtual_payment",
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current unix time in seconds.
pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Whether an nLockTime value is a unix timestamp rather than a block height.
pub fn is_timestamp_lock(lock_time: u32) -> bool {
    lock_time >= LOCKTIME_THRESHOLD
}

/// Normalize a client-declared timestamp to seconds.
///
/// Clients may send milliseconds; anything past year 33658 in seconds is
/// treated as a millisecond value.
pub fn normalize_timestamp(declared: u64) -> u64 {
    if declared > 1_000_000_000_000 {
        declared / 1000
    } else {
        declared
    }
}
