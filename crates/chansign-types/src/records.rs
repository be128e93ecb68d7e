//! Persistent records.
//!
//! Plain data, one struct per table. Keys are compressed SEC1 bytes; all
//! timestamps are unix seconds.

use zeroize::Zeroizing;

use crate::outpoint::OutPointBytes;
use crate::{ScriptHash, TxHash};

/// A channel's key material. At most one per client key.
#[derive(Clone)]
pub struct KeyPairRecord {
    pub client_public_key: Vec<u8>,
    pub server_public_key: Vec<u8>,
    /// Never leaves the server.
    pub server_private_key: Zeroizing<Vec<u8>>,
    pub created_at: u64,
}

impl std::fmt::Debug for KeyPairRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPairRecord")
            .field("client_public_key", &self.client_public_key)
            .field("server_public_key", &self.server_public_key)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// A CLTV time-locked funding address. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeLockedAddressRecord {
    pub client_public_key: Vec<u8>,
    pub server_public_key: Vec<u8>,
    pub lock_time: u32,
    /// hash160 of the redeem script; unique.
    pub address_hash: ScriptHash,
    pub redeem_script: Vec<u8>,
    pub created_at: u64,
}

/// An outpoint consumed by a transaction the server accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpentOutputRecord {
    pub outpoint: OutPointBytes,
    pub client_public_key: Vec<u8>,
    /// The accepted transaction spending the outpoint.
    pub txid: TxHash,
    pub inserted_at: u64,
}

/// An outpoint reserved by a pending, not yet fully signed transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BurnedOutputRecord {
    pub outpoint: OutPointBytes,
    pub client_public_key: Vec<u8>,
    /// Unsigned txid (scriptSigs cleared) of the transaction holding the reservation.
    pub txid: TxHash,
    pub burned_at: u64,
}

/// Off-chain balance and payment nonce of a client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountRecord {
    pub client_public_key: Vec<u8>,
    pub virtual_balance: i64,
    /// Highest nonce accepted on a virtual payment sent by this client.
    pub nonce: u64,
    pub updated_at: u64,
}

/// The highest lock time the server has counter-signed a refund with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedInputRecord {
    pub outpoint: OutPointBytes,
    pub lock_time: u32,
    /// Refund transaction signed at `lock_time`.
    pub txid: TxHash,
    pub updated_at: u64,
}

/// A (client, endpoint, declared timestamp) tuple seen once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayRecord {
    pub client_public_key: Vec<u8>,
    pub endpoint: String,
    pub seen_date: u64,
    pub inserted_at: u64,
}

/// A transaction the server counter-signed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTransactionRecord {
    pub txid: TxHash,
    pub client_public_key: Vec<u8>,
    pub raw_tx: Vec<u8>,
    /// Accepted as an instant payment.
    pub approved: bool,
    pub created_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_pair_debug_hides_private_key() {
        let record = KeyPairRecord {
            client_public_key: vec![0x02; 33],
            server_public_key: vec![0x03; 33],
            server_private_key: Zeroizing::new(vec![0xEE; 32]),
            created_at: 1,
        };
        let rendered = format!("{record:?}");
        assert!(!rendered.contains("238"));
        assert!(rendered.contains("created_at"));
    }
}
