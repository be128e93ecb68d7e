//! secp256k1 key custody.
//!
//! The server generates one key pair per client channel. Only the server ever
//! sees the secret half; clients are identified by their compressed public key.
//!
//! This module wraps `bitcoin::secp256k1` with channel-specific types.

use std::fmt;
use std::sync::OnceLock;

use bitcoin::hashes::{hash160, Hash};
use bitcoin::secp256k1::{self, All, PublicKey, Secp256k1, SecretKey};
use zeroize::Zeroizing;

use crate::{CryptoError, Result};

/// Length of a compressed SEC1 public key.
pub const PUBLIC_KEY_LEN: usize = 33;

/// Length of a secp256k1 secret scalar.
pub const SECRET_KEY_LEN: usize = 32;

/// Shared verification/signing context. Immutable after creation.
pub fn secp() -> &'static Secp256k1<All> {
    static CONTEXT: OnceLock<Secp256k1<All>> = OnceLock::new();
    CONTEXT.get_or_init(Secp256k1::new)
}

/// A server-owned key pair for one channel.
pub struct ServerKey {
    secret: SecretKey,
    public: PublicKey,
}

impl Clone for ServerKey {
    fn clone(&self) -> Self {
        Self {
            secret: self.secret,
            public: self.public,
        }
    }
}

impl Drop for ServerKey {
    fn drop(&mut self) {
        self.secret.non_secure_erase();
    }
}

impl fmt::Debug for ServerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerKey")
            .field("public", &hex::encode(self.public.serialize()))
            .finish_non_exhaustive()
    }
}

impl ServerKey {
    /// Generate a fresh random key pair.
    pub fn generate() -> Self {
        let (secret, public) = secp().generate_keypair(&mut secp256k1::rand::thread_rng());
        Self { secret, public }
    }

    /// Restore a key pair from the stored secret scalar.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let secret = SecretKey::from_slice(bytes).map_err(|_| CryptoError::InvalidSecretKey)?;
        let public = PublicKey::from_secret_key(secp(), &secret);
        Ok(Self { secret, public })
    }

    /// Restore a key pair and check it against the stored public key.
    pub fn from_stored(secret: &[u8], public: &[u8]) -> Result<Self> {
        let key = Self::from_secret_bytes(secret)?;
        if key.public_key_bytes().as_slice() != public {
            return Err(CryptoError::InvalidSecretKey);
        }
        Ok(key)
    }

    /// The secret scalar, wiped when the returned buffer is dropped.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; SECRET_KEY_LEN]> {
        Zeroizing::new(self.secret.secret_bytes())
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// Compressed SEC1 encoding of the public key.
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.public.serialize()
    }
}

/// Parse a client-supplied public key.
///
/// Only the 33-byte compressed form is accepted so that every script built
/// from the key is byte-identical regardless of how the client encoded it.
pub fn parse_public_key(bytes: &[u8]) -> Result<PublicKey> {
    if bytes.len() != PUBLIC_KEY_LEN {
        return Err(CryptoError::InvalidPublicKey(format!(
            "expected {PUBLIC_KEY_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    PublicKey::from_slice(bytes).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}

/// Parse a hex-encoded compressed public key.
pub fn parse_public_key_hex(s: &str) -> Result<PublicKey> {
    let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    parse_public_key(&bytes)
}

/// `RIPEMD160(SHA256(data))`.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    hash160::Hash::hash(data).to_byte_array()
}
