//! # chansign-crypto
//!
//! Cryptographic primitives for the channel co-signing server.
//!
//! The signing suite is fixed: secp256k1 ECDSA with `SIGHASH_ALL` over legacy
//! (pre-segwit) P2SH sighashes. BLAKE3 is used only for server-internal
//! fingerprints and filter hashing, never for anything that reaches the chain.
//!
//! ## Modules
//!
//! - [`auth`]: Client request signatures
//! - [`blake3`]: Domain-separated BLAKE3 hashing
//! - [`keys`]: Server key custody and client public key parsing
//! - [`ecdsa`]: Sighash signing and verification

pub mod auth;
pub mod blake3;
pub mod ecdsa;
pub mod keys;

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The bytes do not encode a compressed point on secp256k1.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// The bytes do not encode a valid secp256k1 scalar.
    #[error("invalid secret key")]
    InvalidSecretKey,

    /// The bytes are not a DER signature followed by a sighash byte.
    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    /// Only `SIGHASH_ALL` is accepted.
    #[error("unsupported sighash type {0:#04x}")]
    UnsupportedSighash(u32),

    /// ECDSA verification failed.
    #[error("signature verification failed")]
    SignatureVerification,
}

pub type Result<T> = std::result::Result<T, CryptoError>;
