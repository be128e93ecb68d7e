//! Client request authentication.
//!
//! A client proves it holds the key named in `clientPublicKey` by signing a
//! BLAKE3 digest of the endpoint name and the canonical request body. The
//! signature is a bare DER ECDSA signature with no sighash byte, since it
//! never appears inside a transaction.

use bitcoin::secp256k1::{ecdsa::Signature, Message, PublicKey};

use crate::blake3::{contexts, derive_key, encode_multi_field};
use crate::keys::{secp, ServerKey};
use crate::{CryptoError, Result};

/// Digest signed by the client for one request.
pub fn request_digest(endpoint: &str, payload: &[u8]) -> [u8; 32] {
    derive_key(
        contexts::REQUEST_SIGNATURE,
        &encode_multi_field(&[endpoint.as_bytes(), payload]),
    )
}

/// Sign a request digest, returning the DER encoding.
pub fn sign_request(key: &ServerKey, digest: [u8; 32]) -> Vec<u8> {
    let message = Message::from_digest(digest);
    secp()
        .sign_ecdsa(&message, key.secret_key())
        .serialize_der()
        .to_vec()
}

/// Verify a DER request signature.
///
/// High-S signatures are normalized before verification so that clients using
/// libraries without low-S enforcement are still accepted.
pub fn verify_request(public: &PublicKey, digest: [u8; 32], der: &[u8]) -> Result<()> {
    let mut signature =
        Signature::from_der(der).map_err(|e| CryptoError::MalformedSignature(e.to_string()))?;
    signature.normalize_s();
    secp()
        .verify_ecdsa(&Message::from_digest(digest), &signature, public)
        .map_err(|_| CryptoError::SignatureVerification)
}
