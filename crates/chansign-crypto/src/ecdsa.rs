//! ECDSA signing and verification over transaction sighashes.
//!
//! Signatures travel on the wire and inside scriptSigs as
//! `DER(signature) || sighash_byte`. The server produces and accepts only
//! `SIGHASH_ALL`.

use bitcoin::secp256k1::{Message, PublicKey};
use bitcoin::sighash::EcdsaSighashType;

use crate::keys::{secp, ServerKey};
use crate::{CryptoError, Result};

/// A DER signature paired with its sighash flag.
pub type TxSignature = bitcoin::ecdsa::Signature;

/// Sign a 32-byte sighash with the server key.
///
/// libsecp256k1 always emits low-S signatures, so the result is standard.
pub fn sign_sighash(key: &ServerKey, sighash: [u8; 32]) -> TxSignature {
    let message = Message::from_digest(sighash);
    let signature = secp().sign_ecdsa(&message, key.secret_key());
    TxSignature::sighash_all(signature)
}

/// Verify a signature over a 32-byte sighash.
///
/// # Errors
///
/// - [`CryptoError::UnsupportedSighash`] for anything other than `SIGHASH_ALL`
/// - [`CryptoError::SignatureVerification`] if the signature does not verify
pub fn verify_sighash(public: &PublicKey, sighash: [u8; 32], signature: &TxSignature) -> Result<()> {
    if signature.sighash_type != EcdsaSighashType::All {
        return Err(CryptoError::UnsupportedSighash(signature.sighash_type.to_u32()));
    }
    let message = Message::from_digest(sighash);
    secp()
        .verify_ecdsa(&message, &signature.signature, public)
        .map_err(|_| CryptoError::SignatureVerification)
}

/// Parse `DER || sighash_byte`.
pub fn parse_signature(bytes: &[u8]) -> Result<TxSignature> {
    TxSignature::from_slice(bytes).map_err(|e| CryptoError::MalformedSignature(e.to_string()))
}

/// Parse a hex-encoded `DER || sighash_byte`.
pub fn parse_signature_hex(s: &str) -> Result<TxSignature> {
    let bytes = hex::decode(s).map_err(|e| CryptoError::MalformedSignature(e.to_string()))?;
    parse_signature(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let key = ServerKey::generate();
        let sighash = [0x42u8; 32];
        let sig = sign_sighash(&key, sighash);
        verify_sighash(&key.public_key(), sighash, &sig).expect("verify");
    }

    #[test]
    fn test_verify_wrong_key_fails() {
        let key = ServerKey::generate();
        let other = ServerKey::generate();
        let sig = sign_sighash(&key, [0x42u8; 32]);
        assert!(matches!(
            verify_sighash(&other.public_key(), [0x42u8; 32], &sig),
            Err(CryptoError::SignatureVerification)
        ));
    }

    #[test]
    fn test_verify_wrong_message_fails() {
        let key = ServerKey::generate();
        let sig = sign_sighash(&key, [0x42u8; 32]);
        assert!(verify_sighash(&key.public_key(), [0x43u8; 32], &sig).is_err());
    }

    #[test]
    fn test_wire_encoding_roundtrip() {
        let key = ServerKey::generate();
        let sig = sign_sighash(&key, [0x01u8; 32]);
        let bytes = sig.to_vec();
        assert_eq!(bytes.last().copied(), Some(0x01));
        let parsed = parse_signature_hex(&hex::encode(&bytes)).expect("parse");
        assert_eq!(parsed, sig);
    }

    #[test]
    fn test_rejects_non_sighash_all() {
        let key = ServerKey::generate();
        let mut sig = sign_sighash(&key, [0x01u8; 32]);
        sig.sighash_type = EcdsaSighashType::None;
        assert!(matches!(
            verify_sighash(&key.public_key(), [0x01u8; 32], &sig),
            Err(CryptoError::UnsupportedSighash(0x02))
        ));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            parse_signature(&[0x30, 0x01, 0x01]),
            Err(CryptoError::MalformedSignature(_))
        ));
    }
}
