//! Client request signatures.
//!
//! Every mutating request is signed by the key named in its
//! `clientPublicKey`. The engine checks the signature before the request
//! touches the replay table or the cache.

use bitcoin::secp256k1::PublicKey;
use chansign_crypto::auth::{request_digest, verify_request};
use chansign_crypto::keys::ServerKey;
use chansign_types::api::SignedRequest;

use crate::{EngineError, Result};

/// Fill in `request.signature` with `key`.
///
/// This is the client side of [`authenticate`], exposed for channel clients
/// built on this crate.
pub fn sign_request<R: SignedRequest>(key: &ServerKey, request: &mut R) -> Result<()> {
    let payload = request.signing_payload()?;
    let digest = request_digest(R::ENDPOINT.as_str(), &payload);
    request.set_signature(chansign_crypto::auth::sign_request(key, digest));
    Ok(())
}

/// Verify the request signature against `client`. Returns the canonical
/// payload the signature covers.
pub(crate) fn authenticate<R: SignedRequest>(client: &PublicKey, request: &R) -> Result<Vec<u8>> {
    if request.signature().is_empty() {
        return Err(EngineError::InvalidRequestSignature("missing signature".into()));
    }
    let payload = request.signing_payload()?;
    let digest = request_digest(R::ENDPOINT.as_str(), &payload);
    verify_request(client, digest, request.signature())
        .map_err(|e| EngineError::InvalidRequestSignature(e.to_string()))?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chansign_types::api::AbortSignRequest;

    fn abort_request(key: &ServerKey) -> AbortSignRequest {
        AbortSignRequest {
            client_public_key: key.public_key_bytes().to_vec(),
            timestamp: 1_700_000_000,
            outpoints: Vec::new(),
            signature: Vec::new(),
        }
    }

    #[test]
    fn test_signed_request_authenticates() {
        let key = ServerKey::generate();
        let mut request = abort_request(&key);
        sign_request(&key, &mut request).expect("sign");
        let payload = authenticate(&key.public_key(), &request).expect("authenticate");
        assert_eq!(payload, request.signing_payload().expect("payload"));
    }

    #[test]
    fn test_unsigned_request_rejected() {
        let key = ServerKey::generate();
        assert!(matches!(
            authenticate(&key.public_key(), &abort_request(&key)),
            Err(EngineError::InvalidRequestSignature(_))
        ));
    }

    #[test]
    fn test_signature_by_other_key_rejected() {
        let key = ServerKey::generate();
        let mut request = abort_request(&key);
        sign_request(&ServerKey::generate(), &mut request).expect("sign");
        assert!(matches!(
            authenticate(&key.public_key(), &request),
            Err(EngineError::InvalidRequestSignature(_))
        ));
    }

    #[test]
    fn test_tampered_field_rejected() {
        let key = ServerKey::generate();
        let mut request = abort_request(&key);
        sign_request(&key, &mut request).expect("sign");
        request.timestamp += 1;
        assert!(authenticate(&key.public_key(), &request).is_err());
    }
}
