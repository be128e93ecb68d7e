//! Request and response payloads exchanged with channel clients.
//!
//! Byte fields are lowercase hex on the wire. Every mutating request carries
//! the client's public key and a client-declared `timestamp`; the pair is the
//! idempotency key. Mutating requests also carry `signature`, the client's DER
//! ECDSA signature over the [`SignedRequest::signing_payload`] of the request.

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};

use crate::Endpoint;

/// A mutating request authenticated by the client key it names.
pub trait SignedRequest: Serialize {
    const ENDPOINT: Endpoint;

    fn client_public_key(&self) -> &[u8];
    fn timestamp(&self) -> u64;
    fn signature(&self) -> &[u8];
    fn set_signature(&mut self, signature: Vec<u8>);

    /// Canonical body covered by the signature: the JSON encoding with
    /// `signature` removed and object keys sorted.
    fn signing_payload(&self) -> serde_json::Result<Vec<u8>> {
        let mut value = serde_json::to_value(self)?;
        if let Some(object) = value.as_object_mut() {
            object.remove("signature");
        }
        serde_json::to_vec(&value)
    }
}

macro_rules! signed_request {
    ($ty:ty, $endpoint:expr) => {
        impl SignedRequest for $ty {
            const ENDPOINT: Endpoint = $endpoint;

            fn client_public_key(&self) -> &[u8] {
                &self.client_public_key
            }

            fn timestamp(&self) -> u64 {
                self.timestamp
            }

            fn signature(&self) -> &[u8] {
                &self.signature
            }

            fn set_signature(&mut self, signature: Vec<u8>) {
                self.signature = signature;
            }
        }
    };
}

/// `key_exchange` request.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyExchangeRequest {
    #[serde_as(as = "Hex")]
    pub client_public_key: Vec<u8>,
    pub timestamp: u64,
    #[serde_as(as = "Hex")]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signature: Vec<u8>,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyExchangeResponse {
    #[serde_as(as = "Hex")]
    pub server_public_key: Vec<u8>,
}

/// `create_time_locked_address` request.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeLockedAddressRequest {
    #[serde_as(as = "Hex")]
    pub client_public_key: Vec<u8>,
    pub lock_time: i64,
    pub timestamp: u64,
    #[serde_as(as = "Hex")]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signature: Vec<u8>,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeLockedAddressResponse {
    #[serde_as(as = "Hex")]
    pub redeem_script: Vec<u8>,
    #[serde_as(as = "Hex")]
    pub address_hash: Vec<u8>,
    /// Base58 P2SH address on the configured network.
    pub address: String,
    pub lock_time: u32,
}

/// An outpoint with the value of the coin it references.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutpointCoin {
    /// Display-order txid.
    pub txid: String,
    pub vout: u32,
    pub value_sat: u64,
}

/// A bare outpoint reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutpointRef {
    pub txid: String,
    pub vout: u32,
}

/// A client-built Bloom filter over outpoints.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutpointFilterPayload {
    #[serde_as(as = "Hex")]
    pub bits: Vec<u8>,
    pub hash_fns: u32,
}

/// `sign` request. Exactly one shape must be populated:
///
/// 1. `transaction` (optionally with `clientSignatures`)
/// 2. `destination` + `amountSat` (optionally `bloomFilter`)
/// 3. `outpoints` + `clientSignatures` + `lockTime` (optionally `bloomFilter`)
#[serde_as]
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignRequest {
    #[serde_as(as = "Hex")]
    pub client_public_key: Vec<u8>,
    pub timestamp: u64,
    #[serde_as(as = "Option<Hex>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_sat: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outpoints: Option<Vec<OutpointCoin>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_time: Option<u32>,
    #[serde_as(as = "Option<Vec<Hex>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_signatures: Option<Vec<Vec<u8>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bloom_filter: Option<OutpointFilterPayload>,
    #[serde_as(as = "Hex")]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signature: Vec<u8>,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignResponse {
    /// One per input, in input order.
    #[serde_as(as = "Vec<Hex>")]
    pub server_signatures: Vec<Vec<u8>>,
    /// The transaction the signatures commit to; fully assembled when `complete`.
    #[serde_as(as = "Hex")]
    pub transaction: Vec<u8>,
    pub complete: bool,
    /// Coin selection or the refund outpoints were restricted by the
    /// client's `bloomFilter`.
    #[serde(default)]
    pub filtered: bool,
}

/// `refund` request over a client-built refund transaction.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    #[serde_as(as = "Hex")]
    pub client_public_key: Vec<u8>,
    pub timestamp: u64,
    #[serde_as(as = "Hex")]
    pub transaction: Vec<u8>,
    #[serde_as(as = "Vec<Hex>")]
    pub client_signatures: Vec<Vec<u8>>,
    #[serde_as(as = "Hex")]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signature: Vec<u8>,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundResponse {
    #[serde_as(as = "Vec<Hex>")]
    pub server_signatures: Vec<Vec<u8>>,
    #[serde_as(as = "Hex")]
    pub transaction: Vec<u8>,
}

/// `verify` request.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    #[serde_as(as = "Hex")]
    pub client_public_key: Vec<u8>,
    pub timestamp: u64,
    #[serde_as(as = "Hex")]
    pub transaction: Vec<u8>,
    #[serde_as(as = "Hex")]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub txid: String,
    /// `false` means `NoInstantPayment`: accepted and broadcast, but not trusted yet.
    pub instant: bool,
}

/// `abort_sign` request.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortSignRequest {
    #[serde_as(as = "Hex")]
    pub client_public_key: Vec<u8>,
    pub timestamp: u64,
    pub outpoints: Vec<OutpointRef>,
    #[serde_as(as = "Hex")]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortSignResponse {
    pub released: usize,
}

/// `virtual_payment` request: move off-chain balance to another client.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualPaymentRequest {
    /// Sender.
    #[serde_as(as = "Hex")]
    pub client_public_key: Vec<u8>,
    pub timestamp: u64,
    #[serde_as(as = "Hex")]
    pub receiver_public_key: Vec<u8>,
    pub amount_sat: u64,
    /// Must exceed the last nonce accepted from the sender.
    pub nonce: u64,
    #[serde_as(as = "Hex")]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualPaymentResponse {
    pub sender_balance: i64,
    pub receiver_balance: i64,
}

signed_request!(KeyExchangeRequest, Endpoint::KeyExchange);
signed_request!(TimeLockedAddressRequest, Endpoint::CreateTimeLockedAddress);
signed_request!(SignRequest, Endpoint::Sign);
signed_request!(RefundRequest, Endpoint::Refund);
signed_request!(VerifyRequest, Endpoint::Verify);
signed_request!(AbortSignRequest, Endpoint::AbortSign);
signed_request!(VirtualPaymentRequest, Endpoint::VirtualPayment);

/// `balance` request. Read-only, so no timestamp.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceRequest {
    #[serde_as(as = "Hex")]
    pub client_public_key: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub onchain_satoshis: u64,
    pub virtual_satoshis: i64,
    pub total_satoshis: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_request_camel_case_hex() {
        let json = serde_json::json!({
            "clientPublicKey": "02aa",
            "timestamp": 1_700_000_000u64,
            "destination": "mipcBbFg9gMiCh81Kj8tqqdgoZub1ZJRfn",
            "amountSat": 5000,
        });
        let request: SignRequest = serde_json::from_value(json).expect("parse");
        assert_eq!(request.client_public_key, vec![0x02, 0xAA]);
        assert_eq!(request.amount_sat, Some(5000));
        assert!(request.transaction.is_none());
        assert!(request.outpoints.is_none());
    }

    #[test]
    fn test_sign_response_hex_encoding() {
        let response = SignResponse {
            server_signatures: vec![vec![0x30, 0x01]],
            transaction: vec![0x01, 0x00],
            complete: false,
            filtered: true,
        };
        let value = serde_json::to_value(&response).expect("serialize");
        assert_eq!(value["serverSignatures"][0], "3001");
        assert_eq!(value["transaction"], "0100");
        assert_eq!(value["complete"], false);
        assert_eq!(value["filtered"], true);
    }

    #[test]
    fn test_refund_request_rejects_bad_hex() {
        let json = serde_json::json!({
            "clientPublicKey": "zz",
            "timestamp": 1u64,
            "transaction": "00",
            "clientSignatures": [],
        });
        assert!(serde_json::from_value::<RefundRequest>(json).is_err());
    }

    #[test]
    fn test_signing_payload_excludes_signature() {
        let mut request = VerifyRequest {
            client_public_key: vec![0x02, 0xAA],
            timestamp: 7,
            transaction: vec![0x01],
            signature: Vec::new(),
        };
        let unsigned = request.signing_payload().expect("payload");
        request.set_signature(vec![0x30, 0x06]);
        assert_eq!(request.signing_payload().expect("payload"), unsigned);
        assert_eq!(
            String::from_utf8(unsigned).expect("utf8"),
            r#"{"clientPublicKey":"02aa","timestamp":7,"transaction":"01"}"#
        );
    }

    #[test]
    fn test_signing_payload_binds_fields() {
        let request = VirtualPaymentRequest {
            client_public_key: vec![0x02],
            timestamp: 1,
            receiver_public_key: vec![0x03],
            amount_sat: 10,
            nonce: 1,
            signature: Vec::new(),
        };
        let mut raised = request.clone();
        raised.amount_sat = 11;
        assert_ne!(
            request.signing_payload().expect("payload"),
            raised.signing_payload().expect("payload")
        );
        assert_eq!(VirtualPaymentRequest::ENDPOINT, Endpoint::VirtualPayment);
    }
}
