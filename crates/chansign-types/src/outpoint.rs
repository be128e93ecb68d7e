//! Fixed-width outpoint encoding.
//!
//! Outpoints are persisted and hashed as their 36-byte consensus encoding:
//! the txid in internal byte order followed by the output index, little-endian.

use bitcoin::hashes::Hash;
use bitcoin::{OutPoint, Txid};

/// Encoded outpoint length.
pub const OUTPOINT_LEN: usize = 36;

/// A consensus-encoded outpoint.
pub type OutPointBytes = [u8; OUTPOINT_LEN];

/// Outpoint decoding errors.
#[derive(Debug, thiserror::Error)]
pub enum OutPointError {
    #[error("outpoint must be {OUTPOINT_LEN} bytes, got {0}")]
    Length(usize),

    #[error("invalid txid: {0}")]
    Txid(String),
}

/// Encode an outpoint into its 36-byte form.
pub fn encode(outpoint: &OutPoint) -> OutPointBytes {
    let mut out = [0u8; OUTPOINT_LEN];
    out[..32].copy_from_slice(&outpoint.txid.to_byte_array());
    out[32..].copy_from_slice(&outpoint.vout.to_le_bytes());
    out
}

/// Decode an outpoint from its 36-byte form.
pub fn decode(bytes: &[u8]) -> Result<OutPoint, OutPointError> {
    if bytes.len() != OUTPOINT_LEN {
        return Err(OutPointError::Length(bytes.len()));
    }
    let mut txid = [0u8; 32];
    txid.copy_from_slice(&bytes[..32]);
    let mut vout = [0u8; 4];
    vout.copy_from_slice(&bytes[32..]);
    Ok(OutPoint {
        txid: Txid::from_byte_array(txid),
        vout: u32::from_le_bytes(vout),
    })
}

/// Parse a txid in its display (reversed hex) form.
pub fn parse_txid(s: &str) -> Result<Txid, OutPointError> {
    s.parse::<Txid>().map_err(|e| OutPointError::Txid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let outpoint = OutPoint {
            txid: Txid::from_byte_array([0xAB; 32]),
            vout: 2,
        };
        let bytes = encode(&outpoint);
        assert_eq!(&bytes[..32], &[0xAB; 32]);
        assert_eq!(&bytes[32..], &[2, 0, 0, 0]);
        assert_eq!(decode(&bytes).expect("decode"), outpoint);
    }

    #[test]
    fn test_matches_consensus_encoding() {
        let outpoint = OutPoint {
            txid: Txid::from_byte_array([0x11; 32]),
            vout: 0x0102_0304,
        };
        let consensus = bitcoin::consensus::encode::serialize(&outpoint);
        assert_eq!(consensus.as_slice(), encode(&outpoint).as_slice());
    }

    #[test]
    fn test_decode_wrong_length() {
        assert!(matches!(decode(&[0u8; 35]), Err(OutPointError::Length(35))));
    }

    #[test]
    fn test_parse_txid_display_order() {
        let txid = Txid::from_byte_array([0x01; 32]);
        let parsed = parse_txid(&txid.to_string()).expect("parse");
        assert_eq!(parsed, txid);
        assert!(parse_txid("nothex").is_err());
    }
}
