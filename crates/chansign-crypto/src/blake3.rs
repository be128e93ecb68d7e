//! Domain-separated BLAKE3 hashing.
//!
//! BLAKE3 serves three purposes inside the server: request fingerprints for
//! the idempotency cache, the digest a client signs to authenticate a request,
//! and bit positions for client-supplied outpoint filters. Each purpose uses
//! its own context string.

/// Registered BLAKE3 context strings.
pub mod contexts {
    /// Fingerprint of a request body stored beside a cached response.
    pub const REQUEST_FINGERPRINT: &str = "chansign v1 request-fingerprint";
    /// Digest of `endpoint || canonical body` signed by the client.
    pub const REQUEST_SIGNATURE: &str = "chansign v1 request-signature";
    /// Prefix for the per-function outpoint filter hashes (`{prefix}{i}`).
    pub const OUTPOINT_FILTER_PREFIX: &str = "chansign v1 outpoint-filter-hash-";

    /// All fixed context strings.
    pub const ALL_CONTEXTS: &[&str] = &[REQUEST_FINGERPRINT, REQUEST_SIGNATURE];
}

/// Compute BLAKE3 hash of the input data.
pub fn hash(data: &[u8]) -> [u8; 32] {
    *::blake3::hash(data).as_bytes()
}

/// Derive a key using BLAKE3's built-in key derivation mode.
///
/// # Arguments
///
/// * `context` - A context string from [`contexts`] (or a filter hash context)
/// * `key_material` - The input key material
pub fn derive_key(context: &str, key_material: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut hasher = ::blake3::Hasher::new_derive_key(context);
    hasher.update(key_material);
    let hash = hasher.finalize();
    out.copy_from_slice(hash.as_bytes());
    out
}

/// Verify that a context string is registered.
pub fn is_registered_context(context: &str) -> bool {
    contexts::ALL_CONTEXTS.contains(&context)
        || context.starts_with(contexts::OUTPOINT_FILTER_PREFIX)
}

/// Encode multiple dynamic fields using length-prefixed encoding.
///
/// `LE32(len(field1)) || field1 || LE32(len(field2)) || field2 || ...`
pub fn encode_multi_field(fields: &[&[u8]]) -> Vec<u8> {
    let total_len: usize = fields.iter().map(|f| 4 + f.len()).sum();
    let mut output = Vec::with_capacity(total_len);
    for field in fields {
        output.extend_from_slice(&(field.len() as u32).to_le_bytes());
        output.extend_from_slice(field);
    }
    output
}

/// Fingerprint a request body under a method name.
pub fn request_fingerprint(method: &str, body: &[u8]) -> [u8; 32] {
    derive_key(
        contexts::REQUEST_FINGERPRINT,
        &encode_multi_field(&[method.as_bytes(), body]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_strings_prefixed() {
        for ctx in contexts::ALL_CONTEXTS {
            assert!(ctx.starts_with("chansign v1 "), "Context string '{ctx}' has wrong prefix");
        }
        assert!(contexts::OUTPOINT_FILTER_PREFIX.starts_with("chansign v1 "));
    }

    #[test]
    fn test_hash_deterministic() {
        assert_eq!(hash(b"chansign test vector 1"), hash(b"chansign test vector 1"));
        assert_ne!(hash(b"input1"), hash(b"input2"));
    }

    #[test]
    fn test_derive_key_different_contexts() {
        let key1 = derive_key(contexts::REQUEST_FINGERPRINT, &[0u8; 32]);
        let key2 = derive_key("chansign v1 outpoint-filter-hash-0", &[0u8; 32]);
        assert_ne!(key1, key2);
    }

    #[test]
    fn test_multi_field_encoding() {
        let encoded = encode_multi_field(&[b"hello", b"world"]);
        assert_eq!(encoded.len(), 4 + 5 + 4 + 5);
        assert_eq!(&encoded[0..4], &5u32.to_le_bytes());
        assert_eq!(&encoded[4..9], b"hello");
        assert_eq!(&encoded[9..13], &5u32.to_le_bytes());
        assert_eq!(&encoded[13..18], b"world");
    }

    #[test]
    fn test_request_fingerprint_binds_method() {
        let body = br#"{"lockTime":500000}"#;
        assert_eq!(request_fingerprint("sign", body), request_fingerprint("sign", body));
        assert_ne!(request_fingerprint("sign", body), request_fingerprint("refund", body));
    }

    #[test]
    fn test_is_registered_context() {
        assert!(is_registered_context("chansign v1 request-fingerprint"));
        assert!(is_registered_context("chansign v1 request-signature"));
        assert!(is_registered_context("chansign v1 outpoint-filter-hash-7"));
        assert!(!is_registered_context("chansign v1 made-up-context"));
    }
}
