//! Shared SHA-256 hex digest utility.
//!
//! Used by the idempotency guard for content fingerprints and by the
//! webhook signature check.

use sha2::{Digest, Sha256};

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hash a JSON value in its compact serialized form.
///
/// `serde_json::Value` objects keep their keys sorted, so two values with
/// the same content always produce the same digest.
pub fn json_fingerprint(value: &serde_json::Value) -> String {
    sha256_hex(value.to_string().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_produces_known_hash() {
        let hash = sha256_hex(b"");
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn consistent_output() {
        let data = b"hello world";
        assert_eq!(sha256_hex(data), sha256_hex(data));
        assert_eq!(sha256_hex(data).len(), 64);
    }

    #[test]
    fn json_fingerprint_ignores_key_insertion_order() {
        let a = serde_json::json!({"sku": "A-1", "qty": 3});
        let b = serde_json::json!({"qty": 3, "sku": "A-1"});
        assert_eq!(json_fingerprint(&a), json_fingerprint(&b));
    }

    #[test]
    fn json_fingerprint_changes_with_content() {
        let a = serde_json::json!({"sku": "A-1", "qty": 3});
        let b = serde_json::json!({"sku": "A-1", "qty": 4});
        assert_ne!(json_fingerprint(&a), json_fingerprint(&b));
    }
}
