//! Content-derived keys for immutable JSON payloads.
//!
//! The key is the SHA-256 digest of the canonical serialization, truncated to
//! [`KEY_BYTES`] bytes and encoded as unpadded base64url. Equal values always
//! produce equal keys.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::canonical::to_canonical_string;

/// Number of digest bytes kept in a key (20 base64 characters).
pub const KEY_BYTES: usize = 15;

/// Derive the content key of `value`.
pub fn content_key(value: &Value) -> String {
    content_key_of_canonical(&to_canonical_string(value))
}

/// Derive a content key from text already in canonical form.
pub fn content_key_of_canonical(canonical: &str) -> String {
    let digest = Sha256::digest(canonical.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..KEY_BYTES])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn key_has_fixed_length() {
        assert_eq!(content_key(&json!(null)).len(), 20);
        assert_eq!(content_key(&json!({"deep": [1, 2, {"x": "y"}]})).len(), 20);
    }

    #[test]
    fn key_is_order_independent() {
        let a = json!({"a": 1, "b": [true, null]});
        let b: Value = serde_json::from_str(r#"{"b":[true,null],"a":1}"#).unwrap();
        assert_eq!(content_key(&a), content_key(&b));
    }

    #[test]
    fn distinct_values_distinct_keys() {
        assert_ne!(content_key(&json!(1)), content_key(&json!("1")));
        assert_ne!(content_key(&json!([1, 2])), content_key(&json!([2, 1])));
        assert_ne!(content_key(&json!({})), content_key(&json!([])));
    }

    proptest! {
        #[test]
        fn equal_strings_share_key(s in ".{0,40}") {
            let a = Value::String(s.clone());
            let b = Value::String(s);
            prop_assert_eq!(content_key(&a), content_key(&b));
        }
    }
}
