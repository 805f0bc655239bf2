//! Content hashing for cache addressing.

use sha2::{Digest, Sha256};

/// Hex characters kept from the full SHA-256 digest.
const HASH_HEX_LEN: usize = 16;

/// Deterministic short hash of a block's text.
///
/// The first 16 hex characters of the SHA-256 digest. Identical text always
/// yields the same key, which is what makes cache population idempotent and
/// archive writes safely repeatable.
#[must_use]
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(HASH_HEX_LEN);
    hex
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(content_hash("same text"), content_hash("same text"));
    }

    #[test]
    fn hash_differs_for_different_text() {
        assert_ne!(content_hash("one"), content_hash("two"));
    }

    #[test]
    fn hash_is_short_lowercase_hex() {
        let hash = content_hash("anything");
        assert_eq!(hash.len(), HASH_HEX_LEN);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn known_vector() {
        // sha256("") = e3b0c44298fc1c14...
        assert_eq!(content_hash(""), "e3b0c44298fc1c14");
    }
}
