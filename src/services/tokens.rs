//! Bearer-token helpers shared by API keys and sessions.
//!
//! Raw tokens are handed to the caller once; only their SHA-256 digest is
//! persisted and used for indexed lookups.

use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::constants::tokens::TOKEN_BYTES;

/// Generate a random token (256 bits, unpadded URL-safe base64).
#[must_use]
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; TOKEN_BYTES] = rng.random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Hex SHA-256 of a token, as stored in the database.
#[must_use]
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Compare two digests without short-circuiting on the first differing byte.
#[must_use]
pub fn digests_match(stored: &str, presented: &str) -> bool {
    stored.as_bytes().ct_eq(presented.as_bytes()).into()
}

/// Cheap shape check so obviously malformed tokens never reach the database.
#[must_use]
pub fn looks_like_token(token: &str) -> bool {
    token.len() == crate::constants::tokens::ENCODED_TOKEN_LEN
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_are_unique_and_well_formed() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert!(looks_like_token(&a));
        assert!(looks_like_token(&b));
    }

    #[test]
    fn test_hash_token_is_stable_hex() {
        let digest = hash_token("abc");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(hash_token("abc"), digest);
        assert_ne!(hash_token("abd"), digest);
    }

    #[test]
    fn test_digests_match() {
        let digest = hash_token("token");
        assert!(digests_match(&digest, &hash_token("token")));
        assert!(!digests_match(&digest, &hash_token("other")));
        assert!(!digests_match(&digest, "short"));
    }

    #[test]
    fn test_looks_like_token_rejects_garbage() {
        assert!(!looks_like_token(""));
        assert!(!looks_like_token("not a token"));
        assert!(!looks_like_token(&"a".repeat(44)));
        assert!(!looks_like_token(&format!("{}=", "a".repeat(42))));
    }
}
