//! SHA256 content hashing.
//!
//! The digest is the dedup key of the file store and the basis of each
//! blob's on-disk location.

use sha2::{Digest, Sha256};

use crate::error::{Result, TextcloudError};

/// Length of a SHA256 digest rendered as lowercase hex.
pub const DIGEST_HEX_LEN: usize = 64;

/// Compute the SHA256 digest of an in-memory buffer as lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Check that `value` looks like a digest produced by [`sha256_hex`].
pub fn is_sha256_hex(value: &str) -> bool {
    value.len() == DIGEST_HEX_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Validate a digest, returning it unchanged.
pub fn ensure_sha256_hex(value: &str) -> Result<&str> {
    if is_sha256_hex(value) {
        Ok(value)
    } else {
        Err(TextcloudError::invalid(
            "hash",
            format!("Not a SHA256 hex digest: {}", value),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_empty() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_sha256_deterministic() {
        let a = sha256_hex(b"hello hello\n\nworld");
        let b = sha256_hex(b"hello hello\n\nworld");
        assert_eq!(a, b);
        assert_eq!(a.len(), DIGEST_HEX_LEN);
        assert_ne!(a, sha256_hex(b"hello hello\n\nworld!"));
    }

    #[test]
    fn test_digest_validation() {
        assert!(is_sha256_hex(&sha256_hex(b"x")));
        assert!(!is_sha256_hex("abc"));
        assert!(!is_sha256_hex(&"A".repeat(DIGEST_HEX_LEN)));
        assert!(!is_sha256_hex(&format!("../{}", "a".repeat(61))));
        assert!(ensure_sha256_hex("zz").is_err());
    }
}
