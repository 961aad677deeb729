//! SHA-256 digests of prompt text.

use sha2::{Digest, Sha256};

/// SHA-256 hex digest of `text`, exactly as given (no normalization).
pub fn prompt_digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// First 12 hex chars of a digest.
pub fn short_digest(digest: &str) -> &str {
    &digest[..12.min(digest.len())]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_digest_golden_value() {
        assert_eq!(
            prompt_digest(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_whitespace_changes_digest() {
        assert_ne!(prompt_digest("Answer."), prompt_digest("Answer. "));
    }

    #[test]
    fn test_short_digest() {
        let d = prompt_digest("Answer with just the number.");
        assert_eq!(short_digest(&d).len(), 12);
        assert!(d.starts_with(short_digest(&d)));
        assert_eq!(short_digest("abc"), "abc");
    }
}
