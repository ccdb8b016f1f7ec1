//! Content-addressed cache keys.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// SHA-256 digest (lowercase hex) identifying a source's content.
///
/// Identical bytes always produce the same fingerprint, whatever the
/// locator, so cache entries are shared across URLs and across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint raw content bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    /// Fingerprint a locator plus a cheap server-side validator
    /// (`ETag` or `Last-Modified`).
    ///
    /// The domain prefix keeps these keys disjoint from content keys.
    pub fn for_locator(locator: &str, validator: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"locator\n");
        hasher.update(locator.as_bytes());
        hasher.update(b"\n");
        hasher.update(validator.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Parse a stored fingerprint.
    pub fn from_hex(value: &str) -> Option<Self> {
        let valid = value.len() == 64
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_digest() {
        let fp = Fingerprint::from_bytes(b"");
        assert_eq!(
            fp.as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(fp.short(), "e3b0c44298fc");
    }

    #[test]
    fn test_locator_keys_differ_from_content_keys() {
        let content = Fingerprint::from_bytes(b"https://example.com\n\"abc\"");
        let locator = Fingerprint::for_locator("https://example.com", "\"abc\"");
        assert_ne!(content, locator);
    }

    #[test]
    fn test_from_hex_rejects_garbage() {
        assert!(Fingerprint::from_hex("not-a-digest").is_none());
        assert!(Fingerprint::from_hex(&"A".repeat(64)).is_none());
        let fp = Fingerprint::from_bytes(b"x");
        assert_eq!(Fingerprint::from_hex(fp.as_str()), Some(fp));
    }

    proptest! {
        #[test]
        fn identical_bytes_share_a_fingerprint(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            prop_assert_eq!(Fingerprint::from_bytes(&bytes), Fingerprint::from_bytes(&bytes.clone()));
        }

        #[test]
        fn different_bytes_get_different_fingerprints(
            a in proptest::collection::vec(any::<u8>(), 0..256),
            b in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            prop_assume!(a != b);
            prop_assert_ne!(Fingerprint::from_bytes(&a), Fingerprint::from_bytes(&b));
        }
    }
}
