//! Content hash of a stored document, used for compare-and-swap writes.
//!
//! A writer keeps the revision it read and hands it back when writing; the
//! write only lands if the stored text still hashes to the same value.

use sha2::{Digest, Sha256};
use std::fmt::{self, Display, Formatter};

/// SHA-256 of the serialized document, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision(String);

impl Revision {
    /// Compute the revision of stored text.
    pub fn of(content: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `content` is the text this revision was taken from.
    pub fn matches(&self, content: &str) -> bool {
        *self == Self::of(content)
    }
}

impl Display for Revision {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // Short form is enough for logs
        f.write_str(&self.0[..12.min(self.0.len())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_deterministic() {
        assert_eq!(Revision::of("{}"), Revision::of("{}"));
    }

    #[test]
    fn test_different_content_different_revision() {
        assert_ne!(Revision::of("{\"a\":1}"), Revision::of("{\"a\":2}"));
    }

    #[test]
    fn test_matches() {
        let rev = Revision::of("stored");
        assert!(rev.matches("stored"));
        assert!(!rev.matches("changed"));
    }

    #[test]
    fn test_hex_length_and_short_display() {
        let rev = Revision::of("test");
        assert_eq!(rev.as_str().len(), 64);
        assert_eq!(rev.to_string().len(), 12);
    }
}
