//! PendingId: Identifier for a queued upload.
//!
//! Opaque string on the wire. New ids are random UUIDs in simple (32 hex
//! chars) form; any string read back from storage is accepted as-is, so
//! documents written by older clients keep their ids.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Identifier for one entry in a pending upload queue.
///
/// Uniqueness relies on generation-time randomness only.
///
/// # Examples
/// ```
/// use offline_core::PendingId;
///
/// let id = PendingId::generate();
/// assert_eq!(id.as_str().len(), 32);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingId(String);

impl PendingId {
    /// Generate a new random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PendingId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PendingId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for PendingId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_unique() {
        let ids: HashSet<PendingId> = (0..1000).map(|_| PendingId::generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_generate_is_hex() {
        let id = PendingId::generate();
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_serialize_as_plain_string() {
        let id = PendingId::from("k3j9x0a2b");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"k3j9x0a2b\"");
    }

    #[test]
    fn test_legacy_short_id_roundtrip() {
        // Ids written by older clients are short base36 strings
        let id: PendingId = serde_json::from_str("\"4fzyo82mv\"").unwrap();
        assert_eq!(id.to_string(), "4fzyo82mv");
    }
}
