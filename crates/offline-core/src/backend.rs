//! KeyValueBackend trait abstraction for the persistence layer.
//!
//! Implementations:
//! - `InMemoryBackend` - For testing (with write counting and fault injection)
//! - `FileBackend` (in offline-daemon) - One JSON file per key under a data directory

use crate::quota::{QuotaError, QuotaInspector, StorageEstimate};
use crate::revision::Revision;
use crate::store::StorageError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub type Result<T> = std::result::Result<T, StorageError>;

/// Synchronous-looking string store keyed by name, like browser local storage.
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    /// Read the value under `key`, `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value under `key`.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Write `value` only if the stored value still has revision `expected`.
    ///
    /// `expected = None` means the key must be absent. Returns `false` when
    /// the stored value has moved on and nothing was written.
    ///
    /// The default implementation is a plain get-then-set and is only as
    /// atomic as the caller's scheduling; backends that can do better should.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&Revision>,
        value: &str,
    ) -> Result<bool> {
        let current = self.get(key).await?;
        if !revision_matches(current.as_deref(), expected) {
            return Ok(false);
        }
        self.set(key, value).await?;
        Ok(true)
    }
}

/// Whether `current` is what the writer saw when it took `expected`.
pub fn revision_matches(current: Option<&str>, expected: Option<&Revision>) -> bool {
    match (current, expected) {
        (None, None) => true,
        (Some(content), Some(rev)) => rev.matches(content),
        _ => false,
    }
}

/// In-memory backend for testing
#[derive(Default)]
pub struct InMemoryBackend {
    values: RwLock<HashMap<String, String>>,
    /// Successful writes (set + compare_and_set that landed)
    writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    /// Total bytes allowed across all values
    quota: Option<usize>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that rejects writes pushing total size past `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            quota: Some(bytes),
            ..Self::default()
        }
    }

    /// Number of writes that landed so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every read fail with `StorageError::Unavailable`.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every write fail with `StorageError::Unavailable`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Raw stored text, bypassing fault injection.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Store raw text directly (e.g. to plant a corrupt document).
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
    }

    fn used_bytes(values: &HashMap<String, String>) -> usize {
        values.iter().map(|(k, v)| k.len() + v.len()).sum()
    }

    fn check_write(&self, values: &HashMap<String, String>, key: &str, value: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "in-memory backend is failing writes".into(),
            ));
        }
        if let Some(limit) = self.quota {
            let replaced = values.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
            let after = Self::used_bytes(values) - replaced + key.len() + value.len();
            if after > limit {
                return Err(StorageError::QuotaExceeded(format!(
                    "{after} bytes needed, {limit} allowed"
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "in-memory backend is failing reads".into(),
            ));
        }
        Ok(self.raw(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        self.check_write(&values, key, value)?;
        values.insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    // Check and write under one lock.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&Revision>,
        value: &str,
    ) -> Result<bool> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        if !revision_matches(values.get(key).map(String::as_str), expected) {
            return Ok(false);
        }
        self.check_write(&values, key, value)?;
        values.insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

#[async_trait]
impl QuotaInspector for InMemoryBackend {
    async fn estimate(&self) -> std::result::Result<StorageEstimate, QuotaError> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        Ok(StorageEstimate {
            used: Self::used_bytes(&values) as u64,
            available: self.quota.unwrap_or(0) as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_set() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.get("k").await.unwrap(), None);

        backend.set("k", "v1").await.unwrap();
        backend.set("k", "v2").await.unwrap();
        assert_eq!(backend.get("k").await.unwrap().as_deref(), Some("v2"));
        assert_eq!(backend.write_count(), 2);
        assert_eq!(backend.get("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_compare_and_set_absent() {
        let backend = InMemoryBackend::new();
        assert!(backend.compare_and_set("k", None, "first").await.unwrap());
        // Key now exists, so "must be absent" fails
        assert!(!backend.compare_and_set("k", None, "second").await.unwrap());
        assert_eq!(backend.raw("k").as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_compare_and_set_revision() {
        let backend = InMemoryBackend::new();
        backend.set("k", "v1").await.unwrap();
        let seen = Revision::of("v1");

        backend.set("k", "v2").await.unwrap();
        assert!(!backend.compare_and_set("k", Some(&seen), "v3").await.unwrap());
        assert_eq!(backend.raw("k").as_deref(), Some("v2"));

        let current = Revision::of("v2");
        assert!(backend.compare_and_set("k", Some(&current), "v3").await.unwrap());
        assert_eq!(backend.raw("k").as_deref(), Some("v3"));
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let backend = InMemoryBackend::new();
        backend.set_fail_writes(true);
        let err = backend.set("k", "v").await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
        assert_eq!(backend.write_count(), 0);
    }

    #[tokio::test]
    async fn test_quota_exceeded() {
        let backend = InMemoryBackend::with_quota(10);
        backend.set("k", "12345").await.unwrap();
        // Replacing counts the new size, not old + new
        backend.set("k", "1234567").await.unwrap();

        let err = backend.set("k", "12345678901").await.unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded(_)));
        assert_eq!(backend.raw("k").as_deref(), Some("1234567"));
    }

    #[tokio::test]
    async fn test_estimate_reports_usage() {
        let backend = InMemoryBackend::with_quota(100);
        backend.set("key", "value").await.unwrap();
        let estimate = backend.estimate().await.unwrap();
        assert_eq!(estimate.used, 8);
        assert_eq!(estimate.available, 100);
    }
}
