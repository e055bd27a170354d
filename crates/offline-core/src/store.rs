//! LocalStore: the durable home of the offline document.
//!
//! Reads and writes one JSON document under a fixed key of a
//! `KeyValueBackend`. A missing document is created on first read; it is
//! never an error.

use crate::backend::KeyValueBackend;
use crate::clock::Clock;
use crate::config::{CorruptPolicy, OfflineConfig, WriteMode};
use crate::document::{OfflineDocument, STORAGE_KEY};
use crate::events::{EventBus, OfflineEvent};
use crate::revision::Revision;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Stored document under '{key}' is corrupt: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Document under '{key}' changed since it was read")]
    Conflict { key: String },
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Durable store for the single `OfflineDocument`.
pub struct LocalStore {
    backend: Arc<dyn KeyValueBackend>,
    key: String,
    write_mode: WriteMode,
    corrupt_policy: CorruptPolicy,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
}

impl LocalStore {
    /// Store under the default key with default policies.
    pub fn new(
        backend: Arc<dyn KeyValueBackend>,
        clock: Arc<dyn Clock>,
        events: Arc<EventBus>,
    ) -> Self {
        Self::with_config(&OfflineConfig::default(), backend, clock, events)
    }

    pub fn with_config(
        config: &OfflineConfig,
        backend: Arc<dyn KeyValueBackend>,
        clock: Arc<dyn Clock>,
        events: Arc<EventBus>,
    ) -> Self {
        let key = if config.storage_key.is_empty() {
            STORAGE_KEY.to_string()
        } else {
            config.storage_key.clone()
        };
        Self {
            backend,
            key,
            write_mode: config.write_mode,
            corrupt_policy: config.corrupt_policy,
            clock,
            events,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Create the initial document if none is stored.
    ///
    /// Returns `true` if a document was created. An existing document, even
    /// a corrupt one, is left untouched.
    pub async fn initialize(&self) -> Result<bool> {
        if self.backend.get(&self.key).await?.is_some() {
            return Ok(false);
        }
        let raw = serde_json::to_string(&OfflineDocument::initial(self.clock.now_millis()))?;
        let created = self.backend.compare_and_set(&self.key, None, &raw).await?;
        if created {
            debug!("Initialized offline document under {}", self.key);
        }
        Ok(created)
    }

    /// Current document, creating the initial one if absent.
    pub async fn read(&self) -> Result<OfflineDocument> {
        Ok(self.read_versioned().await?.0)
    }

    /// Current document plus the revision it was read at.
    pub async fn read_versioned(&self) -> Result<(OfflineDocument, Revision)> {
        loop {
            if let Some(raw) = self.backend.get(&self.key).await? {
                return match serde_json::from_str::<OfflineDocument>(&raw) {
                    Ok(doc) => Ok((doc, Revision::of(&raw))),
                    Err(e) => self.recover_corrupt(&raw, e).await,
                };
            }

            let initial = OfflineDocument::initial(self.clock.now_millis());
            let raw = serde_json::to_string(&initial)?;
            if self.backend.compare_and_set(&self.key, None, &raw).await? {
                debug!("Created offline document under {}", self.key);
                return Ok((initial, Revision::of(&raw)));
            }
            // Someone else created it between our get and write; read theirs.
        }
    }

    /// Replace the stored document unconditionally.
    pub async fn write(&self, doc: &OfflineDocument) -> Result<Revision> {
        let raw = serde_json::to_string(doc)?;
        self.backend.set(&self.key, &raw).await?;
        Ok(Revision::of(&raw))
    }

    /// Replace the stored document only if it is still at `expected`.
    pub async fn write_if(&self, doc: &OfflineDocument, expected: &Revision) -> Result<Revision> {
        let raw = serde_json::to_string(doc)?;
        if self
            .backend
            .compare_and_set(&self.key, Some(expected), &raw)
            .await?
        {
            Ok(Revision::of(&raw))
        } else {
            warn!(
                "Offline document under {} changed since revision {}; write rejected",
                self.key, expected
            );
            Err(StorageError::Conflict {
                key: self.key.clone(),
            })
        }
    }

    /// Write back a document read at `seen`, honoring the write mode.
    pub async fn commit(&self, doc: &OfflineDocument, seen: &Revision) -> Result<Revision> {
        match self.write_mode {
            WriteMode::LastWriterWins => self.write(doc).await,
            WriteMode::CompareAndSwap => self.write_if(doc, seen).await,
        }
    }

    /// Read, apply `f`, write back.
    pub async fn update<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut OfflineDocument) -> R + Send,
        R: Send,
    {
        let (mut doc, seen) = self.read_versioned().await?;
        let out = f(&mut doc);
        self.commit(&doc, &seen).await?;
        Ok(out)
    }

    /// Overwrite whatever is stored with the initial document.
    pub async fn reset(&self) -> Result<OfflineDocument> {
        let initial = OfflineDocument::initial(self.clock.now_millis());
        self.write(&initial).await?;
        Ok(initial)
    }

    async fn recover_corrupt(
        &self,
        raw: &str,
        err: serde_json::Error,
    ) -> Result<(OfflineDocument, Revision)> {
        let reason = err.to_string();
        match self.corrupt_policy {
            CorruptPolicy::Fail => {
                error!("Offline document under {} is corrupt: {}", self.key, reason);
                Err(StorageError::Corrupt {
                    key: self.key.clone(),
                    reason,
                })
            }
            CorruptPolicy::Reset => {
                warn!(
                    "Offline document under {} is corrupt ({}); discarding {} bytes and resetting",
                    self.key,
                    reason,
                    raw.len()
                );
                let initial = OfflineDocument::initial(self.clock.now_millis());
                let revision = self.write(&initial).await?;
                self.events.emit(OfflineEvent::CorruptDocumentReset {
                    key: self.key.clone(),
                    reason,
                    timestamp: initial.last_sync_timestamp,
                });
                Ok((initial, revision))
            }
        }
    }
}
