//! Behavior switches for the offline store and sync coordinator.

use crate::document::STORAGE_KEY;
use serde::{Deserialize, Serialize};

/// How the store writes a modified document back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Overwrite whatever is stored. Concurrent read-modify-write cycles can
    /// lose the earlier update.
    #[default]
    LastWriterWins,
    /// Fail with `StorageError::Conflict` if the stored document changed
    /// since it was read.
    CompareAndSwap,
}

/// What `read` does with a stored document that does not parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptPolicy {
    /// Return `StorageError::Corrupt` and leave the stored text alone.
    #[default]
    Fail,
    /// Replace it with the initial document and report the data loss.
    Reset,
}

/// When a sync pass drains the pending queues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPolicy {
    /// Drain both queues only if both submissions succeeded.
    #[default]
    AllOrNothing,
    /// Drain each queue whose submission succeeded.
    PerQueue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineConfig {
    /// Key the document is stored under
    #[serde(default = "default_storage_key")]
    pub storage_key: String,

    #[serde(default)]
    pub write_mode: WriteMode,

    #[serde(default)]
    pub corrupt_policy: CorruptPolicy,

    #[serde(default)]
    pub sync_policy: SyncPolicy,
}

fn default_storage_key() -> String {
    STORAGE_KEY.to_string()
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            storage_key: default_storage_key(),
            write_mode: WriteMode::default(),
            corrupt_policy: CorruptPolicy::default(),
            sync_policy: SyncPolicy::default(),
        }
    }
}
