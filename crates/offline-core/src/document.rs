//! OfflineDocument: the single persisted aggregate.
//!
//! Layout on disk (camelCase JSON):
//! ```json
//! {
//!   "treeAnalyses": [ ... ],
//!   "pendingUploads": { "images": [ ... ], "analyses": [ ... ] },
//!   "lastSyncTimestamp": 1700000000000
//! }
//! ```

use crate::analysis::AnalysisResult;
use crate::pending_id::PendingId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Key the document is stored under unless configured otherwise.
pub const STORAGE_KEY: &str = "tree_detection_offline_data";

/// One queued unit of work not yet confirmed delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingItem<T> {
    pub id: PendingId,
    pub data: T,
    /// When the item was queued, ms since epoch
    pub timestamp: u64,
}

impl<T> PendingItem<T> {
    /// Wrap `data` with a fresh id.
    pub fn new(data: T, timestamp: u64) -> Self {
        Self {
            id: PendingId::generate(),
            data,
            timestamp,
        }
    }
}

/// Queued image; `data` is the base64-encoded payload.
pub type PendingImage = PendingItem<String>;

/// Queued analysis result.
pub type PendingAnalysis = PendingItem<AnalysisResult>;

/// Both pending queues.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PendingUploads {
    pub images: Vec<PendingImage>,
    pub analyses: Vec<PendingAnalysis>,
}

impl PendingUploads {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.analyses.is_empty()
    }

    pub fn counts(&self) -> PendingCounts {
        PendingCounts {
            images: self.images.len(),
            analyses: self.analyses.len(),
        }
    }

    /// Ids of the queued images.
    pub fn image_ids(&self) -> HashSet<PendingId> {
        self.images.iter().map(|item| item.id.clone()).collect()
    }

    pub fn analysis_ids(&self) -> HashSet<PendingId> {
        self.analyses.iter().map(|item| item.id.clone()).collect()
    }

    /// Drop images whose id is in `delivered`.
    pub fn remove_images(&mut self, delivered: &HashSet<PendingId>) {
        self.images.retain(|item| !delivered.contains(&item.id));
    }

    /// Drop analyses whose id is in `delivered`.
    pub fn remove_analyses(&mut self, delivered: &HashSet<PendingId>) {
        self.analyses.retain(|item| !delivered.contains(&item.id));
    }
}

/// Number of items in each pending queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PendingCounts {
    pub images: usize,
    pub analyses: usize,
}

impl PendingCounts {
    pub fn total(&self) -> usize {
        self.images + self.analyses
    }
}

/// Analysis history plus pending uploads, persisted as one JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineDocument {
    /// Append-only local history, oldest first
    pub tree_analyses: Vec<AnalysisResult>,
    pub pending_uploads: PendingUploads,
    /// Set only when a sync pass fully succeeds
    pub last_sync_timestamp: u64,
}

impl OfflineDocument {
    /// The document a fresh (or cleared) store starts from.
    pub fn initial(now_millis: u64) -> Self {
        Self {
            tree_analyses: Vec::new(),
            pending_uploads: PendingUploads::default(),
            last_sync_timestamp: now_millis,
        }
    }
}
