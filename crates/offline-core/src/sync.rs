//! SyncCoordinator: drains the pending queues into a `RemoteSink`.
//!
//! Delivery is at-least-once. Queues are only drained after the sink accepts
//! them, so a crash between acceptance and the local write-back re-sends the
//! same items (with the same ids) on the next pass.

use crate::config::SyncPolicy;
use crate::document::PendingUploads;
use crate::events::OfflineEvent;
use crate::sink::RemoteSink;
use crate::store::{LocalStore, StorageError};
use serde::Serialize;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// One of the two pending queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Queue {
    Images,
    Analyses,
}

impl Display for Queue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Queue::Images => f.write_str("images"),
            Queue::Analyses => f.write_str("analyses"),
        }
    }
}

fn queue_list(queues: &[Queue]) -> String {
    queues
        .iter()
        .map(Queue::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The sink refused or could not be reached for `failed`. Queues listed
    /// in `drained` were still cleared (only under `SyncPolicy::PerQueue`).
    #[error("Sync rejected for {}: {reason}", queue_list(.failed))]
    Rejected {
        failed: Vec<Queue>,
        drained: Vec<Queue>,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// What a successful sync pass delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub images: usize,
    pub analyses: usize,
    /// New `lastSyncTimestamp`
    pub synced_at: u64,
}

pub struct SyncCoordinator {
    store: Arc<LocalStore>,
    sink: Arc<dyn RemoteSink>,
    policy: SyncPolicy,
}

impl SyncCoordinator {
    pub fn new(store: Arc<LocalStore>, sink: Arc<dyn RemoteSink>, policy: SyncPolicy) -> Self {
        Self {
            store,
            sink,
            policy,
        }
    }

    /// Run one sync pass.
    ///
    /// Both queues are submitted concurrently and both submissions are
    /// awaited. Only if both succeed are the delivered items removed and
    /// `lastSyncTimestamp` advanced. Callers must not overlap passes.
    pub async fn sync_offline_data(&self) -> Result<SyncReport> {
        let result = self.run_pass().await;
        let events = self.store.events();
        let timestamp = self.store.clock().now_millis();
        match &result {
            Ok(report) => events.emit(OfflineEvent::SyncCompleted {
                images: report.images,
                analyses: report.analyses,
                timestamp,
            }),
            Err(e) => events.emit(OfflineEvent::SyncFailed {
                reason: e.to_string(),
                timestamp,
            }),
        }
        result
    }

    async fn run_pass(&self) -> Result<SyncReport> {
        let doc = self.store.read().await?;
        let image_ids = doc.pending_uploads.image_ids();
        let analysis_ids = doc.pending_uploads.analysis_ids();
        let PendingUploads { images, analyses } = doc.pending_uploads;
        info!(
            "Starting sync pass: {} image(s), {} analysis(es)",
            images.len(),
            analyses.len()
        );

        let (image_result, analysis_result) = futures::join!(
            self.sink.submit_images(&images),
            self.sink.submit_analyses(&analyses)
        );

        let mut failed = Vec::new();
        let mut reasons = Vec::new();
        if let Err(e) = &image_result {
            warn!("Image submission failed: {}", e);
            failed.push(Queue::Images);
            reasons.push(format!("images: {e}"));
        }
        if let Err(e) = &analysis_result {
            warn!("Analysis submission failed: {}", e);
            failed.push(Queue::Analyses);
            reasons.push(format!("analyses: {e}"));
        }

        if failed.is_empty() {
            let synced_at = self.store.clock().now_millis();
            // Re-read so items queued while the sink calls were in flight survive.
            self.store
                .update(|doc| {
                    doc.pending_uploads.remove_images(&image_ids);
                    doc.pending_uploads.remove_analyses(&analysis_ids);
                    doc.last_sync_timestamp = synced_at;
                })
                .await?;
            info!(
                "Sync pass complete: delivered {} image(s), {} analysis(es)",
                images.len(),
                analyses.len()
            );
            return Ok(SyncReport {
                images: images.len(),
                analyses: analyses.len(),
                synced_at,
            });
        }

        let mut drained = Vec::new();
        if self.policy == SyncPolicy::PerQueue {
            if image_result.is_ok() {
                drained.push(Queue::Images);
            }
            if analysis_result.is_ok() {
                drained.push(Queue::Analyses);
            }
            if !drained.is_empty() {
                self.store
                    .update(|doc| {
                        if image_result.is_ok() {
                            doc.pending_uploads.remove_images(&image_ids);
                        }
                        if analysis_result.is_ok() {
                            doc.pending_uploads.remove_analyses(&analysis_ids);
                        }
                    })
                    .await?;
                info!("Drained {} after partial sync", queue_list(&drained));
            }
        }

        Err(SyncError::Rejected {
            failed,
            drained,
            reason: reasons.join("; "),
        })
    }
}
