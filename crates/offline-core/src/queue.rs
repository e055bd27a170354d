//! OfflineQueue: the mutation and query surface used by the rest of the app.
//!
//! Every operation is a read-modify-write against the `LocalStore`; nothing is
//! cached between calls, so a write from elsewhere (another process on the
//! same data directory) is seen by the next call. Failures are returned and
//! also published as `OfflineEvent::OperationFailed`.

use crate::analysis::AnalysisResult;
use crate::document::{PendingCounts, PendingItem, PendingUploads};
use crate::events::OfflineEvent;
use crate::pending_id::PendingId;
use crate::store::{LocalStore, StorageError};
use std::sync::Arc;
use tracing::{debug, error, info};

pub type Result<T> = std::result::Result<T, StorageError>;

pub struct OfflineQueue {
    store: Arc<LocalStore>,
}

impl OfflineQueue {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Create the stored document if it does not exist yet.
    pub async fn initialize(&self) -> Result<()> {
        let result = self.store.initialize().await.map(|_| ());
        self.report("initialize offline storage", result)
    }

    /// Append `analysis` to the history and queue it for upload.
    pub async fn save_tree_analysis(&self, analysis: AnalysisResult) -> Result<PendingId> {
        let now = self.store.clock().now_millis();
        let name = analysis.name.clone();
        let result = self
            .store
            .update(move |doc| {
                let item = PendingItem::new(analysis.clone(), now);
                let id = item.id.clone();
                doc.tree_analyses.push(analysis);
                doc.pending_uploads.analyses.push(item);
                id
            })
            .await;

        let id = self.report("save analysis offline", result)?;
        info!("Saved analysis {} ({}) for offline access", id, name);
        self.store.events().emit(OfflineEvent::AnalysisSaved {
            id: id.to_string(),
            name,
            timestamp: now,
        });
        Ok(id)
    }

    /// Queue a base64-encoded image for upload.
    pub async fn save_image_for_upload(&self, image_data: String) -> Result<PendingId> {
        let now = self.store.clock().now_millis();
        let bytes = image_data.len();
        let result = self
            .store
            .update(move |doc| {
                let item = PendingItem::new(image_data, now);
                let id = item.id.clone();
                doc.pending_uploads.images.push(item);
                id
            })
            .await;

        let id = self.report("save image offline", result)?;
        debug!("Queued image {} ({} bytes) for upload", id, bytes);
        self.store.events().emit(OfflineEvent::ImageQueued {
            id: id.to_string(),
            bytes,
            timestamp: now,
        });
        Ok(id)
    }

    /// Analysis history, oldest first.
    pub async fn get_offline_analyses(&self) -> Result<Vec<AnalysisResult>> {
        let result = self.store.read().await.map(|doc| doc.tree_analyses);
        self.report("retrieve offline analyses", result)
    }

    /// Both pending queues.
    pub async fn get_pending_uploads(&self) -> Result<PendingUploads> {
        let result = self.store.read().await.map(|doc| doc.pending_uploads);
        self.report("retrieve pending uploads", result)
    }

    pub async fn pending_counts(&self) -> Result<PendingCounts> {
        Ok(self.get_pending_uploads().await?.counts())
    }

    /// Reset everything to the initial document. Irreversible.
    pub async fn clear_offline_data(&self) -> Result<()> {
        let result = self.store.reset().await;
        let fresh = self.report("clear offline data", result)?;
        info!("Cleared offline data under {}", self.store.key());
        self.store.events().emit(OfflineEvent::DataCleared {
            timestamp: fresh.last_sync_timestamp,
        });
        Ok(())
    }

    pub async fn get_last_sync_timestamp(&self) -> Result<u64> {
        let result = self.store.read().await.map(|doc| doc.last_sync_timestamp);
        self.report("retrieve last sync timestamp", result)
    }

    /// Log and publish a failure, then hand the result back unchanged.
    fn report<T>(&self, operation: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            error!("Failed to {}: {}", operation, e);
            self.store.events().emit(OfflineEvent::OperationFailed {
                operation: operation.to_string(),
                reason: e.to_string(),
                timestamp: self.store.clock().now_millis(),
            });
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::clock::ManualClock;
    use crate::config::{OfflineConfig, SyncPolicy};
    use crate::events::{self, EventBus};
    use crate::sink::MockSink;
    use crate::sync::SyncCoordinator;
    use std::collections::HashSet;

    fn analysis(name: &str) -> AnalysisResult {
        AnalysisResult {
            name: name.into(),
            scientific_name: format!("{name} sp."),
            confidence: 0.9,
            ..Default::default()
        }
    }

    fn queue_with(backend: Arc<InMemoryBackend>) -> OfflineQueue {
        let store = LocalStore::with_config(
            &OfflineConfig::default(),
            backend,
            Arc::new(ManualClock::ticking(1_000, 1)),
            Arc::new(EventBus::new()),
        );
        OfflineQueue::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_history_keeps_insertion_order() {
        let queue = queue_with(Arc::new(InMemoryBackend::new()));
        let a1 = analysis("Willow");
        let a2 = analysis("Cedar");

        queue.save_tree_analysis(a1.clone()).await.unwrap();
        queue.save_tree_analysis(a2.clone()).await.unwrap();

        assert_eq!(queue.get_offline_analyses().await.unwrap(), vec![a1, a2]);
    }

    #[tokio::test]
    async fn test_save_analysis_queues_upload() {
        let queue = queue_with(Arc::new(InMemoryBackend::new()));
        let a = analysis("Larch");

        let id = queue.save_tree_analysis(a.clone()).await.unwrap();

        let pending = queue.get_pending_uploads().await.unwrap();
        assert_eq!(pending.analyses.len(), 1);
        assert_eq!(pending.analyses[0].id, id);
        assert_eq!(pending.analyses[0].data, a);
        assert!(pending.images.is_empty());
    }

    #[tokio::test]
    async fn test_image_queue_grows_with_unique_ids() {
        let queue = queue_with(Arc::new(InMemoryBackend::new()));
        for i in 0..5 {
            queue
                .save_image_for_upload(format!("aW1hZ2U{i}"))
                .await
                .unwrap();
        }

        let images = queue.get_pending_uploads().await.unwrap().images;
        assert_eq!(images.len(), 5);
        let ids: HashSet<_> = images.iter().map(|i| i.id.clone()).collect();
        assert_eq!(ids.len(), 5);
        // Queue order is save order
        assert_eq!(images[0].data, "aW1hZ2U0");
        assert_eq!(images[4].data, "aW1hZ2U4");
    }

    #[tokio::test]
    async fn test_clear_resets_everything() {
        let backend = Arc::new(InMemoryBackend::new());
        let queue = queue_with(Arc::clone(&backend));
        queue.save_tree_analysis(analysis("Yew")).await.unwrap();
        queue.save_image_for_upload("aW1n".into()).await.unwrap();

        let sink = Arc::new(MockSink::new());
        SyncCoordinator::new(Arc::clone(queue.store()), sink, SyncPolicy::AllOrNothing)
            .sync_offline_data()
            .await
            .unwrap();
        queue.save_image_for_upload("bW9yZQ==".into()).await.unwrap();

        queue.clear_offline_data().await.unwrap();

        assert!(queue.get_offline_analyses().await.unwrap().is_empty());
        assert_eq!(
            queue.get_pending_uploads().await.unwrap(),
            PendingUploads::default()
        );
    }

    #[tokio::test]
    async fn test_last_sync_timestamp_starts_at_creation() {
        let queue = queue_with(Arc::new(InMemoryBackend::new()));
        assert_eq!(queue.get_last_sync_timestamp().await.unwrap(), 1_000);
    }

    #[tokio::test]
    async fn test_write_failure_propagates_and_publishes() {
        let backend = Arc::new(InMemoryBackend::new());
        let queue = queue_with(Arc::clone(&backend));
        queue.initialize().await.unwrap();
        let (_sub, seen) = events::collect(queue.store().events());

        backend.set_fail_writes(true);
        let err = queue
            .save_image_for_upload("aW1n".into())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));

        backend.set_fail_writes(false);
        assert!(queue.get_pending_uploads().await.unwrap().images.is_empty());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(matches!(
            &seen[0],
            OfflineEvent::OperationFailed { operation, .. } if operation == "save image offline"
        ));
    }

    #[tokio::test]
    async fn test_success_events() {
        let queue = queue_with(Arc::new(InMemoryBackend::new()));
        let (_sub, seen) = events::collect(queue.store().events());

        let id = queue.save_tree_analysis(analysis("Hemlock")).await.unwrap();
        queue.save_image_for_upload("aW1n".into()).await.unwrap();
        queue.clear_offline_data().await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(matches!(
            &seen[0],
            OfflineEvent::AnalysisSaved { id: saved, name, .. }
                if *saved == id.to_string() && name == "Hemlock"
        ));
        assert!(matches!(seen[1], OfflineEvent::ImageQueued { bytes: 4, .. }));
        assert!(matches!(seen[2], OfflineEvent::DataCleared { .. }));
    }

    #[tokio::test]
    async fn test_pending_counts() {
        let queue = queue_with(Arc::new(InMemoryBackend::new()));
        queue.save_tree_analysis(analysis("Alder")).await.unwrap();
        queue.save_image_for_upload("aW1n".into()).await.unwrap();
        queue.save_image_for_upload("aW1n".into()).await.unwrap();

        let counts = queue.pending_counts().await.unwrap();
        assert_eq!((counts.images, counts.analyses), (2, 1));
    }
}
