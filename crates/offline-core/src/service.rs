//! OfflineService: wires store, queue, sync coordinator and quota inspector
//! together from one `OfflineConfig`.

use crate::backend::KeyValueBackend;
use crate::clock::Clock;
use crate::config::OfflineConfig;
use crate::events::EventBus;
use crate::queue::OfflineQueue;
use crate::quota::{self, QuotaError, QuotaInspector, StorageEstimate};
use crate::sink::RemoteSink;
use crate::store::LocalStore;
use crate::sync::SyncCoordinator;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Upper bound on a storage estimate before it is reported as timed out.
pub const QUOTA_TIMEOUT: Duration = Duration::from_secs(5);

pub struct OfflineService {
    queue: OfflineQueue,
    sync: SyncCoordinator,
    quota: Arc<dyn QuotaInspector>,
    events: Arc<EventBus>,
}

impl OfflineService {
    pub fn new(
        config: &OfflineConfig,
        backend: Arc<dyn KeyValueBackend>,
        sink: Arc<dyn RemoteSink>,
        quota: Arc<dyn QuotaInspector>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let events = Arc::new(EventBus::new());
        let store = Arc::new(LocalStore::with_config(
            config,
            backend,
            clock,
            Arc::clone(&events),
        ));
        Self {
            queue: OfflineQueue::new(Arc::clone(&store)),
            sync: SyncCoordinator::new(store, sink, config.sync_policy),
            quota,
            events,
        }
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    pub fn sync(&self) -> &SyncCoordinator {
        &self.sync
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Storage usage, surfacing any failure.
    pub async fn check_storage_quota(&self) -> Result<StorageEstimate, QuotaError> {
        quota::estimate_within(self.quota.as_ref(), QUOTA_TIMEOUT).await
    }

    /// Storage usage for display; failures are logged and reported as `{0, 0}`.
    pub async fn storage_quota_or_zero(&self) -> StorageEstimate {
        match self.check_storage_quota().await {
            Ok(estimate) => estimate,
            Err(e) => {
                warn!("Storage quota check failed: {}", e);
                StorageEstimate::default()
            }
        }
    }
}
