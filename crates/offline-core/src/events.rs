//! Event infrastructure for offline-core.
//!
//! Every public operation publishes an `OfflineEvent` on success or failure.
//! Hosts subscribe to turn them into user-visible notifications.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

/// Outcome of an offline operation, suitable for a toast or log line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OfflineEvent {
    /// Analysis appended to history and queued for upload.
    AnalysisSaved {
        id: String,
        /// Species name of the analysis.
        name: String,
        timestamp: u64,
    },
    /// Image queued for upload.
    ImageQueued {
        id: String,
        /// Length of the base64 payload.
        bytes: usize,
        timestamp: u64,
    },
    /// Sync pass delivered everything that was pending.
    SyncCompleted {
        images: usize,
        analyses: usize,
        timestamp: u64,
    },
    /// Sync pass failed; queues kept for retry.
    SyncFailed { reason: String, timestamp: u64 },
    /// Document reset to its initial state on request.
    DataCleared { timestamp: u64 },
    /// Stored document could not be parsed and was replaced. Data was lost.
    CorruptDocumentReset {
        key: String,
        reason: String,
        timestamp: u64,
    },
    /// A queue or store operation failed.
    OperationFailed {
        operation: String,
        reason: String,
        timestamp: u64,
    },
}

impl OfflineEvent {
    /// Whether the event should be shown as an error.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            OfflineEvent::SyncFailed { .. }
                | OfflineEvent::CorruptDocumentReset { .. }
                | OfflineEvent::OperationFailed { .. }
        )
    }

    /// One-line human description.
    pub fn message(&self) -> String {
        match self {
            OfflineEvent::AnalysisSaved { name, .. } => {
                format!("Analysis of {name} saved for offline access")
            }
            OfflineEvent::ImageQueued { .. } => "Image saved for upload".to_string(),
            OfflineEvent::SyncCompleted {
                images, analyses, ..
            } => format!("Data synchronized ({images} image(s), {analyses} analysis(es))"),
            OfflineEvent::SyncFailed { reason, .. } => {
                format!("Failed to synchronize data: {reason}")
            }
            OfflineEvent::DataCleared { .. } => "Offline data cleared".to_string(),
            OfflineEvent::CorruptDocumentReset { reason, .. } => {
                format!("Offline data was unreadable and has been reset: {reason}")
            }
            OfflineEvent::OperationFailed {
                operation, reason, ..
            } => format!("Failed to {operation}: {reason}"),
        }
    }
}

/// Subscription handle that unsubscribes automatically when dropped.
///
/// Follows the disposer pattern: hold this value to keep receiving events,
/// drop it (or let it go out of scope) to unsubscribe.
pub struct Subscription {
    bus: Weak<EventBus>,
    id: usize,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

type Callback = Arc<dyn Fn(OfflineEvent) + Send + Sync>;

/// Event bus for publishing offline events to subscribers.
///
/// Wrap in `Arc` to enable subscriptions.
#[derive(Default)]
pub struct EventBus {
    callbacks: RwLock<Vec<(usize, Callback)>>,
    next_id: AtomicUsize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events. Returns `Subscription` that unsubscribes on drop.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(OfflineEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    fn unsubscribe(&self, id: usize) {
        // try_write: Drop may run during unwinding while emit holds a read lock
        if let Ok(mut guard) = self.callbacks.try_write() {
            guard.retain(|(i, _)| *i != id);
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: OfflineEvent) {
        // Clone the list so a callback may subscribe without deadlocking.
        let callbacks: Vec<_> = self
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            callback(event.clone());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

/// Subscribe a collector that records every event.
#[cfg(test)]
pub(crate) fn collect(bus: &Arc<EventBus>) -> (Subscription, Arc<std::sync::Mutex<Vec<OfflineEvent>>>) {
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let sub = bus.subscribe(move |event| {
        sink.lock().unwrap_or_else(|e| e.into_inner()).push(event);
    });
    (sub, seen)
}
