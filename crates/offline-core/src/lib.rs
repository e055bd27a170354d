//! offline-core: Offline persistence and sync for tree identification results.
//!
//! This crate provides the core functionality for:
//! - Persisting a single JSON document (analysis history + pending uploads)
//!   over a pluggable key-value backend
//! - Queueing images and analyses while offline
//! - Draining the pending queues into a remote sink
//! - Reporting storage usage
//! - KeyValueBackend, RemoteSink and QuotaInspector trait abstractions

pub mod analysis;
pub mod backend;
pub mod clock;
pub mod config;
pub mod document;
pub mod events;
pub mod pending_id;
pub mod queue;
pub mod quota;
pub mod revision;
pub mod service;
pub mod sink;
pub mod store;
pub mod sync;

pub use analysis::AnalysisResult;
pub use backend::{InMemoryBackend, KeyValueBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CorruptPolicy, OfflineConfig, SyncPolicy, WriteMode};
pub use document::{
    OfflineDocument, PendingAnalysis, PendingCounts, PendingImage, PendingItem, PendingUploads,
    STORAGE_KEY,
};
pub use events::{EventBus, OfflineEvent, Subscription};
pub use pending_id::PendingId;
pub use queue::OfflineQueue;
pub use quota::{NoQuota, QuotaError, QuotaInspector, StorageEstimate};
pub use revision::Revision;
pub use service::OfflineService;
pub use sink::{MockSink, RemoteSink, SinkError, SinkGate};
pub use store::{LocalStore, StorageError};
pub use sync::{Queue, SyncCoordinator, SyncError, SyncReport};
