//! offline-daemon library: Exposes the native host components for testing.
//!
//! This is a thin library layer over the daemon components,
//! allowing integration tests to access internal types.

pub mod commands;
pub mod config;
pub mod disk_quota;
pub mod file_backend;
pub mod http_sink;
pub mod sync_loop;

// Re-export key types for convenience
pub use commands::{queue_image_file, save_analysis_file};
pub use config::{Config, RetryConfig, SinkConfig, SyncLoopConfig};
pub use disk_quota::DiskQuota;
pub use file_backend::FileBackend;
pub use http_sink::HttpSink;
pub use sync_loop::SyncLoop;

use offline_core::{OfflineService, SystemClock};
use std::path::Path;
use std::sync::Arc;

/// Subdirectory of the data directory holding stored documents, kept apart
/// from `config.json` so no storage key can name the config file.
pub const STORE_DIR: &str = "store";

/// Build the service for a data directory: file-backed store, HTTP sink,
/// disk quota.
pub fn build_service(data_dir: &Path, config: &Config) -> anyhow::Result<OfflineService> {
    let backend = Arc::new(FileBackend::new(data_dir.join(STORE_DIR)));
    let sink = Arc::new(HttpSink::new(&config.sink)?);
    let quota = Arc::new(DiskQuota::new(data_dir.to_path_buf()));
    Ok(OfflineService::new(
        &config.offline,
        backend,
        sink,
        quota,
        Arc::new(SystemClock),
    ))
}
