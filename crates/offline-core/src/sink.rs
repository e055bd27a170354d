//! RemoteSink trait for delivering pending uploads.
//!
//! Implementations:
//! - `MockSink` - Deterministic test double (failures, latency, gating)
//! - `HttpSink` (in offline-daemon) - POSTs batches to a backend API
//!
//! Contract: each call accepts or rejects its whole list, and repeating a
//! call with the same items is safe.

use crate::document::{PendingAnalysis, PendingImage};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Notify, watch};
use tracing::debug;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Remote sink unreachable: {0}")]
    Unreachable(String),

    #[error("Remote sink rejected batch ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Remote sink error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, SinkError>;

/// Acceptor of queued uploads
#[async_trait]
pub trait RemoteSink: Send + Sync {
    /// Deliver a batch of images, all or nothing.
    async fn submit_images(&self, items: &[PendingImage]) -> Result<()>;

    /// Deliver a batch of analyses, all or nothing.
    async fn submit_analyses(&self, items: &[PendingAnalysis]) -> Result<()>;
}

/// In-memory sink for testing.
///
/// Records every accepted batch. Each queue can be switched to fail, given a
/// fixed latency, or held behind a `SinkGate` until the test releases it.
#[derive(Default)]
pub struct MockSink {
    fail_images: AtomicBool,
    fail_analyses: AtomicBool,
    latency: Option<Duration>,
    gate: Option<watch::Receiver<bool>>,
    entered: Arc<Notify>,
    image_calls: AtomicUsize,
    analysis_calls: AtomicUsize,
    images: Mutex<Vec<Vec<PendingImage>>>,
    analyses: Mutex<Vec<Vec<PendingAnalysis>>>,
}

/// Test-side handle of a gated `MockSink`.
pub struct SinkGate {
    open: watch::Sender<bool>,
    entered: Arc<Notify>,
}

impl SinkGate {
    /// Wait until a submission has reached the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let every held and future submission through.
    pub fn open(&self) {
        let _ = self.open.send(true);
    }
}

impl MockSink {
    /// Sink that accepts everything immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink whose every submission sleeps for `latency` first.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Sink whose submissions wait until the returned gate is opened.
    pub fn gated() -> (Self, SinkGate) {
        let (tx, rx) = watch::channel(false);
        let sink = Self {
            gate: Some(rx),
            ..Self::default()
        };
        let gate = SinkGate {
            open: tx,
            entered: Arc::clone(&sink.entered),
        };
        (sink, gate)
    }

    pub fn set_fail_images(&self, fail: bool) {
        self.fail_images.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_analyses(&self, fail: bool) {
        self.fail_analyses.store(fail, Ordering::SeqCst);
    }

    /// Number of image submissions attempted, accepted or not.
    pub fn image_calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }

    pub fn analysis_calls(&self) -> usize {
        self.analysis_calls.load(Ordering::SeqCst)
    }

    /// Accepted image batches, oldest first.
    pub fn delivered_images(&self) -> Vec<Vec<PendingImage>> {
        self.images.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Accepted analysis batches, oldest first.
    pub fn delivered_analyses(&self) -> Vec<Vec<PendingAnalysis>> {
        self.analyses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn pass_gate(&self) {
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            let mut gate = gate.clone();
            // A closed channel means the test dropped the gate; let it through.
            let _ = gate.wait_for(|open| *open).await;
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl RemoteSink for MockSink {
    async fn submit_images(&self, items: &[PendingImage]) -> Result<()> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await;
        if self.fail_images.load(Ordering::SeqCst) {
            return Err(SinkError::Unreachable("mock image sink offline".into()));
        }
        debug!("Mock sink accepted {} image(s)", items.len());
        self.images
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(items.to_vec());
        Ok(())
    }

    async fn submit_analyses(&self, items: &[PendingAnalysis]) -> Result<()> {
        self.analysis_calls.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await;
        if self.fail_analyses.load(Ordering::SeqCst) {
            return Err(SinkError::Unreachable("mock analysis sink offline".into()));
        }
        debug!("Mock sink accepted {} analysis(es)", items.len());
        self.analyses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(items.to_vec());
        Ok(())
    }
}
