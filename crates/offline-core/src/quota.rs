//! Best-effort report of persistent storage usage.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("Storage estimate unavailable: {0}")]
    Unavailable(String),

    #[error("IO error while estimating storage: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage estimate timed out after {0:?}")]
    TimedOut(Duration),
}

/// Bytes used by this application and bytes the platform makes available.
///
/// `{0, 0}` means the platform has no accounting facility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StorageEstimate {
    pub used: u64,
    pub available: u64,
}

impl StorageEstimate {
    /// Fraction of `available` in use, `None` when nothing is reported.
    pub fn usage_ratio(&self) -> Option<f64> {
        (self.available > 0).then(|| self.used as f64 / self.available as f64)
    }
}

/// Platform storage accounting.
#[async_trait]
pub trait QuotaInspector: Send + Sync {
    async fn estimate(&self) -> Result<StorageEstimate, QuotaError>;
}

/// Inspector for platforms without storage accounting.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoQuota;

#[async_trait]
impl QuotaInspector for NoQuota {
    async fn estimate(&self) -> Result<StorageEstimate, QuotaError> {
        Ok(StorageEstimate::default())
    }
}

/// Ask `inspector` for an estimate, giving up after `limit`.
pub async fn estimate_within(
    inspector: &dyn QuotaInspector,
    limit: Duration,
) -> Result<StorageEstimate, QuotaError> {
    match tokio::time::timeout(limit, inspector.estimate()).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Storage estimate did not finish within {:?}", limit);
            Err(QuotaError::TimedOut(limit))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StuckInspector;

    #[async_trait]
    impl QuotaInspector for StuckInspector {
        async fn estimate(&self) -> Result<StorageEstimate, QuotaError> {
            std::future::pending().await
        }
    }

    struct BrokenInspector;

    #[async_trait]
    impl QuotaInspector for BrokenInspector {
        async fn estimate(&self) -> Result<StorageEstimate, QuotaError> {
            Err(QuotaError::Unavailable("no storage manager".into()))
        }
    }

    #[tokio::test]
    async fn test_no_quota_reports_zero() {
        let estimate = NoQuota.estimate().await.unwrap();
        assert_eq!(estimate, StorageEstimate { used: 0, available: 0 });
        assert_eq!(estimate.usage_ratio(), None);
    }

    #[test]
    fn test_usage_ratio() {
        let estimate = StorageEstimate {
            used: 25,
            available: 100,
        };
        assert_eq!(estimate.usage_ratio(), Some(0.25));
    }

    #[tokio::test]
    async fn test_estimate_within_times_out() {
        let err = estimate_within(&StuckInspector, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, QuotaError::TimedOut(_)));
    }

    #[tokio::test]
    async fn test_errors_are_surfaced() {
        let err = estimate_within(&BrokenInspector, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, QuotaError::Unavailable(_)));
    }
}
