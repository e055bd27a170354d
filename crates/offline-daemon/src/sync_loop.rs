//! Periodic sync loop with exponential backoff after failures.
//!
//! All sync passes in the daemon run from this loop, so passes never overlap.

use crate::config::{RetryConfig, SyncLoopConfig};
use offline_core::OfflineService;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Calculates the retry delay for the given failed attempt using exponential
/// backoff.
pub fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let delay_ms = config.initial_delay_ms as f64
        * config.backoff_factor.powi(attempt.saturating_sub(1) as i32);

    Duration::from_millis(delay_ms.min(config.max_delay_ms as f64) as u64)
}

pub struct SyncLoop {
    config: SyncLoopConfig,
}

impl SyncLoop {
    pub fn new(config: SyncLoopConfig) -> Self {
        Self { config }
    }

    /// Delay before the next pass given the number of consecutive failed
    /// passes so far.
    ///
    /// Healthy passes wait the regular interval. Failures back off
    /// exponentially until `max_attempts` is used up, then fall back to the
    /// regular interval.
    pub fn next_delay(&self, consecutive_failures: u32) -> Duration {
        let retry = &self.config.retry;
        let exhausted = retry
            .max_attempts
            .map(|max| consecutive_failures > max)
            .unwrap_or(false);

        if consecutive_failures == 0 || exhausted {
            self.config.interval()
        } else {
            calculate_backoff(consecutive_failures, retry)
        }
    }

    /// Run passes until `shutdown` resolves. The first pass starts
    /// immediately. Returns the number of passes run.
    pub async fn run<F>(&self, service: &OfflineService, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut passes = 0;
        let mut failures = 0u32;

        loop {
            passes += 1;
            match service.sync().sync_offline_data().await {
                Ok(report) => {
                    if failures > 0 {
                        info!("Sync recovered after {} failed pass(es)", failures);
                    }
                    failures = 0;
                    debug!(
                        "Sync pass {} delivered {} image(s), {} analysis(es)",
                        passes, report.images, report.analyses
                    );
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    warn!("Sync pass {} failed (attempt {}): {}", passes, failures, e);
                }
            }

            let delay = self.next_delay(failures);
            debug!("Next sync pass in {:?}", delay);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = &mut shutdown => {
                    info!("Sync loop stopping after {} pass(es)", passes);
                    return passes;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offline_core::{InMemoryBackend, ManualClock, MockSink, NoQuota, OfflineConfig};
    use std::sync::Arc;

    fn loop_config(retry: RetryConfig) -> SyncLoopConfig {
        SyncLoopConfig {
            interval_secs: 300,
            retry,
        }
    }

    fn service(sink: Arc<MockSink>) -> OfflineService {
        OfflineService::new(
            &OfflineConfig::default(),
            Arc::new(InMemoryBackend::new()),
            sink,
            Arc::new(NoQuota),
            Arc::new(ManualClock::ticking(1_000, 1)),
        )
    }

    #[test]
    fn test_calculate_backoff_exponential() {
        let config = RetryConfig::default();

        assert_eq!(calculate_backoff(1, &config), Duration::from_secs(5));
        assert_eq!(calculate_backoff(2, &config), Duration::from_secs(10));
        assert_eq!(calculate_backoff(3, &config), Duration::from_secs(20));
        assert_eq!(calculate_backoff(4, &config), Duration::from_secs(40));
        assert_eq!(calculate_backoff(5, &config), Duration::from_secs(60)); // Capped at max
        assert_eq!(calculate_backoff(10, &config), Duration::from_secs(60));
    }

    #[test]
    fn test_calculate_backoff_custom_config() {
        let config = RetryConfig {
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
            backoff_factor: 3.0,
            max_attempts: Some(5),
        };

        assert_eq!(calculate_backoff(1, &config), Duration::from_secs(1));
        assert_eq!(calculate_backoff(2, &config), Duration::from_secs(3));
        assert_eq!(calculate_backoff(3, &config), Duration::from_secs(9));
        assert_eq!(calculate_backoff(4, &config), Duration::from_secs(10));
    }

    #[test]
    fn test_next_delay_healthy_uses_interval() {
        let sync_loop = SyncLoop::new(loop_config(RetryConfig::default()));
        assert_eq!(sync_loop.next_delay(0), Duration::from_secs(300));
        assert_eq!(sync_loop.next_delay(1), Duration::from_secs(5));
    }

    #[test]
    fn test_next_delay_falls_back_after_max_attempts() {
        let sync_loop = SyncLoop::new(loop_config(RetryConfig {
            max_attempts: Some(2),
            ..Default::default()
        }));
        assert_eq!(sync_loop.next_delay(1), Duration::from_secs(5));
        assert_eq!(sync_loop.next_delay(2), Duration::from_secs(10));
        assert_eq!(sync_loop.next_delay(3), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_run_syncs_then_stops() {
        let sink = Arc::new(MockSink::new());
        let service = service(Arc::clone(&sink));
        service
            .queue()
            .save_image_for_upload("aW1n".into())
            .await
            .unwrap();

        let sync_loop = SyncLoop::new(loop_config(RetryConfig::default()));
        let passes = sync_loop
            .run(&service, tokio::time::sleep(Duration::from_millis(50)))
            .await;

        assert_eq!(passes, 1);
        assert_eq!(sink.delivered_images().len(), 1);
        assert!(service.queue().get_pending_uploads().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_retries_failed_passes() {
        let sink = Arc::new(MockSink::new());
        sink.set_fail_analyses(true);
        let service = service(Arc::clone(&sink));

        let sync_loop = SyncLoop::new(loop_config(RetryConfig {
            initial_delay_ms: 10,
            max_delay_ms: 20,
            backoff_factor: 2.0,
            max_attempts: None,
        }));
        let passes = sync_loop
            .run(&service, tokio::time::sleep(Duration::from_millis(300)))
            .await;

        assert!(passes >= 2, "only {passes} pass(es)");
        assert!(sink.analysis_calls() >= 2);
    }
}
