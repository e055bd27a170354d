//! Configuration loading and management

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use offline_core::OfflineConfig;
use serde::{Deserialize, Serialize};

/// File name of the configuration inside the data directory
pub const CONFIG_FILE: &str = "config.json";

/// Main configuration for the daemon
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Store and sync behavior
    #[serde(default)]
    pub offline: OfflineConfig,

    /// Remote sink endpoint
    #[serde(default)]
    pub sink: SinkConfig,

    /// Periodic sync loop
    #[serde(default)]
    pub sync: SyncLoopConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Base URL; batches go to `{endpoint}/images` and `{endpoint}/analyses`
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Sent as `Authorization: Bearer <token>` when set
    pub auth_token: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            auth_token: None,
            timeout_secs: default_timeout(),
        }
    }
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8080/api/offline".to_string()
}

fn default_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLoopConfig {
    /// Seconds between sync passes while healthy (default: 5 minutes)
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Backoff after failed passes
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for SyncLoopConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            retry: RetryConfig::default(),
        }
    }
}

impl SyncLoopConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_interval() -> u64 {
    5 * 60
}

/// Configuration for retry behavior after a failed sync pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay before the first retry
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    /// Maximum delay between attempts
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    /// Retries before falling back to the regular interval (None = unlimited)
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_factor: default_backoff_factor(),
            max_attempts: None,
        }
    }
}

fn default_initial_delay() -> u64 {
    5_000
}

fn default_max_delay() -> u64 {
    60_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

impl Config {
    /// Load configuration from the data directory
    pub fn load(data_dir: &Path) -> Result<Self> {
        let config_file = data_dir.join(CONFIG_FILE);

        if config_file.exists() {
            let content = std::fs::read_to_string(&config_file)
                .with_context(|| format!("Failed to read config file: {:?}", config_file))?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", CONFIG_FILE))?;
            config
                .validate()
                .with_context(|| format!("Invalid {}", CONFIG_FILE))?;
            tracing::info!("Loaded configuration from {:?}", config_file);
            Ok(config)
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_file);
            let config = Config::default();

            std::fs::create_dir_all(data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

            // Write default config for reference
            let content = serde_json::to_string_pretty(&config)?;
            std::fs::write(&config_file, content)
                .with_context(|| format!("Failed to write default config: {:?}", config_file))?;
            tracing::info!("Created default config at {:?}", config_file);

            Ok(config)
        }
    }

    /// Reject values that would make the sync loop spin without waiting.
    pub fn validate(&self) -> Result<()> {
        let retry = &self.sync.retry;
        ensure!(
            self.sync.interval_secs > 0,
            "sync.interval_secs must be positive"
        );
        ensure!(
            retry.initial_delay_ms > 0,
            "sync.retry.initial_delay_ms must be positive"
        );
        ensure!(
            retry.max_delay_ms >= retry.initial_delay_ms,
            "sync.retry.max_delay_ms must be at least initial_delay_ms"
        );
        ensure!(
            retry.backoff_factor.is_finite() && retry.backoff_factor >= 1.0,
            "sync.retry.backoff_factor must be at least 1.0"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offline_core::{SyncPolicy, WriteMode};
    use tempfile::TempDir;

    #[test]
    fn test_load_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(dir.path()).unwrap();

        assert_eq!(config.sync.interval_secs, 300);
        assert_eq!(config.offline, OfflineConfig::default());
        assert!(dir.path().join(CONFIG_FILE).exists());

        // Second load reads the file it wrote
        let again = Config::load(dir.path()).unwrap();
        assert_eq!(again.sink.endpoint, config.sink.endpoint);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{
                "offline": { "write_mode": "compare_and_swap", "sync_policy": "per_queue" },
                "sink": { "endpoint": "https://example.org/sync", "auth_token": "secret" },
                "sync": { "interval_secs": 60, "retry": { "max_attempts": 4 } }
            }"#,
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.offline.write_mode, WriteMode::CompareAndSwap);
        assert_eq!(config.offline.sync_policy, SyncPolicy::PerQueue);
        assert_eq!(config.offline.storage_key, "tree_detection_offline_data");
        assert_eq!(config.sink.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.sink.timeout_secs, 30);
        assert_eq!(config.sync.interval(), Duration::from_secs(60));
        assert_eq!(config.sync.retry.max_attempts, Some(4));
        assert_eq!(config.sync.retry.initial_delay_ms, 5_000);
    }

    #[test]
    fn test_defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_values_that_would_busy_loop_are_rejected() {
        let cases = [
            r#"{ "sync": { "interval_secs": 0 } }"#,
            r#"{ "sync": { "retry": { "backoff_factor": 0.0 } } }"#,
            r#"{ "sync": { "retry": { "backoff_factor": 0.5 } } }"#,
            r#"{ "sync": { "retry": { "initial_delay_ms": 0 } } }"#,
            r#"{ "sync": { "retry": { "initial_delay_ms": 10000, "max_delay_ms": 100 } } }"#,
        ];

        for case in cases {
            let dir = TempDir::new().unwrap();
            std::fs::write(dir.path().join(CONFIG_FILE), case).unwrap();
            let err = Config::load(dir.path()).unwrap_err();
            assert!(err.to_string().contains("Invalid"), "{case}: {err:#}");
        }
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{ nope").unwrap();
        let err = Config::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }
}
