//! RemoteSink that POSTs batches to the backend API.
//!
//! Images go to `{endpoint}/images`, analyses to `{endpoint}/analyses`, each as
//! `{"items": [...]}`. Any 2xx response accepts the whole batch.

use crate::config::SinkConfig;
use anyhow::Context;
use async_trait::async_trait;
use offline_core::sink::Result;
use offline_core::{PendingAnalysis, PendingImage, RemoteSink, SinkError};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

#[derive(Serialize)]
struct Batch<'a, T> {
    items: &'a [T],
}

pub struct HttpSink {
    client: reqwest::Client,
    endpoint: String,
    auth_token: Option<String>,
}

impl HttpSink {
    pub fn new(config: &SinkConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post<T: Serialize + Sync>(&self, path: &str, items: &[T]) -> Result<()> {
        let url = format!("{}/{}", self.endpoint, path);
        let mut request = self.client.post(&url).json(&Batch { items });
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(classify)?;
        let status = response.status();
        if status.is_success() {
            debug!("Delivered {} item(s) to {}", items.len(), url);
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(SinkError::Rejected {
            status: status.as_u16(),
            message: if message.is_empty() {
                status.to_string()
            } else {
                message
            },
        })
    }
}

fn classify(e: reqwest::Error) -> SinkError {
    if e.is_connect() || e.is_timeout() {
        SinkError::Unreachable(e.to_string())
    } else {
        SinkError::Other(e.to_string())
    }
}

#[async_trait]
impl RemoteSink for HttpSink {
    async fn submit_images(&self, items: &[PendingImage]) -> Result<()> {
        self.post("images", items).await
    }

    async fn submit_analyses(&self, items: &[PendingAnalysis]) -> Result<()> {
        self.post("analyses", items).await
    }
}
