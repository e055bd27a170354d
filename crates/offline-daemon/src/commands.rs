//! File-reading CLI commands that feed the offline queue.

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use offline_core::{AnalysisResult, OfflineService, PendingId};
use std::path::Path;

/// Read an image file, base64-encode it and queue it for upload.
pub async fn queue_image_file(service: &OfflineService, path: &Path) -> Result<PendingId> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image: {:?}", path))?;
    let id = service
        .queue()
        .save_image_for_upload(STANDARD.encode(bytes))
        .await?;
    Ok(id)
}

/// Read one analysis result from a JSON file and save it for offline access.
pub async fn save_analysis_file(service: &OfflineService, path: &Path) -> Result<PendingId> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read analysis: {:?}", path))?;
    let analysis: AnalysisResult = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse analysis: {:?}", path))?;
    let id = service.queue().save_tree_analysis(analysis).await?;
    Ok(id)
}
