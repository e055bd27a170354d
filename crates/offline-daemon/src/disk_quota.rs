//! Storage accounting for the data directory.

use async_trait::async_trait;
use offline_core::{QuotaError, QuotaInspector, StorageEstimate};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Reports the size of the data directory against the free space on its
/// filesystem.
pub struct DiskQuota {
    data_dir: PathBuf,
}

impl DiskQuota {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }
}

/// Total size of regular files under `path`, recursing into directories.
fn dir_size(path: &Path) -> std::io::Result<u64> {
    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut total = 0;
    for entry in entries {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            total += dir_size(&entry.path())?;
        } else if file_type.is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

/// Free space on the filesystem holding `path`, or on its nearest existing
/// ancestor when it has not been created yet.
fn available_space(path: &Path) -> std::io::Result<u64> {
    let existing = path
        .ancestors()
        .find(|p| p.exists())
        .unwrap_or_else(|| Path::new("."));
    fs2::available_space(existing)
}

#[async_trait]
impl QuotaInspector for DiskQuota {
    async fn estimate(&self) -> Result<StorageEstimate, QuotaError> {
        let data_dir = self.data_dir.clone();
        tokio::task::spawn_blocking(move || {
            Ok::<_, QuotaError>(StorageEstimate {
                used: dir_size(&data_dir)?,
                available: available_space(&data_dir)?,
            })
        })
        .await
        .map_err(|e| QuotaError::Unavailable(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_counts_nested_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.json"), vec![b'x'; 100]).unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.json"), vec![b'y'; 50]).unwrap();

        let estimate = DiskQuota::new(dir.path().to_path_buf())
            .estimate()
            .await
            .unwrap();
        assert_eq!(estimate.used, 150);
        assert!(estimate.available > 0);
    }

    #[tokio::test]
    async fn test_missing_dir_uses_nothing() {
        let dir = TempDir::new().unwrap();
        let estimate = DiskQuota::new(dir.path().join("not-yet"))
            .estimate()
            .await
            .unwrap();
        assert_eq!(estimate.used, 0);
        assert!(estimate.available > 0);
    }
}
