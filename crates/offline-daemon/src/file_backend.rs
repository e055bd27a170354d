//! Native key-value backend using tokio::fs.
//!
//! Each key is one `<key>.json` file in the base directory. Writes go to a
//! temp file first and are renamed into place, so a crash leaves either the
//! old or the new document, never a torn one.

use async_trait::async_trait;
use offline_core::backend::{KeyValueBackend, Result, revision_matches};
use offline_core::{Revision, StorageError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

/// File-per-key backend for the daemon
pub struct FileBackend {
    base_path: PathBuf,
    /// Serializes writers inside this process
    write_lock: Mutex<()>,
}

impl FileBackend {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            base_path,
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the file holding `key`.
    ///
    /// Keys are restricted to `[A-Za-z0-9_.-]` so they cannot escape the
    /// base directory.
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            return Err(StorageError::Unavailable(format!(
                "invalid storage key '{key}'"
            )));
        }
        Ok(self.base_path.join(format!("{key}.json")))
    }

    async fn read_file(path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(e)),
        }
    }

    /// Atomic write using temp file + rename.
    async fn atomic_write(&self, path: &Path, content: &str) -> Result<()> {
        fs::create_dir_all(&self.base_path).await.map_err(io_error)?;

        let temp_path = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));

        if let Err(e) = fs::write(&temp_path, content).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(io_error(e));
        }

        if let Err(e) = fs::rename(&temp_path, path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(io_error(e));
        }

        debug!("Wrote {} bytes to {:?}", content.len(), path);
        Ok(())
    }
}

fn io_error(e: std::io::Error) -> StorageError {
    if e.kind() == ErrorKind::StorageFull {
        StorageError::QuotaExceeded(e.to_string())
    } else {
        StorageError::Unavailable(e.to_string())
    }
}

#[async_trait]
impl KeyValueBackend for FileBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        Self::read_file(&path).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let _guard = self.write_lock.lock().await;
        self.atomic_write(&path, value).await
    }

    // Atomic against other writers in this process only.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&Revision>,
        value: &str,
    ) -> Result<bool> {
        let path = self.path_for(key)?;
        let _guard = self.write_lock.lock().await;
        let current = Self::read_file(&path).await?;
        if !revision_matches(current.as_deref(), expected) {
            return Ok(false);
        }
        self.atomic_write(&path, value).await?;
        Ok(true)
    }
}
