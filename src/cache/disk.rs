/// Content-addressed disk cache for downloaded photo bytes
///
/// Files are named by the hex SHA-256 of the photo's full URL, so names are
/// deterministic across restarts and cache hits survive them. Writes go to a
/// temp file in the same directory and are atomically promoted; a file that
/// exists is always fully written.
use std::io::Write;
use std::path::PathBuf;

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::StorageError;

#[derive(Debug, Clone)]
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Deterministic on-disk path for a resource key
    pub fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        let name: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
        self.dir.join(name)
    }

    /// Read the cached bytes for `key`. A missing file is `None`, not an error.
    pub async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Persist the bytes for `key`.
    ///
    /// The temp file lives in the cache directory itself so the final rename
    /// stays on one filesystem and is atomic. Concurrent writers to distinct
    /// keys are safe; same-key races are precluded upstream by single-flight.
    pub async fn write(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let dir = self.dir.clone();

        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.persist(&path).map_err(|e| StorageError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Background(e.to_string()))?
    }
}
