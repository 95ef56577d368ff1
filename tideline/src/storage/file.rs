//! File-backed storage backend.
//!
//! Each key maps to one file under a root directory, named by the hex
//! SHA-256 of the key. Hashing sidesteps every filesystem naming restriction
//! (separators, length limits, case-insensitive collisions) at the cost of
//! an opaque directory listing, which the runtime never needs anyway.
//!
//! Writes go through a temp file and rename, so a crash mid-write leaves the
//! previous value intact rather than a truncated file.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;

use super::{BoxFuture, Storage, StorageError};

/// A [`Storage`] backend writing one file per key.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Open a file storage rooted at `root`, creating the directory if
    /// needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), "file storage opened");
        Ok(Self { root })
    }

    /// The directory values are stored under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.root.join(format!("{:x}.dat", digest))
    }
}

impl Storage for FileStorage {
    fn set(&self, key: &str, value: Vec<u8>) -> BoxFuture<'_, Result<(), StorageError>> {
        let path = self.path_for(key);
        Box::pin(async move {
            let tmp = path.with_extension("dat.tmp");
            fs::write(&tmp, &value).await?;
            fs::rename(&tmp, &path).await?;
            Ok(())
        })
    }

    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<Vec<u8>>, StorageError>> {
        let path = self.path_for(key);
        Box::pin(async move {
            match fs::read(&path).await {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn delete(&self, key: &str) -> BoxFuture<'_, Result<bool, StorageError>> {
        let path = self.path_for(key);
        Box::pin(async move {
            match fs::remove_file(&path).await {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
    }
}
