//! Local filesystem storage backend
//!
//! Provides async file I/O with atomic writes to prevent partial/corrupt files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use runtime_core::{Error, Result};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{PayloadProducer, StorageBackend};

/// Prefix of in-flight temporary files
pub const TEMP_PREFIX: &str = "tmp-";

/// Local filesystem storage backend
///
/// Stores files flat in one directory with support for:
/// - Atomic writes (write to `tmp-<name>.<uuid>`, fsync, then rename)
/// - Idempotent directory creation
/// - Flat file listing
#[derive(Debug, Clone)]
pub struct LocalStorage {
    /// Directory for all storage operations
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Directory to use as the storage root
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    /// Resolve a file name to a path inside the root
    fn resolve_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains('/') || name.contains('\\') || name == ".." {
            return Err(Error::Storage {
                message: format!("Invalid file name {:?}", name),
            });
        }
        Ok(self.base_path.join(name))
    }

    /// Generate a unique temporary path next to the final one
    ///
    /// The extra `.<uuid>` field keeps temporary names from ever parsing as
    /// a three-field generation name.
    fn temp_path(&self, name: &str) -> PathBuf {
        let temp_name = format!("{}{}.{}", TEMP_PREFIX, name, Uuid::new_v4().simple());
        self.base_path.join(temp_name)
    }

    /// Fill the temporary file with the produced payload
    async fn populate(file: &mut fs::File, producer: PayloadProducer<'_>) -> Result<u64> {
        let data = producer()?;

        file.write_all(&data).await.map_err(|e| Error::Storage {
            message: format!("Failed to write data: {}", e),
        })?;

        file.sync_all().await.map_err(|e| Error::Storage {
            message: format!("Failed to sync file: {}", e),
        })?;

        Ok(data.len() as u64)
    }

    /// Best-effort removal of an abandoned temporary file
    async fn discard_temp(temp_path: &Path) {
        if let Err(e) = fs::remove_file(temp_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(?temp_path, error = %e, "Failed to remove temporary file");
            }
        }
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    fn root(&self) -> &Path {
        &self.base_path
    }

    #[instrument(skip(self, producer), fields(backend = "local"))]
    async fn write_with<'a>(&self, name: &str, producer: PayloadProducer<'a>) -> Result<u64> {
        let full_path = self.resolve_path(name)?;
        let temp_path = self.temp_path(name);

        fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| Error::Storage {
                message: format!("Failed to create directory {:?}: {}", self.base_path, e),
            })?;

        debug!(?full_path, ?temp_path, "Writing file atomically");

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await
            .map_err(|e| Error::Storage {
                message: format!("Failed to create temp file {:?}: {}", temp_path, e),
            })?;

        let populated = Self::populate(&mut file, producer).await;
        drop(file);

        let size = match populated {
            Ok(size) => size,
            Err(e) => {
                Self::discard_temp(&temp_path).await;
                return Err(e);
            }
        };

        // Atomic rename
        if let Err(e) = fs::rename(&temp_path, &full_path).await {
            Self::discard_temp(&temp_path).await;
            return Err(Error::Storage {
                message: format!("Failed to rename {:?} to {:?}: {}", temp_path, full_path, e),
            });
        }

        debug!(?full_path, size, "File written successfully");
        Ok(size)
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn read(&self, name: &str) -> Result<Bytes> {
        let full_path = self.resolve_path(name)?;
        debug!(?full_path, "Reading file");

        match fs::read(&full_path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::StoragePathNotFound {
                path: name.to_string(),
            }),
            Err(e) => Err(Error::Storage {
                message: format!("Failed to read {}: {}", name, e),
            }),
        }
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn delete(&self, name: &str) -> Result<()> {
        let full_path = self.resolve_path(name)?;
        debug!(?full_path, "Deleting file");

        match fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::StoragePathNotFound {
                path: name.to_string(),
            }),
            Err(e) => Err(Error::Storage {
                message: format!("Failed to delete {}: {}", name, e),
            }),
        }
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn exists(&self, name: &str) -> Result<bool> {
        let full_path = self.resolve_path(name)?;
        Ok(fs::metadata(&full_path).await.is_ok())
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn list(&self) -> Result<Vec<String>> {
        let mut results = Vec::new();

        let mut entries = match fs::read_dir(&self.base_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(root = ?self.base_path, "Storage root missing, nothing to list");
                return Ok(results);
            }
            Err(e) => {
                return Err(Error::Storage {
                    message: format!("Failed to list {:?}: {}", self.base_path, e),
                })
            }
        };

        while let Some(entry) = entries.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(_) => continue,
            };
            if metadata.is_file() {
                results.push(entry.file_name().to_string_lossy().to_string());
            }
        }

        results.sort();
        debug!(count = results.len(), "Found files");
        Ok(results)
    }
}
