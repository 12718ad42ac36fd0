//! Storage backend trait definition
//!
//! Defines the async interface the checkpoint layer uses to persist and
//! enumerate generation files.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use runtime_core::Result;

/// Serialization routine invoked once the temporary file exists
pub type PayloadProducer<'a> = Box<dyn FnOnce() -> Result<Bytes> + Send + 'a>;

/// Async trait for checkpoint storage backends
///
/// Names are flat file names inside the backend's root directory.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Directory that holds every file managed by this backend
    fn root(&self) -> &Path;

    /// Atomically write the payload produced by `producer` under `name`
    ///
    /// The root directory is created if missing. A temporary file is created
    /// inside the root, `producer` is invoked to obtain the payload, and the
    /// temporary file is renamed to `name`. On any failure the temporary file
    /// is removed before the error is returned, and `name` is left untouched.
    ///
    /// # Returns
    /// Number of bytes written
    async fn write_with<'a>(&self, name: &str, producer: PayloadProducer<'a>) -> Result<u64>;

    /// Atomically write `data` under `name`
    async fn write(&self, name: &str, data: Bytes) -> Result<u64> {
        self.write_with(name, Box::new(move || Ok(data))).await
    }

    /// Read the file stored under `name`
    ///
    /// # Errors
    /// Returns `StoragePathNotFound` if the file does not exist
    async fn read(&self, name: &str) -> Result<Bytes>;

    /// Delete the file stored under `name`
    ///
    /// # Errors
    /// Returns `StoragePathNotFound` if the file does not exist
    async fn delete(&self, name: &str) -> Result<()>;

    /// Check if a file exists under `name`
    async fn exists(&self, name: &str) -> Result<bool>;

    /// List the names of all regular files in the root directory
    ///
    /// A missing root directory lists as empty.
    async fn list(&self) -> Result<Vec<String>>;
}
