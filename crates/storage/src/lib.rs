//! Storage - Checkpoint file storage for the distributed checkpoint runtime
//!
//! Provides async, crash-safe file operations over a single checkpoint
//! directory. Writes go to a `tmp-` prefixed file in the same directory and
//! are renamed into place, so a final name is never observable half-written.
//!
//! Atomicity relies on `rename` within one directory being atomic, which
//! holds on POSIX filesystems. Targets without that guarantee (some network
//! or object-store mounts) must not be used as a checkpoint directory.
//!
//! # Example
//!
//! ```no_run
//! use storage::{StorageBackend, LocalStorage};
//! use bytes::Bytes;
//!
//! # async fn example() -> runtime_core::Result<()> {
//! let storage = LocalStorage::new("/tmp/checkpoints");
//! storage.write("run.0.100", Bytes::from(vec![1, 2, 3])).await?;
//! let data = storage.read("run.0.100").await?;
//! # Ok(())
//! # }
//! ```

mod backend;
mod local;

pub use backend::{PayloadProducer, StorageBackend};
pub use local::{LocalStorage, TEMP_PREFIX};
