//! Serialization collaborator for checkpointed state
//!
//! The controller treats state as opaque: it asks a [`Snapshot`] for bytes
//! when writing and hands bytes back when resuming.

use std::ops::{Deref, DerefMut};

use bytes::Bytes;
use runtime_core::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// State that can be written to and restored from a checkpoint file
pub trait Snapshot: Send + Sync {
    /// Encode the current state
    fn save(&self) -> Result<Bytes>;

    /// Replace the current state with a decoded checkpoint
    fn load(&mut self, data: Bytes) -> Result<()>;
}

/// Snapshot adapter encoding any serde value with bincode
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BincodeSnapshot<T>(pub T);

impl<T> Snapshot for BincodeSnapshot<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn save(&self) -> Result<Bytes> {
        Ok(Bytes::from(bincode::serialize(&self.0)?))
    }

    fn load(&mut self, data: Bytes) -> Result<()> {
        self.0 = bincode::deserialize(&data)?;
        Ok(())
    }
}

impl<T> Deref for BincodeSnapshot<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for BincodeSnapshot<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

/// Snapshot adapter encoding any serde value as JSON, for inspectable files
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonSnapshot<T>(pub T);

impl<T> Snapshot for JsonSnapshot<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn save(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(&self.0)?))
    }

    fn load(&mut self, data: Bytes) -> Result<()> {
        self.0 = serde_json::from_slice(&data)?;
        Ok(())
    }
}

impl<T> Deref for JsonSnapshot<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for JsonSnapshot<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}
