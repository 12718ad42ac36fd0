//! Communicator trait definition

use async_trait::async_trait;
use bytes::Bytes;
use runtime_core::{Rank, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Async trait for collective communication backends
///
/// Every call is a collective: all ranks of the communicator must invoke the
/// same operation with the same root, in the same order, or the job
/// deadlocks. Calls have no timeout; a rank that never arrives blocks its
/// peers indefinitely.
#[async_trait]
pub trait Communicator: Send + Sync {
    /// This process's rank
    fn rank(&self) -> Rank;

    /// Number of ranks in the communicator
    fn size(&self) -> usize;

    /// Gather one payload from every rank at `root`
    ///
    /// # Returns
    /// `Some(payloads)` ordered by rank on the root, `None` elsewhere
    async fn gather_bytes(&self, payload: Bytes, root: Rank) -> Result<Option<Vec<Bytes>>>;

    /// Broadcast the root's payload to every rank
    ///
    /// `payload` is only read on the root; other ranks pass `None`.
    ///
    /// # Returns
    /// The root's payload, on every rank including the root
    async fn broadcast_bytes(&self, payload: Option<Bytes>, root: Rank) -> Result<Bytes>;
}

/// Typed collectives over any [`Communicator`], encoded with bincode
#[async_trait]
pub trait CommunicatorExt: Communicator {
    /// Gather a serializable value from every rank at `root`
    async fn gather<T>(&self, value: &T, root: Rank) -> Result<Option<Vec<T>>>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        let payload = Bytes::from(bincode::serialize(value)?);
        match self.gather_bytes(payload, root).await? {
            Some(payloads) => {
                let values = payloads
                    .iter()
                    .map(|p| bincode::deserialize(p))
                    .collect::<std::result::Result<Vec<T>, _>>()?;
                Ok(Some(values))
            }
            None => Ok(None),
        }
    }

    /// Broadcast a serializable value from `root` to every rank
    async fn broadcast<T>(&self, value: Option<&T>, root: Rank) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        let payload = match value {
            Some(v) => Some(Bytes::from(bincode::serialize(v)?)),
            None => None,
        };
        let received = self.broadcast_bytes(payload, root).await?;
        Ok(bincode::deserialize(&received)?)
    }
}

impl<C: Communicator + ?Sized> CommunicatorExt for C {}
