//! In-process communicator group
//!
//! Each rank owns an inbox; peers push tagged envelopes into it over tokio
//! channels. Messages are buffered per (operation, sender) so that a fast
//! rank entering the next collective early never gets its payload mixed up
//! with the current round.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use runtime_core::{Error, Rank, Result};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace};

use crate::Communicator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Operation {
    Gather,
    Broadcast,
}

#[derive(Debug)]
struct Envelope {
    from: Rank,
    op: Operation,
    payload: Bytes,
}

/// Receiving side of one rank
struct Inbox {
    rx: mpsc::UnboundedReceiver<Envelope>,
    pending: HashMap<(Operation, Rank), VecDeque<Bytes>>,
}

impl Inbox {
    /// Wait for the next payload of `op` sent by `from`
    async fn take(&mut self, op: Operation, from: Rank) -> Result<Bytes> {
        loop {
            if let Some(payload) = self
                .pending
                .get_mut(&(op, from))
                .and_then(|queue| queue.pop_front())
            {
                return Ok(payload);
            }

            let envelope = self.rx.recv().await.ok_or_else(|| Error::ChannelClosed {
                channel: "local group inbox".to_string(),
            })?;
            trace!(from = envelope.from, op = ?envelope.op, "Buffered envelope");
            self.pending
                .entry((envelope.op, envelope.from))
                .or_default()
                .push_back(envelope.payload);
        }
    }
}

/// One rank's handle onto an in-process communicator group
///
/// Handles are created together with [`LocalGroup::new_group`] and are
/// usually moved into one task per rank.
pub struct LocalGroup {
    rank: Rank,
    peers: Arc<Vec<mpsc::UnboundedSender<Envelope>>>,
    inbox: Mutex<Inbox>,
}

impl LocalGroup {
    /// Create `size` connected handles, indexed by rank
    pub fn new_group(size: usize) -> Vec<LocalGroup> {
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..size).map(|_| mpsc::unbounded_channel()).unzip();
        let peers = Arc::new(senders);

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, rx)| LocalGroup {
                rank: rank as Rank,
                peers: Arc::clone(&peers),
                inbox: Mutex::new(Inbox {
                    rx,
                    pending: HashMap::new(),
                }),
            })
            .collect()
    }

    fn check_root(&self, root: Rank) -> Result<()> {
        if root as usize >= self.peers.len() {
            return Err(Error::InvalidRank {
                rank: root,
                size: self.peers.len(),
            });
        }
        Ok(())
    }

    fn send(&self, to: Rank, op: Operation, payload: Bytes) -> Result<()> {
        self.peers[to as usize]
            .send(Envelope {
                from: self.rank,
                op,
                payload,
            })
            .map_err(|_| Error::ChannelClosed {
                channel: format!("rank {} inbox", to),
            })
    }
}

#[async_trait]
impl Communicator for LocalGroup {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    async fn gather_bytes(&self, payload: Bytes, root: Rank) -> Result<Option<Vec<Bytes>>> {
        self.check_root(root)?;

        if self.rank != root {
            self.send(root, Operation::Gather, payload)?;
            return Ok(None);
        }

        let mut inbox = self.inbox.lock().await;
        let mut gathered = Vec::with_capacity(self.size());
        let mut own = Some(payload);
        for from in 0..self.size() as Rank {
            if from == root {
                gathered.extend(own.take());
            } else {
                gathered.push(inbox.take(Operation::Gather, from).await?);
            }
        }

        debug!(rank = self.rank, count = gathered.len(), "Gather complete");
        Ok(Some(gathered))
    }

    async fn broadcast_bytes(&self, payload: Option<Bytes>, root: Rank) -> Result<Bytes> {
        self.check_root(root)?;

        if self.rank != root {
            let mut inbox = self.inbox.lock().await;
            return inbox.take(Operation::Broadcast, root).await;
        }

        let payload = payload.ok_or_else(|| Error::Protocol {
            rank: self.rank,
            message: "broadcast root supplied no payload".to_string(),
        })?;
        for to in (0..self.size() as Rank).filter(|&r| r != root) {
            self.send(to, Operation::Broadcast, payload.clone())?;
        }

        debug!(rank = self.rank, size = payload.len(), "Broadcast sent");
        Ok(payload)
    }
}
