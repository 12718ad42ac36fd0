//! Post-resume consistency signalling
//!
//! Collaborators that would otherwise redistribute state from one rank after
//! a resume (a distributed optimizer, for instance) implement
//! [`ConsistencyHandle`]. The controller tells them whether that broadcast
//! is still required.

/// Receives the controller's verdict on post-resume state redistribution
pub trait ConsistencyHandle: Send {
    fn set_needs_broadcast(&mut self, needed: bool);
}

/// Plain flag for drivers without a richer collaborator
///
/// Starts out requiring a broadcast, matching a fresh start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastFlag {
    needs_broadcast: bool,
}

impl BroadcastFlag {
    pub fn new() -> Self {
        Self {
            needs_broadcast: true,
        }
    }

    pub fn needs_broadcast(&self) -> bool {
        self.needs_broadcast
    }
}

impl Default for BroadcastFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsistencyHandle for BroadcastFlag {
    fn set_needs_broadcast(&mut self, needed: bool) {
        self.needs_broadcast = needed;
    }
}
