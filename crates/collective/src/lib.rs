//! Collective - gather/broadcast primitives across the ranks of a job
//!
//! The checkpoint agreement protocol only needs two collectives: a gather to
//! a root and a broadcast from it. Any transport (MPI, NCCL bootstrap, a
//! coordinator service) can back them by implementing [`Communicator`].
//! [`LocalGroup`] provides an in-process implementation where every rank is
//! a task in the same process.

mod communicator;
mod local;

pub use communicator::{Communicator, CommunicatorExt};
pub use local::LocalGroup;
