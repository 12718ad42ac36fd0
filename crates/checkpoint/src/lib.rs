//! Checkpoint - Distributed generational checkpointing
//!
//! Every rank periodically writes its own snapshot as a generation file
//! named `<run>.<rank>.<iteration>`. Periodic agreement rounds intersect the
//! generations all ranks hold, keep the newest `cp_interval` of them and
//! garbage-collect the rest. On restart, every rank loads the newest
//! generation that all ranks agree on.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use checkpoint::{BincodeSnapshot, BroadcastFlag, CheckpointController};
//! use collective::{Communicator, LocalGroup};
//! use runtime_core::CheckpointConfig;
//!
//! # async fn example() -> runtime_core::Result<()> {
//! let comm: Arc<dyn Communicator> = Arc::new(LocalGroup::new_group(1).remove(0));
//! let config = CheckpointConfig::new("resnet").with_base_path("/tmp/cpr");
//! let mut controller = CheckpointController::new(config, comm)?;
//!
//! let mut model = BincodeSnapshot(vec![0.0f32; 16]);
//! let mut flag = BroadcastFlag::new();
//! let outcome = controller.resume(&mut model, Some(&mut flag)).await?;
//!
//! for iteration in outcome.iteration.unwrap_or(0) + 1..=100 {
//!     controller.maybe_checkpoint(&model, iteration).await?;
//! }
//! controller.finalize().await;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod consistency;
pub mod controller;
pub mod local_set;
pub mod quorum;
pub mod snapshot;
pub mod stats;

pub use codec::Generation;
pub use consistency::{BroadcastFlag, ConsistencyHandle};
pub use controller::{CheckpointController, ControllerState, ResumeOutcome};
pub use local_set::{LocalCheckpointSet, PruneFailure, PruneReport};
pub use quorum::{agree, GlobalAgreement, QuorumSync, RankReport};
pub use snapshot::{BincodeSnapshot, JsonSnapshot, Snapshot};
pub use stats::{CheckpointStats, StatsReport, Timing};
