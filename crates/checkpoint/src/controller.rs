//! Checkpoint controller orchestrating writes, agreement rounds and recovery
//!
//! One controller lives in each rank. Writes are local; agreement rounds are
//! collectives, so every rank must checkpoint at the same iterations and
//! resume at the same point in its control flow.

use std::path::PathBuf;
use std::sync::Arc;

use collective::Communicator;
use runtime_core::{CheckpointConfig, CheckpointStrategy, Error, Iteration, Rank, Result};
use storage::{LocalStorage, StorageBackend};
use tracing::{debug, info, warn};

use crate::codec::Generation;
use crate::consistency::ConsistencyHandle;
use crate::local_set::{LocalCheckpointSet, PruneReport};
use crate::quorum::{GlobalAgreement, QuorumSync};
use crate::snapshot::Snapshot;
use crate::stats::{CheckpointStats, StatsReport};

/// Lifecycle of a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Constructed; checkpoint directory not prepared yet
    Uninitialized,

    /// Idle, ready for the next operation
    Ready,

    /// Writing a generation
    Checkpointing,

    /// Inside an agreement round
    Syncing,

    /// Discovering and loading the agreed generation
    Resuming,

    /// All tracked generations released; no further checkpoints
    Finalized,
}

/// Result of a resume attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeOutcome {
    /// Iteration that was loaded, `None` for a fresh start
    pub iteration: Option<Iteration>,

    /// Every rank loaded its own newest generation
    pub complete: bool,
}

/// Per-rank driver of the generational checkpoint protocol
pub struct CheckpointController {
    config: CheckpointConfig,
    comm: Arc<dyn Communicator>,
    storage: Arc<dyn StorageBackend>,
    generations: LocalCheckpointSet,
    /// Found on disk at resume but outside the agreement; deleted by the next
    /// pruning round. Never counted in `generations`, whose length triggers
    /// collective rounds and must match across ranks.
    orphans: LocalCheckpointSet,
    stats: CheckpointStats,
    quorum: QuorumSync,
    state: ControllerState,
}

impl CheckpointController {
    /// Create a controller storing generations under `config.base_path`
    pub fn new(config: CheckpointConfig, comm: Arc<dyn Communicator>) -> Result<Self> {
        let storage = Arc::new(LocalStorage::new(&config.base_path));
        Self::with_storage(config, comm, storage)
    }

    /// Create a controller over a custom storage backend
    pub fn with_storage(
        config: CheckpointConfig,
        comm: Arc<dyn Communicator>,
        storage: Arc<dyn StorageBackend>,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            quorum: QuorumSync::new(config.cp_interval),
            config,
            comm,
            storage,
            generations: LocalCheckpointSet::new(),
            orphans: LocalCheckpointSet::new(),
            stats: CheckpointStats::new(),
            state: ControllerState::Uninitialized,
        })
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn config(&self) -> &CheckpointConfig {
        &self.config
    }

    pub fn rank(&self) -> Rank {
        self.comm.rank()
    }

    /// File names of the generations currently tracked, oldest first
    pub fn tracked(&self) -> Vec<String> {
        self.generations.file_names()
    }

    /// Timing summary of completed writes
    pub fn get_stats(&self) -> StatsReport {
        self.stats.report()
    }

    /// Checkpoint if the configured strategy fires at `iteration`
    ///
    /// # Returns
    /// Whether a checkpoint was written
    pub async fn maybe_checkpoint<T>(&mut self, target: &T, iteration: Iteration) -> Result<bool>
    where
        T: Snapshot + ?Sized,
    {
        let due = match self.config.strategy {
            CheckpointStrategy::Steps { interval } => iteration > 0 && iteration % interval == 0,
            CheckpointStrategy::Manual => false,
        };

        if due {
            self.checkpoint(target, iteration).await?;
        }
        Ok(due)
    }

    /// Write the generation for `iteration` and garbage-collect when due
    ///
    /// Once the tracked list exceeds `cp_interval + sync_slack`, an agreement
    /// round with pruning runs; every rank reaches that point at the same
    /// call since they all checkpoint at the same iterations.
    pub async fn checkpoint<T>(&mut self, target: &T, iteration: Iteration) -> Result<()>
    where
        T: Snapshot + ?Sized,
    {
        self.prepare().await?;

        self.state = ControllerState::Checkpointing;
        let result = self.write_generation(target, iteration).await;
        self.state = ControllerState::Ready;
        result?;

        if self.generations.len() > self.config.cp_interval + self.config.sync_slack {
            self.sync_generations(true).await?;
        }
        Ok(())
    }

    async fn write_generation<T>(&mut self, target: &T, iteration: Iteration) -> Result<()>
    where
        T: Snapshot + ?Sized,
    {
        let generation = Generation::new(self.config.run_name.as_str(), self.rank(), iteration);
        let file_name = generation.file_name();

        self.stats.start();
        let size = self
            .storage
            .write_with(&file_name, Box::new(|| target.save()))
            .await
            .map_err(|e| Error::CheckpointWriteFailed {
                message: format!("{}: {}", file_name, e),
            })?;
        self.stats.end();

        info!(
            run = %self.config.run_name,
            rank = generation.rank,
            iteration,
            size_bytes = size,
            "Checkpoint written"
        );
        self.orphans.forget(&generation);
        self.generations.append(generation);
        Ok(())
    }

    /// Run one agreement round and adopt its result
    ///
    /// With `remove_remainder`, tracked generations outside the agreement are
    /// deleted. This is a collective call.
    pub async fn sync_generations(&mut self, remove_remainder: bool) -> Result<GlobalAgreement> {
        self.ensure_not_finalized()?;

        let previous = self.state;
        self.state = ControllerState::Syncing;
        let result = self.quorum.run(self.comm.as_ref(), &self.generations).await;
        self.state = previous;
        let agreement = result?;

        let agreed =
            LocalCheckpointSet::from_agreement(&self.config.run_name, self.rank(), &agreement);
        if remove_remainder {
            let report = self
                .generations
                .prune_except(agreed.generations(), self.storage.as_ref())
                .await;
            log_prune("Pruned unagreed checkpoints", &report);

            if !self.orphans.is_empty() {
                let report = self
                    .orphans
                    .prune_except(agreed.generations(), self.storage.as_ref())
                    .await;
                log_prune("Pruned checkpoints left over from before resume", &report);
                self.orphans = LocalCheckpointSet::new();
            }
        }
        self.generations.replace_all(agreed.generations().to_vec());

        Ok(agreement)
    }

    /// Restore `target` from the newest generation every rank holds
    ///
    /// Lists this rank's files, runs one agreement round without pruning and
    /// loads the newest agreed iteration. When nothing is agreed, `target` is
    /// left untouched and training starts from scratch. A supplied `handle`
    /// learns whether a post-resume state broadcast is still required; it is
    /// not called on a fresh start. This is a collective call.
    pub async fn resume<T>(
        &mut self,
        target: &mut T,
        handle: Option<&mut dyn ConsistencyHandle>,
    ) -> Result<ResumeOutcome>
    where
        T: Snapshot + ?Sized,
    {
        self.prepare().await?;

        self.state = ControllerState::Resuming;
        let result = self.resume_inner(target, handle).await;
        self.state = ControllerState::Ready;
        result
    }

    /// Resume from an explicit directory, which becomes the checkpoint
    /// directory from then on
    pub async fn resume_from<T>(
        &mut self,
        path: impl Into<PathBuf>,
        target: &mut T,
        handle: Option<&mut dyn ConsistencyHandle>,
    ) -> Result<ResumeOutcome>
    where
        T: Snapshot + ?Sized,
    {
        self.ensure_not_finalized()?;

        self.config.base_path = path.into();
        self.storage = Arc::new(LocalStorage::new(&self.config.base_path));
        self.state = ControllerState::Uninitialized;
        self.resume(target, handle).await
    }

    async fn resume_inner<T>(
        &mut self,
        target: &mut T,
        handle: Option<&mut dyn ConsistencyHandle>,
    ) -> Result<ResumeOutcome>
    where
        T: Snapshot + ?Sized,
    {
        let run_name = self.config.run_name.clone();
        let rank = self.rank();

        let discovered =
            LocalCheckpointSet::list_from_disk(self.storage.as_ref(), &run_name, rank).await;
        self.generations = discovered.clone();
        let agreement = self.sync_generations(false).await?;

        let orphans: Vec<Generation> = discovered
            .generations()
            .iter()
            .filter(|g| !self.generations.generations().contains(g))
            .cloned()
            .collect();
        if !orphans.is_empty() {
            debug!(rank, count = orphans.len(), "Unagreed checkpoints await pruning");
        }
        self.orphans.replace_all(orphans);

        let Some(iteration) = agreement.latest() else {
            info!(run = %run_name, rank, "No common checkpoint, starting fresh");
            return Ok(ResumeOutcome {
                iteration: None,
                complete: false,
            });
        };

        // Only the file name is verified by the agreement. If this load fails,
        // deleting the newest generation makes the next resume fall back to
        // the one before it.
        let file_name = Generation::new(run_name.as_str(), rank, iteration).file_name();
        let data = self.storage.read(&file_name).await.map_err(|e| match e {
            Error::StoragePathNotFound { .. } => Error::CheckpointNotFound {
                checkpoint_id: file_name.clone(),
            },
            other => other,
        })?;
        target.load(data)?;

        if let Some(handle) = handle {
            handle.set_needs_broadcast(!agreement.complete);
        }

        info!(
            run = %run_name,
            rank,
            iteration,
            complete = agreement.complete,
            "Resumed from checkpoint"
        );
        Ok(ResumeOutcome {
            iteration: Some(iteration),
            complete: agreement.complete,
        })
    }

    /// Delete every tracked generation and stop accepting checkpoints
    ///
    /// Leftovers from before the last resume go too. Best effort: delete
    /// failures are reported, never returned as errors. Calling it again is a
    /// no-op.
    pub async fn finalize(&mut self) -> PruneReport {
        let mut report = self.generations.remove_all(self.storage.as_ref()).await;
        let leftovers = self.orphans.remove_all(self.storage.as_ref()).await;
        report.removed.extend(leftovers.removed);
        report.failures.extend(leftovers.failures);
        if self.state != ControllerState::Finalized {
            log_prune("Finalized checkpoints", &report);
        }
        self.state = ControllerState::Finalized;
        report
    }

    /// Create the checkpoint directory on first use
    async fn prepare(&mut self) -> Result<()> {
        self.ensure_not_finalized()?;

        if self.state == ControllerState::Uninitialized {
            tokio::fs::create_dir_all(self.storage.root())
                .await
                .map_err(|e| Error::Storage {
                    message: format!(
                        "Failed to create checkpoint directory {:?}: {}",
                        self.storage.root(),
                        e
                    ),
                })?;
            debug!(root = ?self.storage.root(), "Checkpoint directory ready");
            self.state = ControllerState::Ready;
        }
        Ok(())
    }

    fn ensure_not_finalized(&self) -> Result<()> {
        if self.state == ControllerState::Finalized {
            return Err(Error::InvalidState {
                expected: "not finalized".to_string(),
                actual: format!("{:?}", self.state),
            });
        }
        Ok(())
    }
}

fn log_prune(message: &str, report: &PruneReport) {
    if report.is_clean() {
        debug!(removed = report.removed.len(), "{}", message);
    } else {
        warn!(
            removed = report.removed.len(),
            failed = report.failed_count(),
            "{}",
            message
        );
    }
}
