//! Multi-rank checkpoint, agreement and resume scenarios over an in-process
//! communicator group sharing one checkpoint directory.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use checkpoint::{
    BincodeSnapshot, BroadcastFlag, CheckpointController, ConsistencyHandle, ResumeOutcome,
    Snapshot,
};
use collective::{Communicator, LocalGroup};
use runtime_core::{CheckpointConfig, Error, Iteration, Rank};
use storage::TEMP_PREFIX;
use tempfile::TempDir;

type Weights = BincodeSnapshot<u64>;

fn job_config(dir: &Path, cp_interval: usize, sync_slack: usize) -> CheckpointConfig {
    CheckpointConfig::new("job")
        .with_base_path(dir)
        .with_cp_interval(cp_interval)
        .with_sync_slack(sync_slack)
}

fn group(config: &CheckpointConfig, size: usize) -> Result<Vec<CheckpointController>> {
    LocalGroup::new_group(size)
        .into_iter()
        .map(|comm| {
            let comm: Arc<dyn Communicator> = Arc::new(comm);
            Ok(CheckpointController::new(config.clone(), comm)?)
        })
        .collect()
}

/// Run `f` on every rank concurrently, results in rank order
async fn on_every_rank<F, Fut, R>(controllers: Vec<CheckpointController>, f: F) -> Result<Vec<R>>
where
    F: Fn(CheckpointController) -> Fut,
    Fut: Future<Output = runtime_core::Result<R>> + Send + 'static,
    R: Send + 'static,
{
    let handles: Vec<_> = controllers.into_iter().map(|c| tokio::spawn(f(c))).collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await??);
    }
    Ok(results)
}

/// Deterministic per-rank state so loads can be checked
fn state_for(rank: Rank, iteration: Iteration) -> Weights {
    BincodeSnapshot(u64::from(rank) * 1000 + iteration)
}

fn files_of_rank(dir: &Path, rank: Rank) -> Result<Vec<String>> {
    let prefix = format!("job.{}.", rank);
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let name = entry?.file_name().to_string_lossy().to_string();
        if name.starts_with(&prefix) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Handle that records every verdict it receives
#[derive(Debug, Default)]
struct RecordingHandle {
    verdicts: Vec<bool>,
}

impl ConsistencyHandle for RecordingHandle {
    fn set_needs_broadcast(&mut self, needed: bool) {
        self.verdicts.push(needed);
    }
}

async fn write_iterations(
    controllers: Vec<CheckpointController>,
    iterations: std::ops::RangeInclusive<Iteration>,
) -> Result<Vec<CheckpointController>> {
    on_every_rank(controllers, move |mut c| {
        let iterations = iterations.clone();
        async move {
            for iteration in iterations {
                c.checkpoint(&state_for(c.rank(), iteration), iteration).await?;
            }
            Ok(c)
        }
    })
    .await
}

async fn resume_all(
    controllers: Vec<CheckpointController>,
) -> Result<Vec<(ResumeOutcome, Weights, Vec<bool>)>> {
    on_every_rank(controllers, |mut c| async move {
        let mut state = BincodeSnapshot(u64::MAX);
        let mut handle = RecordingHandle::default();
        let outcome = c.resume(&mut state, Some(&mut handle)).await?;
        Ok((outcome, state, handle.verdicts))
    })
    .await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_complete_resume_skips_broadcast() -> Result<()> {
    let dir = TempDir::new()?;
    let config = job_config(dir.path(), 5, 5);

    write_iterations(group(&config, 3)?, 1..=5).await?;

    let resumed = resume_all(group(&config, 3)?).await?;
    for (rank, (outcome, state, verdicts)) in resumed.into_iter().enumerate() {
        assert_eq!(outcome.iteration, Some(5));
        assert!(outcome.complete);
        assert_eq!(state, state_for(rank as Rank, 5));
        assert_eq!(verdicts, vec![false]);
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_partial_progress_falls_back_to_common_generation() -> Result<()> {
    let dir = TempDir::new()?;
    let config = job_config(dir.path(), 5, 5);

    let mut controllers = write_iterations(group(&config, 3)?, 1..=5).await?;

    // Rank 0 gets one iteration further before the job dies.
    controllers[0].checkpoint(&state_for(0, 6), 6).await?;
    drop(controllers);

    let resumed = resume_all(group(&config, 3)?).await?;
    for (rank, (outcome, state, verdicts)) in resumed.into_iter().enumerate() {
        assert_eq!(outcome.iteration, Some(5));
        assert!(!outcome.complete);
        assert_eq!(state, state_for(rank as Rank, 5));
        assert_eq!(verdicts, vec![true]);
    }

    // Recovery does not delete the orphaned generation.
    assert!(dir.path().join("job.0.6").exists());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_missing_rank_data_starts_fresh() -> Result<()> {
    let dir = TempDir::new()?;
    let config = job_config(dir.path(), 5, 5);

    write_iterations(group(&config, 3)?, 1..=4).await?;
    for name in files_of_rank(dir.path(), 1)? {
        std::fs::remove_file(dir.path().join(name))?;
    }

    let resumed = resume_all(group(&config, 3)?).await?;
    for (outcome, state, verdicts) in resumed {
        assert_eq!(outcome.iteration, None);
        assert_eq!(*state, u64::MAX);
        assert!(verdicts.is_empty());
    }

    // Surviving ranks keep their files; nothing agreed means nothing pruned.
    assert_eq!(files_of_rank(dir.path(), 0)?.len(), 4);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_garbage_collection_preserves_newest_agreed() -> Result<()> {
    let dir = TempDir::new()?;
    let config = job_config(dir.path(), 3, 2);
    let ranks = 2;

    let bounds = on_every_rank(group(&config, ranks)?, |mut c| async move {
        let mut max_tracked = 0;
        for iteration in 1..=40 {
            c.checkpoint(&state_for(c.rank(), iteration), iteration).await?;
            max_tracked = max_tracked.max(c.tracked().len());
        }
        Ok(max_tracked)
    })
    .await?;
    for max_tracked in bounds {
        assert!(max_tracked <= 3 + 2);
    }

    for rank in 0..ranks as Rank {
        let files = files_of_rank(dir.path(), rank)?;
        assert!(files.len() <= 3 + 2, "rank {rank} kept {files:?}");
        for iteration in [38, 39, 40] {
            assert!(files.contains(&format!("job.{rank}.{iteration}")));
        }
    }

    let resumed = resume_all(group(&config, ranks)?).await?;
    for (rank, (outcome, state, _)) in resumed.into_iter().enumerate() {
        assert_eq!(outcome.iteration, Some(40));
        assert_eq!(state, state_for(rank as Rank, 40));
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_resumed_job_keeps_checkpointing() -> Result<()> {
    let dir = TempDir::new()?;
    let config = job_config(dir.path(), 2, 1);

    write_iterations(group(&config, 2)?, 1..=3).await?;

    let continued = on_every_rank(group(&config, 2)?, |mut c| async move {
        let mut state = Weights::default();
        let outcome = c.resume(&mut state, None).await?;
        let start = outcome.iteration.map_or(1, |i| i + 1);
        for iteration in start..=6 {
            c.checkpoint(&state_for(c.rank(), iteration), iteration).await?;
        }
        Ok(c.tracked())
    })
    .await?;

    // Resume tracks [2, 3]; the pruning round at 5 keeps [4, 5].
    assert_eq!(continued[0], vec!["job.0.4", "job.0.5", "job.0.6"]);
    assert_eq!(continued[1], vec!["job.1.4", "job.1.5", "job.1.6"]);

    // Generation 1 lay outside the resume window and goes with that round too.
    assert_eq!(files_of_rank(dir.path(), 0)?, vec!["job.0.4", "job.0.5", "job.0.6"]);
    assert_eq!(files_of_rank(dir.path(), 1)?, vec!["job.1.4", "job.1.5", "job.1.6"]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_long_run_after_resume_leaves_nothing_after_finalize() -> Result<()> {
    let dir = TempDir::new()?;
    let config = job_config(dir.path(), 2, 1);

    write_iterations(group(&config, 2)?, 1..=3).await?;

    let reports = on_every_rank(group(&config, 2)?, |mut c| async move {
        c.resume(&mut Weights::default(), None).await?;
        for iteration in 4..=200 {
            c.checkpoint(&state_for(c.rank(), iteration), iteration).await?;
        }
        Ok(c.finalize().await)
    })
    .await?;

    for report in reports {
        assert!(report.is_clean());
    }
    assert!(files_of_rank(dir.path(), 0)?.is_empty());
    assert!(files_of_rank(dir.path(), 1)?.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_finalize_removes_everything_once() -> Result<()> {
    let dir = TempDir::new()?;
    let config = job_config(dir.path(), 5, 5);

    let controllers = write_iterations(group(&config, 2)?, 1..=3).await?;
    let reports = on_every_rank(controllers, |mut c| async move {
        let first = c.finalize().await;
        let second = c.finalize().await;
        Ok((first, second))
    })
    .await?;

    for (first, second) in reports {
        assert_eq!(first.removed.len(), 3);
        assert!(first.is_clean());
        assert!(second.removed.is_empty());
    }
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
    Ok(())
}

/// Snapshot that fails to serialize on a chosen iteration
struct FlakySnapshot {
    value: u64,
    fail: bool,
}

impl Snapshot for FlakySnapshot {
    fn save(&self) -> runtime_core::Result<Bytes> {
        if self.fail {
            return Err(Error::Serialization("device lost".to_string()));
        }
        BincodeSnapshot(self.value).save()
    }

    fn load(&mut self, data: Bytes) -> runtime_core::Result<()> {
        let mut inner = BincodeSnapshot(0u64);
        inner.load(data)?;
        self.value = inner.0;
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_write_is_invisible_to_recovery() -> Result<()> {
    let dir = TempDir::new()?;
    let config = job_config(dir.path(), 5, 5);

    let results = on_every_rank(group(&config, 2)?, |mut c| async move {
        let rank = c.rank();
        for iteration in 1..=3 {
            let snapshot = FlakySnapshot {
                value: *state_for(rank, iteration),
                fail: rank == 1 && iteration == 3,
            };
            if let Err(e) = c.checkpoint(&snapshot, iteration).await {
                return Ok((c.tracked(), Some(e)));
            }
        }
        Ok((c.tracked(), None))
    })
    .await?;

    assert_eq!(results[0].0, vec!["job.0.1", "job.0.2", "job.0.3"]);
    assert!(results[0].1.is_none());
    assert_eq!(results[1].0, vec!["job.1.1", "job.1.2"]);
    assert!(matches!(
        results[1].1,
        Some(Error::CheckpointWriteFailed { .. })
    ));

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(TEMP_PREFIX))
        .collect();
    assert!(leftovers.is_empty());
    assert!(!dir.path().join("job.1.3").exists());

    let resumed = on_every_rank(group(&config, 2)?, |mut c| async move {
        let mut state = FlakySnapshot {
            value: 0,
            fail: false,
        };
        let mut flag = BroadcastFlag::new();
        let outcome = c.resume(&mut state, Some(&mut flag)).await?;
        Ok((outcome, state.value, flag.needs_broadcast()))
    })
    .await?;

    for (rank, (outcome, value, needs_broadcast)) in resumed.into_iter().enumerate() {
        assert_eq!(outcome.iteration, Some(2));
        assert_eq!(value, *state_for(rank as Rank, 2));
        assert!(needs_broadcast);
    }
    Ok(())
}
