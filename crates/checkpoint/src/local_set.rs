//! Per-rank record of the generations present on local storage

use runtime_core::{Error, Iteration, Rank};
use storage::StorageBackend;
use tracing::{debug, error, info, warn};

use crate::codec::{self, Generation};
use crate::quorum::GlobalAgreement;

/// A delete that failed during best-effort cleanup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneFailure {
    pub file_name: String,
    pub reason: String,
}

/// Outcome of a best-effort cleanup pass
///
/// Individual delete failures never abort the pass; they are collected here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Files that were deleted
    pub removed: Vec<String>,

    /// Files that could not be deleted
    pub failures: Vec<PruneFailure>,
}

impl PruneReport {
    /// Number of deletes that failed
    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    /// True when every requested delete succeeded
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Ordered set of this rank's generations known to exist on disk
///
/// Members are only ever added after their file was atomically written, or
/// when rebuilt from an agreement or a directory listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalCheckpointSet {
    generations: Vec<Generation>,
}

impl LocalCheckpointSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the set an agreement implies for `rank`
    ///
    /// This is a reconstruction, not a filter: the agreed iterations are
    /// trusted to exist locally.
    pub fn from_agreement(run_name: &str, rank: Rank, agreement: &GlobalAgreement) -> Self {
        Self {
            generations: agreement
                .iterations
                .iter()
                .map(|&iteration| Generation::new(run_name, rank, iteration))
                .collect(),
        }
    }

    /// Reconstruct membership from the files in `storage`
    ///
    /// Keeps only names decoding to `run_name` and `rank`. Unrelated and
    /// malformed names are skipped, and an unreadable directory yields an
    /// empty set, as a rank may legitimately have no checkpoint directory yet.
    pub async fn list_from_disk(storage: &dyn StorageBackend, run_name: &str, rank: Rank) -> Self {
        let names = match storage.list().await {
            Ok(names) => names,
            Err(e) => {
                // Every rank restarts from scratch once this rank reports nothing.
                error!(root = ?storage.root(), error = %e, "Cannot list checkpoint directory");
                return Self::new();
            }
        };

        let mut generations: Vec<Generation> = names
            .iter()
            .filter_map(|name| match codec::decode(name, run_name) {
                Ok(generation) => generation,
                Err(e) => {
                    warn!(file = %name, error = %e, "Ignoring malformed checkpoint file");
                    None
                }
            })
            .filter(|generation| generation.rank == rank)
            .collect();
        generations.sort_by_key(|g| g.iteration);

        info!(
            run = %run_name,
            rank,
            count = generations.len(),
            "Discovered local checkpoints"
        );
        Self { generations }
    }

    /// Record a freshly written generation
    ///
    /// Re-writing an already tracked generation does not duplicate it.
    pub fn append(&mut self, generation: Generation) {
        if !self.generations.contains(&generation) {
            self.generations.push(generation);
        }
    }

    /// Drop a member without touching its file
    pub fn forget(&mut self, generation: &Generation) {
        self.generations.retain(|g| g != generation);
    }

    /// Replace the whole membership
    pub fn replace_all(&mut self, generations: Vec<Generation>) {
        self.generations = generations;
    }

    /// Delete the files of every member not in `keep` and drop them
    pub async fn prune_except(
        &mut self,
        keep: &[Generation],
        storage: &dyn StorageBackend,
    ) -> PruneReport {
        let (kept, doomed): (Vec<_>, Vec<_>) = std::mem::take(&mut self.generations)
            .into_iter()
            .partition(|g| keep.contains(g));
        self.generations = kept;

        Self::delete_files(&doomed, storage).await
    }

    /// Delete the files of every member and clear the set
    pub async fn remove_all(&mut self, storage: &dyn StorageBackend) -> PruneReport {
        let doomed = std::mem::take(&mut self.generations);
        Self::delete_files(&doomed, storage).await
    }

    async fn delete_files(doomed: &[Generation], storage: &dyn StorageBackend) -> PruneReport {
        let mut report = PruneReport::default();

        for generation in doomed {
            let file_name = generation.file_name();
            match storage.delete(&file_name).await {
                Ok(()) => {
                    debug!(file = %file_name, "Deleted checkpoint");
                    report.removed.push(file_name);
                }
                Err(e) => {
                    match e {
                        Error::StoragePathNotFound { .. } => {
                            debug!(file = %file_name, "Checkpoint already gone")
                        }
                        _ => warn!(file = %file_name, error = %e, "Failed to delete checkpoint"),
                    }
                    report.failures.push(PruneFailure {
                        file_name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        report
    }

    /// Members in order
    pub fn generations(&self) -> &[Generation] {
        &self.generations
    }

    /// Iterations of the members in order
    pub fn iterations(&self) -> Vec<Iteration> {
        self.generations.iter().map(|g| g.iteration).collect()
    }

    /// File names of the members in order
    pub fn file_names(&self) -> Vec<String> {
        self.generations.iter().map(Generation::file_name).collect()
    }

    pub fn len(&self) -> usize {
        self.generations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }
}
