//! Cross-rank agreement on which generations survive
//!
//! One round gathers every rank's local iterations at the coordinator,
//! intersects them, keeps the newest `cp_interval` survivors and broadcasts
//! the result back. All ranks must enter the round together.

use std::collections::BTreeSet;

use collective::{Communicator, CommunicatorExt};
use runtime_core::{Error, Iteration, Rank, Result, COORDINATOR_RANK};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::local_set::LocalCheckpointSet;

/// What one rank contributes to an agreement round
///
/// `rank` lets the coordinator check that the transport delivered reports in
/// rank order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankReport {
    pub rank: Rank,
    pub iterations: Vec<Iteration>,
}

/// Iterations every rank holds, newest `cp_interval` only, ascending
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalAgreement {
    pub iterations: Vec<Iteration>,

    /// The newest agreed iteration is also every rank's newest local one
    pub complete: bool,
}

impl GlobalAgreement {
    /// Newest agreed iteration, if any
    pub fn latest(&self) -> Option<Iteration> {
        self.iterations.last().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.iterations.is_empty()
    }
}

/// Compute the agreement from every rank's report
///
/// An iteration survives only if every report contains it. A rank with no
/// generations therefore empties the agreement.
pub fn agree(reports: &[RankReport], cp_interval: usize) -> Result<GlobalAgreement> {
    let Some((first, rest)) = reports.split_first() else {
        return Err(Error::Protocol {
            rank: COORDINATOR_RANK,
            message: "no rank reported its checkpoints".to_string(),
        });
    };

    let mut common: BTreeSet<Iteration> = first.iterations.iter().copied().collect();
    for report in rest {
        let theirs: BTreeSet<Iteration> = report.iterations.iter().copied().collect();
        common.retain(|i| theirs.contains(i));
    }

    let skip = common.len().saturating_sub(cp_interval);
    let iterations: Vec<Iteration> = common.into_iter().skip(skip).collect();

    let complete = match iterations.last() {
        Some(latest) => reports
            .iter()
            .all(|r| r.iterations.iter().max() == Some(latest)),
        None => false,
    };

    Ok(GlobalAgreement {
        iterations,
        complete,
    })
}

/// Runs agreement rounds over a communicator
#[derive(Debug, Clone, Copy)]
pub struct QuorumSync {
    cp_interval: usize,
}

impl QuorumSync {
    pub fn new(cp_interval: usize) -> Self {
        Self { cp_interval }
    }

    /// Execute one agreement round; a collective call
    pub async fn run<C>(&self, comm: &C, local: &LocalCheckpointSet) -> Result<GlobalAgreement>
    where
        C: Communicator + ?Sized,
    {
        let report = RankReport {
            rank: comm.rank(),
            iterations: local.iterations(),
        };
        let gathered = comm.gather(&report, COORDINATOR_RANK).await?;

        let decided = if comm.rank() == COORDINATOR_RANK {
            let reports = gathered.ok_or_else(|| Error::Protocol {
                rank: comm.rank(),
                message: "can't gather checkpoint lists".to_string(),
            })?;
            if reports.len() != comm.size() {
                return Err(Error::Protocol {
                    rank: comm.rank(),
                    message: format!(
                        "gathered {} reports from a communicator of size {}",
                        reports.len(),
                        comm.size()
                    ),
                });
            }
            if let Some((position, report)) = reports
                .iter()
                .enumerate()
                .find(|(position, report)| report.rank as usize != *position)
            {
                return Err(Error::Protocol {
                    rank: comm.rank(),
                    message: format!(
                        "report from rank {} arrived in position {}",
                        report.rank, position
                    ),
                });
            }

            let agreement = agree(&reports, self.cp_interval)?;
            info!(
                ranks = reports.len(),
                agreed = ?agreement.iterations,
                complete = agreement.complete,
                "Computed checkpoint agreement"
            );
            Some(agreement)
        } else {
            None
        };

        let agreement: GlobalAgreement = comm.broadcast(decided.as_ref(), COORDINATOR_RANK).await?;
        debug!(rank = comm.rank(), agreed = ?agreement.iterations, "Received checkpoint agreement");
        Ok(agreement)
    }
}
