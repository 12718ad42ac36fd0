//! Multi-rank checkpoint simulation
//!
//! Runs a toy training loop on several in-process ranks, resuming from any
//! checkpoints a previous invocation left behind.
//!
//! Usage: `cpr-simulate [ranks] [iterations] [config.json]`

use std::sync::Arc;

use checkpoint::{BincodeSnapshot, BroadcastFlag, CheckpointController};
use collective::{Communicator, LocalGroup};
use runtime_core::telemetry::init_tracing;
use runtime_core::{CheckpointConfig, CheckpointStrategy, Iteration};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
struct ToyModel {
    iteration: Iteration,
    weights: Vec<f32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing("checkpoint=info,cpr_simulate=info");

    let mut args = std::env::args().skip(1);
    let ranks: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(4);
    let iterations: Iteration = args.next().and_then(|s| s.parse().ok()).unwrap_or(100);
    let config = match args.next() {
        Some(path) => CheckpointConfig::from_json_file(path)?,
        None => CheckpointConfig::new("simulation")
            .with_strategy(CheckpointStrategy::Steps { interval: 10 }),
    };
    config.validate()?;

    tracing::info!(
        ranks,
        iterations,
        run = %config.run_name,
        base_path = ?config.base_path,
        "Starting checkpoint simulation"
    );

    let handles: Vec<_> = LocalGroup::new_group(ranks)
        .into_iter()
        .map(|comm| {
            let config = config.clone();
            tokio::spawn(async move { run_rank(config, Arc::new(comm), iterations).await })
        })
        .collect();

    for handle in handles {
        handle.await??;
    }

    tracing::info!("Simulation finished");
    Ok(())
}

async fn run_rank(
    config: CheckpointConfig,
    comm: Arc<dyn Communicator>,
    iterations: Iteration,
) -> runtime_core::Result<()> {
    let rank = comm.rank();
    let mut controller = CheckpointController::new(config, comm)?;

    let mut model = BincodeSnapshot(ToyModel {
        iteration: 0,
        weights: vec![0.0; 8],
    });
    let mut flag = BroadcastFlag::new();
    let outcome = controller.resume(&mut model, Some(&mut flag)).await?;
    tracing::info!(
        rank,
        resumed_at = ?outcome.iteration,
        needs_broadcast = flag.needs_broadcast(),
        "Rank ready"
    );

    let start = outcome.iteration.map_or(1, |i| i + 1);
    for iteration in start..=iterations {
        for (i, w) in model.weights.iter_mut().enumerate() {
            *w += (rank as f32 + 1.0) * 0.001 * (i as f32 + 1.0);
        }
        model.iteration = iteration;
        controller.maybe_checkpoint(&model, iteration).await?;
    }

    println!("rank {}: {}", rank, controller.get_stats());
    Ok(())
}
