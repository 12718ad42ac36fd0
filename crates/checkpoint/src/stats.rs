//! Checkpoint write timing statistics

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Timing of one completed checkpoint write
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    /// Wall-clock time the write began
    pub started_at: DateTime<Utc>,

    /// How long the write took
    pub duration: Duration,
}

/// Records the duration of every successful checkpoint write
#[derive(Debug, Default)]
pub struct CheckpointStats {
    timings: Vec<Timing>,
    begin: Option<(Instant, DateTime<Utc>)>,
}

impl CheckpointStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the beginning of a write
    pub fn start(&mut self) {
        self.begin = Some((Instant::now(), Utc::now()));
    }

    /// Mark the end of the write started last; ignored without a `start`
    pub fn end(&mut self) {
        if let Some((instant, started_at)) = self.begin.take() {
            self.timings.push(Timing {
                started_at,
                duration: instant.elapsed(),
            });
        }
    }

    /// All recorded timings, oldest first
    pub fn timings(&self) -> &[Timing] {
        &self.timings
    }

    /// Aggregate the recorded timings
    pub fn report(&self) -> StatsReport {
        let count = self.timings.len();
        if count == 0 {
            return StatsReport::Empty;
        }

        let durations = self.timings.iter().map(|t| t.duration);
        let total_nanos: u128 = durations.clone().map(|d| d.as_nanos()).sum();
        let avg_nanos = total_nanos / count as u128;
        StatsReport::Summary {
            count,
            avg: Duration::new(
                u64::try_from(avg_nanos / NANOS_PER_SEC).unwrap_or(u64::MAX),
                (avg_nanos % NANOS_PER_SEC) as u32,
            ),
            min: durations.clone().min().unwrap_or_default(),
            max: durations.max().unwrap_or_default(),
        }
    }
}

/// Aggregate checkpoint write timings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsReport {
    /// No write has completed yet
    Empty,

    /// Min/avg/max over `count` writes
    Summary {
        count: usize,
        avg: Duration,
        min: Duration,
        max: Duration,
    },
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatsReport::Empty => f.write_str("No stats available"),
            StatsReport::Summary { avg, min, max, .. } => write!(
                f,
                "Snapshot duration stats (sec): avg={:.6}, min={:.6}, max={:.6}",
                avg.as_secs_f64(),
                min.as_secs_f64(),
                max.as_secs_f64()
            ),
        }
    }
}
