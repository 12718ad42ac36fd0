//! Checkpoint filename codec
//!
//! Generation files are named `<run>.<rank>.<iteration>`. The names are the
//! only durable index of what exists on disk, so decoding an encoded name
//! must always give back the same triple.

use std::fmt;

use runtime_core::{Error, Iteration, Rank, Result, RunName, FIELD_SEPARATOR};
use serde::{Deserialize, Serialize};

/// One checkpoint instance of one rank
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Generation {
    /// Run the generation belongs to
    pub run_name: RunName,

    /// Rank that wrote it
    pub rank: Rank,

    /// Iteration it captures
    pub iteration: Iteration,
}

impl Generation {
    /// Create a generation identifier
    pub fn new(run_name: impl Into<RunName>, rank: Rank, iteration: Iteration) -> Self {
        Self {
            run_name: run_name.into(),
            rank,
            iteration,
        }
    }

    /// On-disk file name of this generation
    pub fn file_name(&self) -> String {
        encode(&self.run_name, self.rank, self.iteration)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// Encode a generation triple as a file name
pub fn encode(run_name: &str, rank: Rank, iteration: Iteration) -> String {
    format!(
        "{run_name}{sep}{rank}{sep}{iteration}",
        sep = FIELD_SEPARATOR
    )
}

/// Decode a file name belonging to `run_name`
///
/// Returns `Ok(None)` when the name is not one of this run's generations
/// (wrong field count or a different run). A name of this run whose rank or
/// iteration field is not a plain decimal number is an error.
pub fn decode(file_name: &str, run_name: &str) -> Result<Option<Generation>> {
    let fields: Vec<&str> = file_name.split(FIELD_SEPARATOR).collect();
    let [name, rank, iteration] = fields.as_slice() else {
        return Ok(None);
    };
    if *name != run_name {
        return Ok(None);
    }

    let rank = parse_field::<Rank>(file_name, "rank", rank)?;
    let iteration = parse_field::<Iteration>(file_name, "iteration", iteration)?;
    Ok(Some(Generation::new(run_name, rank, iteration)))
}

fn parse_field<T: std::str::FromStr>(file_name: &str, field: &str, raw: &str) -> Result<T> {
    let malformed = |reason: String| Error::MalformedFilename {
        filename: file_name.to_string(),
        reason,
    };

    // `FromStr` for integers accepts a leading '+', which never appears in
    // an encoded name.
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed(format!("{} field {:?} is not a number", field, raw)));
    }
    raw.parse::<T>()
        .map_err(|_| malformed(format!("{} field {:?} is out of range", field, raw)))
}
