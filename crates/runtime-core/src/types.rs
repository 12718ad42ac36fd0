//! Core type definitions for the distributed checkpoint runtime

/// Process index within a communicator
pub type Rank = u32;

/// Training iteration counter
pub type Iteration = u64;

/// Identifier of a logical training job, shared by all of its ranks
pub type RunName = String;

/// Rank that coordinates collective agreement rounds
pub const COORDINATOR_RANK: Rank = 0;

/// Separator between the fields of a checkpoint filename
pub const FIELD_SEPARATOR: char = '.';
