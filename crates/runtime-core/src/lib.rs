//! Runtime Core - Foundation for distributed generational checkpointing
//!
//! Provides core types, error handling, configuration and tracing setup
//! shared by the storage, collective and checkpoint crates.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod types;

pub use config::{CheckpointConfig, CheckpointStrategy};
pub use error::{Error, Result};
pub use types::*;
