// error.rs

use std::io;
use thiserror::Error;

/// Every way a simulation run can fail. None of these are retried: the
/// transform is single-pass, so any error terminates the run.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Bad user input detected before (or independent of) the record stream.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The record stream contradicts what was established at its start.
    #[error("stream consistency error: {0}")]
    StreamConsistency(String),
    #[error("input contains no variant records")]
    EmptyInput,
    #[error("genotype decode error: {0}")]
    Decode(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A broken internal invariant. Indicates a defect, not bad input.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl SimulationError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn stream_consistency(message: impl Into<String>) -> Self {
        Self::StreamConsistency(message.into())
    }
}

pub type Result<T, E = SimulationError> = std::result::Result<T, E>;
