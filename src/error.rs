//! Crate error types
//!
//! Everything that can make a publish fail *before* a job is recorded in the
//! registry surfaces here. Failures of an already-running job are not errors
//! in the `Result` sense; they are observed asynchronously as the job's
//! `Failed` state.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for supervisor operations
#[derive(Debug, Error)]
pub enum Error {
    /// The raw publish path contained no usable stream key
    #[error("invalid stream path: {0:?}")]
    InvalidStreamPath(String),

    /// The output directory for a stream could not be created
    #[error("storage unavailable at {path}: {source}")]
    StorageUnavailable {
        /// Directory that could not be created
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The transcoding subprocess could not be spawned
    #[error("failed to launch transcoder: {0}")]
    JobLaunchFailure(#[source] std::io::Error),
}
