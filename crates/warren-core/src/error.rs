//! Error types for job coordination.

use crate::EngineError;
use std::path::PathBuf;
use thiserror::Error;
use warren_store::StoreError;
use warren_types::{DescriptorError, InfoHash, JobStatus, MetainfoError};

/// Errors returned by [`JobManager`](crate::JobManager) operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The descriptor could not be parsed.
    #[error(transparent)]
    InvalidDescriptor(#[from] DescriptorError),

    /// The `.torrent` metadata could not be decoded.
    #[error(transparent)]
    Metainfo(#[from] MetainfoError),

    /// No job with this identifier exists.
    #[error("Job not found: {0}")]
    UnknownJob(InfoHash),

    /// The requested transition is not allowed from the job's status.
    #[error("Cannot move job {id} from {from} to {to}")]
    InvalidTransition {
        /// The job identifier.
        id: InfoHash,
        /// Current status.
        from: JobStatus,
        /// Requested status.
        to: JobStatus,
    },

    /// The transfer engine failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Persisting the record set failed.
    #[error("Failed to persist job records: {0}")]
    Store(#[from] StoreError),

    /// Failed to create a directory.
    #[error("Failed to create directory '{path}': {source}")]
    CreateDir {
        /// The path that could not be created.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to read a file.
    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        /// The path that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to delete job data.
    #[error("Failed to delete '{path}': {source}")]
    RemoveData {
        /// The path that could not be deleted.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// An earlier save failed, so in-memory state may be ahead of the log.
    #[error("Job log is out of sync after a failed save, refusing further changes")]
    Diverged,

    /// The manager has been shut down.
    #[error("Job manager is closed")]
    Closed,
}

/// Result type for coordination operations.
pub type Result<T> = std::result::Result<T, Error>;
