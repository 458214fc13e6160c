//! Persistence errors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or saving the job log.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to create a directory.
    #[error("Failed to create directory '{path}': {source}")]
    CreateDir {
        /// The path that could not be created.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to read the log.
    #[error("Failed to read job log '{path}': {source}")]
    ReadFile {
        /// The path that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to write the log.
    #[error("Failed to write job log '{path}': {source}")]
    WriteFile {
        /// The path that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the log.
    #[error("Failed to parse job log '{path}': {source}")]
    ParseJson {
        /// The path that could not be parsed.
        path: PathBuf,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// Failed to serialize records.
    #[error("Failed to serialize job records: {0}")]
    SerializeJson(#[from] serde_json::Error),

    /// The log was written by a newer format.
    #[error("Unsupported job log version {found} in '{path}'")]
    UnsupportedVersion {
        /// The path of the log.
        path: PathBuf,
        /// The version found in the document.
        found: u32,
    },

    /// The log has been closed.
    #[error("Job log is closed")]
    Closed,
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
