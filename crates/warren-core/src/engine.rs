//! The transfer engine contract.

use crate::Settings;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use warren_store::{JobLog, StoreError};
use warren_types::{Descriptor, InfoHash, Metainfo};

/// Errors reported by a transfer engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The engine refused to admit the job.
    #[error("Engine rejected job {id}: {reason}")]
    Rejected {
        /// Identifier of the rejected job.
        id: InfoHash,
        /// Reason given by the engine.
        reason: String,
    },

    /// Metadata could not be obtained.
    #[error("Failed to obtain metadata for {0}")]
    Metadata(InfoHash),

    /// Data verification could not run.
    #[error("Failed to verify data for {id}: {reason}")]
    Verify {
        /// Identifier of the job.
        id: InfoHash,
        /// Reason given by the engine.
        reason: String,
    },

    /// The engine has been closed.
    #[error("Transfer engine is closed")]
    Closed,
}

/// A job admitted to the transfer engine.
#[async_trait]
pub trait TransferJob: Send + Sync + fmt::Debug {
    /// Returns the job identifier.
    fn info_hash(&self) -> InfoHash;

    /// Returns the number of verified bytes on disk.
    fn bytes_completed(&self) -> u64;

    /// Returns the content size, or `None` while metadata is unknown.
    fn total_bytes(&self) -> Option<u64>;

    /// Waits until the engine has obtained the job's metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if metadata can never arrive, for instance because
    /// the engine closed.
    async fn await_metadata(&self) -> Result<Metainfo, EngineError>;

    /// Re-checks the data on disk against the piece hashes.
    ///
    /// Returns `Ok(false)` on a mismatch.
    ///
    /// # Errors
    ///
    /// Returns an error if verification could not run.
    async fn verify_data(&self) -> Result<bool, EngineError>;

    /// Subscribes to byte count changes.
    fn subscribe(&self) -> watch::Receiver<u64>;

    /// Caps established peer connections. Zero throttles the job to a halt.
    fn set_max_connections(&self, max: usize);

    /// Adds trackers to the job.
    fn add_trackers(&self, trackers: &[String]);

    /// Requests every piece of the content.
    fn download_all(&self);
}

/// Shared handle to an admitted job.
pub type JobHandle = Arc<dyn TransferJob>;

/// The peer-to-peer transfer engine.
#[async_trait]
pub trait TransferEngine: Send + Sync + fmt::Debug {
    /// Admits a job whose metadata is known. Admitting an identifier that
    /// is already present returns the existing job.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the job.
    async fn admit(&self, metainfo: &Metainfo, storage: &Path) -> Result<JobHandle, EngineError>;

    /// Admits a job from a lazy descriptor. Metadata arrives later through
    /// [`TransferJob::await_metadata`].
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the descriptor.
    async fn admit_lazy(
        &self,
        descriptor: &Descriptor,
        storage: &Path,
    ) -> Result<JobHandle, EngineError>;

    /// Returns the admitted job with the given identifier.
    fn lookup(&self, id: InfoHash) -> Option<JobHandle>;

    /// Drops a job from the engine. Unknown identifiers are ignored.
    async fn abandon(&self, id: InfoHash);

    /// Releases the engine and every job it holds.
    async fn close(&self);
}

/// Opens the collaborators a [`JobManager`](crate::JobManager) runs on.
///
/// A restart opens a fresh engine and log for the new settings.
#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    /// Opens a transfer engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot start.
    async fn open_engine(
        &self,
        settings: &Settings,
    ) -> Result<Arc<dyn TransferEngine>, EngineError>;

    /// Opens the job log.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be opened.
    async fn open_log(&self, settings: &Settings) -> Result<Arc<dyn JobLog>, StoreError>;
}
