//! The persistence contract.

use crate::Result;
use async_trait::async_trait;
use warren_types::JobRecord;

/// A durable store holding the full set of persisted job records.
///
/// Callers never persist partial state: every save replaces the whole set.
#[async_trait]
pub trait JobLog: Send + Sync + std::fmt::Debug {
    /// Loads every persisted record.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read or decoded.
    async fn load_all(&self) -> Result<Vec<JobRecord>>;

    /// Atomically replaces the persisted record set.
    ///
    /// # Errors
    ///
    /// Returns an error if the log is closed or cannot be written. On error
    /// the previously persisted set is left intact.
    async fn save_all(&self, records: &[JobRecord]) -> Result<()>;

    /// Releases the log. Later saves fail with [`StoreError::Closed`](crate::StoreError::Closed).
    async fn close(&self);
}
