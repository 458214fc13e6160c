//! In-memory job log.

use crate::{JobLog, Result, StoreError};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;
use warren_types::JobRecord;

#[derive(Debug, Default)]
struct Shared {
    records: Mutex<Vec<JobRecord>>,
    saves: AtomicUsize,
    closed: AtomicBool,
    fail_saves: AtomicBool,
}

/// Job log kept in memory.
///
/// Clones share the same records, so a log can be closed and reopened
/// across a manager restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryJobLog {
    shared: Arc<Shared>,
}

impl MemoryJobLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log pre-populated with `records`.
    #[must_use]
    pub fn with_records(records: Vec<JobRecord>) -> Self {
        Self {
            shared: Arc::new(Shared {
                records: Mutex::new(records),
                ..Shared::default()
            }),
        }
    }

    /// Returns a copy of the persisted records.
    pub async fn records(&self) -> Vec<JobRecord> {
        self.shared.records.lock().await.clone()
    }

    /// Returns the number of successful saves.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.shared.saves.load(Ordering::Acquire)
    }

    /// Makes every subsequent save fail while `fail` is set.
    pub fn fail_saves(&self, fail: bool) {
        self.shared.fail_saves.store(fail, Ordering::Release);
    }

    /// Returns a handle on the same records with the closed flag cleared.
    #[must_use]
    pub fn reopen(&self) -> Self {
        self.shared.closed.store(false, Ordering::Release);
        self.clone()
    }
}

#[async_trait]
impl JobLog for MemoryJobLog {
    async fn load_all(&self) -> Result<Vec<JobRecord>> {
        Ok(self.records().await)
    }

    async fn save_all(&self, records: &[JobRecord]) -> Result<()> {
        let mut stored = self.shared.records.lock().await;
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        if self.shared.fail_saves.load(Ordering::Acquire) {
            return Err(StoreError::WriteFile {
                path: "memory".into(),
                source: std::io::Error::other("injected save failure"),
            });
        }

        *stored = records.to_vec();
        self.shared.saves.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn close(&self) {
        let _stored = self.shared.records.lock().await;
        self.shared.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warren_types::Metainfo;

    fn record(name: &str) -> JobRecord {
        JobRecord::from_metainfo(Metainfo::single_file(name, 8).unwrap(), "/data")
    }

    #[tokio::test]
    async fn test_clones_share_records() {
        let log = MemoryJobLog::new();
        let other = log.clone();

        log.save_all(&[record("a")]).await.unwrap();

        assert_eq!(other.load_all().await.unwrap().len(), 1);
        assert_eq!(other.save_count(), 1);
    }

    #[tokio::test]
    async fn test_with_records() {
        let log = MemoryJobLog::with_records(vec![record("a"), record("b")]);
        assert_eq!(log.load_all().await.unwrap().len(), 2);
        assert_eq!(log.save_count(), 0);
    }

    #[tokio::test]
    async fn test_close_and_reopen() {
        let log = MemoryJobLog::new();
        log.close().await;
        assert!(matches!(log.save_all(&[]).await, Err(StoreError::Closed)));

        let reopened = log.reopen();
        reopened.save_all(&[record("a")]).await.unwrap();
        assert_eq!(log.records().await.len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure_keeps_previous_set() {
        let log = MemoryJobLog::new();
        log.save_all(&[record("a")]).await.unwrap();

        log.fail_saves(true);
        assert!(log.save_all(&[]).await.is_err());
        assert_eq!(log.records().await.len(), 1);
    }
}
