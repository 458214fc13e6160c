//! Fixtures shared by the manager tests.

use crate::sim::{SimConfig, SimulatedBackend, SimulatedEngine};
use crate::{JobManager, Settings};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use warren_store::MemoryJobLog;
use warren_types::{InfoHash, JobStatus, Metainfo};

pub(crate) const DEFAULT_TRACKER: &str = "udp://tracker.test:6969/announce";

pub(crate) struct Harness {
    pub(crate) dir: TempDir,
    pub(crate) backend: Arc<SimulatedBackend>,
    pub(crate) log: MemoryJobLog,
    pub(crate) manager: Arc<JobManager>,
}

impl Harness {
    pub(crate) async fn new() -> Self {
        Self::with_log(MemoryJobLog::new()).await
    }

    pub(crate) async fn with_log(log: MemoryJobLog) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(SimulatedBackend::with_memory_log(
            SimConfig::default(),
            log.clone(),
        ));
        let manager = JobManager::launch(backend.clone(), settings(&dir))
            .await
            .unwrap();
        Self {
            dir,
            backend,
            log,
            manager,
        }
    }

    pub(crate) fn engine(&self) -> SimulatedEngine {
        self.backend.engine().unwrap()
    }
}

pub(crate) fn settings(dir: &TempDir) -> Settings {
    Settings::rooted_at(dir.path()).with_trackers(vec![DEFAULT_TRACKER.to_string()])
}

pub(crate) fn metainfo(name: &str, length: u64) -> Metainfo {
    Metainfo::single_file(name, length).unwrap()
}

/// Polls `check` until it holds, failing the test after five seconds.
pub(crate) async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub(crate) async fn wait_for_status(manager: &JobManager, id: InfoHash, status: JobStatus) {
    eventually(move || async move {
        manager
            .record(id)
            .await
            .is_some_and(|record| record.status == status)
    })
    .await;
}
