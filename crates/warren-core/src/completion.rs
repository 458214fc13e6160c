//! Progress watching and exactly-once completion.

use crate::index::Entry;
use crate::{JobHandle, JobManager, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use warren_types::{InfoHash, JobStatus};

impl JobManager {
    /// Applies the default network policy, attaches a progress watcher and
    /// marks the entry `Running`. The caller persists the change.
    pub(crate) fn activate(self: &Arc<Self>, entry: &mut Entry, job: JobHandle) {
        let id = entry.record.info_hash;

        job.add_trackers(&self.settings.trackers);
        job.set_max_connections(self.settings.max_established_conns);
        job.download_all();

        if let Some(token) = entry.ext.open_subscription(&self.shutdown) {
            let changes = job.subscribe();
            self.tracker
                .spawn(Arc::clone(self).watch_progress(id, changes, token));
        }

        entry.job = Some(job);
        entry.sampler.reset();
        entry.record.status = JobStatus::Running;
    }

    /// Samples the job whenever its byte count changes until the
    /// subscription is closed or the job completes.
    async fn watch_progress(
        self: Arc<Self>,
        id: InfoHash,
        mut changes: watch::Receiver<u64>,
        token: CancellationToken,
    ) {
        debug!(info_hash = %id, "progress watcher started");

        loop {
            if self.observe(id).await {
                match self.complete(id).await {
                    Ok(true) => break,
                    Ok(false) => {}
                    Err(e) => {
                        error!(info_hash = %id, error = %e, "failed to record completion");
                        break;
                    }
                }
            }

            tokio::select! {
                biased;
                () = token.cancelled() => break,
                changed = changes.changed() => {
                    if changed.is_err() {
                        debug!(info_hash = %id, "byte count publisher dropped");
                        break;
                    }
                }
            }
        }

        debug!(info_hash = %id, "progress watcher stopped");
    }

    /// Samples a running job. Returns true once every byte is present.
    async fn observe(&self, id: InfoHash) -> bool {
        let Some(entry) = self.index.read().await.get(id) else {
            return false;
        };
        let mut guard = entry.lock().await;
        if guard.removed || guard.record.status != JobStatus::Running {
            return false;
        }
        guard.sample(Instant::now())
    }

    /// Completes a running job whose bytes are all present.
    ///
    /// Verification runs without holding any lock. The status is then
    /// checked and set under the gate and record locks, so concurrent
    /// callers complete the job at most once. Returns true for the caller
    /// that completed it.
    pub(crate) async fn complete(&self, id: InfoHash) -> Result<bool> {
        let job = {
            let Some(entry) = self.index.read().await.get(id) else {
                return Ok(false);
            };
            let guard = entry.lock().await;
            if guard.record.status != JobStatus::Running {
                return Ok(false);
            }
            let Some(job) = guard.job.clone() else {
                return Ok(false);
            };
            let Some(total) = job.total_bytes().or_else(|| guard.record.total_length()) else {
                return Ok(false);
            };
            if job.bytes_completed() < total {
                return Ok(false);
            }
            job
        };

        match job.verify_data().await {
            Ok(true) => {}
            Ok(false) => {
                warn!(info_hash = %id, "data verification mismatch, will retry");
                return Ok(false);
            }
            Err(e) => {
                warn!(info_hash = %id, error = %e, "data verification failed, will retry");
                return Ok(false);
            }
        }

        let _gate = self.gate.write().await;
        if self.ensure_writable().is_err() {
            return Ok(false);
        }
        let index = self.index.read().await;
        let Some(entry) = index.get(id) else {
            return Ok(false);
        };

        let mut guard = entry.lock().await;
        if guard.removed || guard.record.status != JobStatus::Running {
            return Ok(false);
        }
        let previous = guard.record.clone();
        guard.record.mark_completed();
        guard.ext.close_subscription();
        let name = guard.record.name.clone();
        drop(guard);

        if let Err(e) = self.commit(&index).await {
            entry.lock().await.record = previous;
            return Err(e);
        }

        info!(info_hash = %id, name = %name, "job completed");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{Harness, metainfo, wait_for_status};
    use std::sync::Arc;
    use warren_types::{InfoHash, JobStatus};

    async fn running(h: &Harness, name: &str, length: u64) -> InfoHash {
        let id = h
            .manager
            .add_metainfo(metainfo(name, length), None)
            .await
            .unwrap()
            .record()
            .info_hash;
        h.manager.start(id).await.unwrap();
        id
    }

    async fn status(h: &Harness, id: InfoHash) -> JobStatus {
        h.manager.record(id).await.unwrap().status
    }

    #[tokio::test]
    async fn test_progress_drives_completion_once() {
        let h = Harness::new().await;
        let id = running(&h, "once", 1_000).await;

        h.engine().set_progress(id, 400);
        tokio::task::yield_now().await;
        assert_eq!(status(&h, id).await, JobStatus::Running);

        h.engine().set_progress(id, 1_000);
        wait_for_status(&h.manager, id, JobStatus::Completed).await;

        let racers: Vec<_> = (0..4)
            .map(|_| {
                let manager = Arc::clone(&h.manager);
                tokio::spawn(async move { manager.complete(id).await })
            })
            .collect();
        for racer in racers {
            assert!(!racer.await.unwrap().unwrap());
        }

        assert_eq!(h.manager.subscription_closes(id).await, 1);
        let persisted = &h.log.records().await[0];
        assert_eq!(persisted.status, JobStatus::Completed);
        assert!(persisted.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_completion_has_one_winner() {
        let h = Harness::new().await;
        let id = running(&h, "contended", 10).await;
        h.engine().fail_verification(true);
        h.engine().set_progress(id, 10);
        tokio::task::yield_now().await;
        h.engine().fail_verification(false);

        let racers: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&h.manager);
                tokio::spawn(async move { manager.complete(id).await })
            })
            .collect();
        let mut winners = 0;
        for racer in racers {
            if racer.await.unwrap().unwrap() {
                winners += 1;
            }
        }

        assert!(winners <= 1);
        wait_for_status(&h.manager, id, JobStatus::Completed).await;
        assert_eq!(h.manager.subscription_closes(id).await, 1);
    }

    #[tokio::test]
    async fn test_failed_verification_is_retried_by_get_info() {
        let h = Harness::new().await;
        let id = running(&h, "corrupt", 50).await;

        h.engine().fail_verification(true);
        h.engine().set_progress(id, 50);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(status(&h, id).await, JobStatus::Running);

        h.engine().fail_verification(false);
        let info = h.manager.get_info(id).await.unwrap();

        assert_eq!(status(&h, id).await, JobStatus::Completed);
        assert!(info.percentage <= 1.0);
        let done = h.manager.get_info(id).await.unwrap();
        assert!((done.percentage - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_stopped_job_never_completes() {
        let h = Harness::new().await;
        let id = running(&h, "paused", 20).await;
        h.manager.stop(id).await.unwrap();

        h.engine().set_progress(id, 20);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert!(!h.manager.complete(id).await.unwrap());
        assert_eq!(status(&h, id).await, JobStatus::Stopped);
    }

    #[tokio::test]
    async fn test_empty_job_completes_on_start() {
        let h = Harness::new().await;
        let id = running(&h, "empty", 0).await;

        wait_for_status(&h.manager, id, JobStatus::Completed).await;
    }

    #[tokio::test]
    async fn test_completed_job_rejects_transitions() {
        let h = Harness::new().await;
        let id = running(&h, "final", 1).await;
        h.engine().set_progress(id, 1);
        wait_for_status(&h.manager, id, JobStatus::Completed).await;

        assert!(h.manager.start(id).await.is_err());
        assert!(h.manager.stop(id).await.is_err());
    }
}
