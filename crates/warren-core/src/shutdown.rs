//! Shutdown and restart.

use crate::manager::remove_path;
use crate::{JobManager, Result, Settings};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};
use warren_types::JobStatus;

impl JobManager {
    /// Quiesces every job, persists the final record set and releases the
    /// engine and the log.
    ///
    /// In-flight resolutions are canceled and their placeholders dropped.
    /// Running jobs are throttled engine-side but keep `Running` as their
    /// persisted status, so the next launch resumes them. Calling this more
    /// than once is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the final save fails. The engine and log are
    /// released regardless.
    pub async fn cleanup(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("shutting down job manager");

        let entries = self.index.read().await.entries();
        for (id, entry) in &entries {
            let resolution = entry.lock().await.ext.resolution.take();
            if let Some(resolution) = resolution {
                let outcome = resolution.cancel_and_wait().await;
                debug!(info_hash = %id, ?outcome, "resolution settled before shutdown");
            }
        }

        let result = {
            let _gate = self.gate.write().await;
            let mut index = self.index.write().await;

            let mut transient = Vec::new();
            for (id, entry) in index.entries() {
                let mut guard = entry.lock().await;
                match guard.record.status {
                    JobStatus::Analysing => {
                        guard.removed = true;
                        transient.push(id);
                        drop(guard);
                        self.engine.abandon(id).await;
                    }
                    JobStatus::Running => {
                        if let Some(job) = &guard.job {
                            job.set_max_connections(0);
                        }
                        guard.ext.close_subscription();
                    }
                    JobStatus::Queued | JobStatus::Stopped | JobStatus::Completed => {
                        guard.ext.close_subscription();
                    }
                }
            }
            for id in &transient {
                index.remove(*id);
            }
            debug!(dropped = transient.len(), "unresolved jobs dropped");

            self.commit(&index).await
        };

        self.release().await;
        info!("job manager shut down");
        result
    }

    /// Moves every unfinished job to the storage directory of `settings`,
    /// shuts down and launches a fresh manager with the new settings.
    ///
    /// Jobs stored elsewhere are dropped from the engine, their data is
    /// deleted and their storage path is rewritten before the new manager
    /// re-admits them.
    ///
    /// # Errors
    ///
    /// Returns an error if this manager is closed, if persisting the
    /// relocated records or shutting down fails, or if the new manager
    /// cannot be launched.
    pub async fn restart(self: &Arc<Self>, settings: Settings) -> Result<Arc<Self>> {
        self.ensure_writable()?;

        let relocated = self.relocate(&settings.data_dir).await?;
        info!(relocated, data_dir = %settings.data_dir.display(), "restarting job manager");

        self.cleanup().await?;
        Self::launch(Arc::clone(&self.backend), settings).await
    }

    async fn relocate(&self, target: &Path) -> Result<usize> {
        let _gate = self.gate.write().await;
        let index = self.index.read().await;

        let mut relocated = 0;
        for (id, entry) in index.entries() {
            let mut guard = entry.lock().await;
            let status = guard.record.status;
            if status.is_finished() || !status.is_persistable() || guard.record.is_stored_in(target)
            {
                continue;
            }

            guard.ext.close_subscription();
            guard.job = None;
            self.engine.abandon(id).await;

            match guard.record.data_path() {
                Some(path) => match remove_path(&path).await {
                    Ok(true) => {
                        debug!(info_hash = %id, path = %path.display(), "old job data removed");
                    }
                    Ok(false) => {}
                    Err(e) => warn!(info_hash = %id, error = %e, "failed to remove old job data"),
                },
                None => warn!(info_hash = %id, "job name is not a plain file name, leaving old data"),
            }

            guard.record.storage_path = target.to_path_buf();
            guard.sampler.reset();
            relocated += 1;
        }

        if relocated > 0 {
            self.commit(&index).await?;
        }
        Ok(relocated)
    }

    /// Stops background tasks and closes the engine and the log.
    pub(crate) async fn release(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        self.engine.close().await;
        self.log.close().await;
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{Harness, metainfo, settings};
    use crate::{Error, JobManager};
    use std::sync::Arc;
    use warren_types::{InfoHash, JobStatus};

    async fn add(manager: &Arc<JobManager>, name: &str) -> InfoHash {
        manager
            .add_metainfo(metainfo(name, 8), None)
            .await
            .unwrap()
            .record()
            .info_hash
    }

    #[tokio::test]
    async fn test_cleanup_persists_running_and_drops_analysing() {
        let h = Harness::new().await;
        let running = add(&h.manager, "running").await;
        h.manager.start(running).await.unwrap();
        let pending = metainfo("pending", 1).info_hash;
        h.manager.add_descriptor(&pending.to_hex(), None).await.unwrap();
        let engine = h.engine();

        h.manager.cleanup().await.unwrap();

        let persisted = h.log.records().await;
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].info_hash, running);
        assert_eq!(persisted[0].status, JobStatus::Running);
        assert!(h.manager.record(pending).await.is_none());
        assert!(engine.is_closed());
        assert!(h.manager.is_closed());
        assert!(!h.manager.has_live_subscription(running).await);
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent_and_closes_writes() {
        let h = Harness::new().await;

        h.manager.cleanup().await.unwrap();
        h.manager.cleanup().await.unwrap();

        assert!(matches!(
            h.manager.add_metainfo(metainfo("late", 1), None).await,
            Err(Error::Closed)
        ));
        assert!(matches!(
            h.manager.restart(h.manager.settings().clone()).await,
            Err(Error::Closed)
        ));
    }

    #[tokio::test]
    async fn test_restart_relocates_unfinished_jobs() {
        let h = Harness::new().await;
        let old_dir = h.manager.settings().data_dir.clone();
        let mut ids = Vec::new();
        for name in ["first", "second"] {
            let id = add(&h.manager, name).await;
            h.manager.start(id).await.unwrap();
            h.manager.stop(id).await.unwrap();
            std::fs::write(old_dir.join(name), b"partial").unwrap();
            ids.push(id);
        }

        let target = tempfile::tempdir().unwrap();
        let moved = settings(&h.dir).with_data_dir(target.path());
        let restarted = h.manager.restart(moved).await.unwrap();

        assert!(h.manager.is_closed());
        assert_eq!(h.backend.engines_opened(), 2);
        for (id, name) in ids.iter().zip(["first", "second"]) {
            assert!(!old_dir.join(name).exists());
            let record = restarted.record(*id).await.unwrap();
            assert_eq!(record.storage_path, target.path());
            assert_eq!(record.status, JobStatus::Running);
            let job = h.engine().job(*id).unwrap();
            assert_eq!(job.storage(), target.path());
        }
        for record in h.log.records().await {
            assert_eq!(record.storage_path, target.path());
        }

        restarted.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn test_restart_leaves_completed_jobs_in_place() {
        let h = Harness::new().await;
        let old_dir = h.manager.settings().data_dir.clone();
        let id = add(&h.manager, "finished").await;
        h.manager.start(id).await.unwrap();
        h.engine().set_progress(id, 8);
        crate::testing::wait_for_status(&h.manager, id, JobStatus::Completed).await;
        std::fs::write(old_dir.join("finished"), b"complete").unwrap();

        let target = tempfile::tempdir().unwrap();
        let restarted = h
            .manager
            .restart(settings(&h.dir).with_data_dir(target.path()))
            .await
            .unwrap();

        assert!(old_dir.join("finished").exists());
        let record = restarted.record(id).await.unwrap();
        assert_eq!(record.storage_path, old_dir);
        assert_eq!(record.status, JobStatus::Completed);
    }
}
