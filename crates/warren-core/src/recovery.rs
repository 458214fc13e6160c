//! Startup recovery of persisted jobs.

use crate::index::{RecordIndex, SharedEntry};
use crate::{EngineError, JobHandle, JobManager, Result};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use warren_types::JobStatus;

impl JobManager {
    /// Rebuilds the index from the log and re-admits every unfinished job
    /// concurrently. All re-admissions are joined before returning. A job
    /// that cannot be re-admitted is logged and left `Stopped`.
    pub(crate) async fn recover(self: &Arc<Self>) -> Result<()> {
        let records = self.log.load_all().await?;
        let loaded = records.len();

        let _gate = self.gate.write().await;
        let mut index = self.index.write().await;
        *index = RecordIndex::from_records(
            records
                .into_iter()
                .filter(|record| record.status.is_persistable()),
        );

        let mut tasks = JoinSet::new();
        for (id, entry) in index.entries() {
            if entry.lock().await.record.status.is_finished() {
                continue;
            }
            let manager = Arc::clone(self);
            tasks.spawn(async move { (id, manager.readmit(&entry).await) });
        }

        let (mut recovered, mut failed) = (0usize, 0usize);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => recovered += 1,
                Ok((id, Err(e))) => {
                    failed += 1;
                    warn!(info_hash = %id, error = %e, "failed to recover job, leaving it stopped");
                }
                Err(e) => {
                    failed += 1;
                    error!(error = %e, "recovery task panicked");
                }
            }
        }

        self.commit(&index).await?;
        info!(loaded, recovered, failed, "recovery finished");
        Ok(())
    }

    async fn readmit(self: &Arc<Self>, entry: &SharedEntry) -> Result<()> {
        let mut guard = entry.lock().await;
        let id = guard.record.info_hash;

        let admitted: Result<JobHandle> = match guard.record.metainfo.as_ref() {
            Some(metainfo) => self
                .engine
                .admit(metainfo, &guard.record.storage_path)
                .await
                .map_err(Into::into),
            None => Err(EngineError::Metadata(id).into()),
        };

        match admitted {
            Ok(job) => {
                self.activate(&mut guard, job);
                Ok(())
            }
            Err(e) => {
                guard.job = None;
                guard.record.status = JobStatus::Stopped;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{Harness, metainfo};
    use crate::{DEFAULT_MAX_ESTABLISHED_CONNS, MemoryJobLog};
    use warren_types::{Descriptor, JobRecord, JobStatus};

    fn record(name: &str, status: JobStatus) -> JobRecord {
        let mut record = JobRecord::from_metainfo(metainfo(name, 100), "/srv/data");
        record.status = status;
        record
    }

    #[tokio::test]
    async fn test_unfinished_jobs_are_resumed() {
        let queued = record("queued", JobStatus::Queued);
        let stopped = record("stopped", JobStatus::Stopped);
        let running = record("running", JobStatus::Running);
        let mut completed = record("completed", JobStatus::Running);
        completed.mark_completed();

        let h = Harness::with_log(MemoryJobLog::with_records(vec![
            queued.clone(),
            stopped.clone(),
            running.clone(),
            completed.clone(),
        ]))
        .await;

        for id in [queued.info_hash, stopped.info_hash, running.info_hash] {
            assert_eq!(h.manager.record(id).await.unwrap().status, JobStatus::Running);
            let job = h.engine().job(id).unwrap();
            assert_eq!(job.max_connections(), DEFAULT_MAX_ESTABLISHED_CONNS);
            assert!(h.manager.has_live_subscription(id).await);
        }
        assert_eq!(
            h.manager.record(completed.info_hash).await.unwrap().status,
            JobStatus::Completed
        );
        assert!(!h.engine().is_admitted(completed.info_hash));

        let names: Vec<_> = h.log.records().await.into_iter().map(|r| r.name).collect();
        assert_eq!(names, ["queued", "stopped", "running", "completed"]);
    }

    #[tokio::test]
    async fn test_unreadmittable_job_is_left_stopped() {
        let healthy = record("healthy", JobStatus::Running);
        let mut broken = record("broken", JobStatus::Running);
        broken.metainfo = None;

        let h = Harness::with_log(MemoryJobLog::with_records(vec![
            broken.clone(),
            healthy.clone(),
        ]))
        .await;

        let recovered = h.manager.record(broken.info_hash).await.unwrap();
        assert_eq!(recovered.status, JobStatus::Stopped);
        assert_eq!(
            h.manager.record(healthy.info_hash).await.unwrap().status,
            JobStatus::Running
        );
        assert_eq!(h.log.records().await[0].status, JobStatus::Stopped);
    }

    #[tokio::test]
    async fn test_analysing_records_are_ignored() {
        let id = metainfo("ghost", 1).info_hash;
        let ghost = JobRecord::analysing(&Descriptor::InfoHash(id), "/srv/data");
        let kept = record("kept", JobStatus::Stopped);

        let h = Harness::with_log(MemoryJobLog::with_records(vec![ghost, kept.clone()])).await;

        assert!(h.manager.record(id).await.is_none());
        assert_eq!(h.manager.records().await.len(), 1);
        assert_eq!(h.log.records().await.len(), 1);
    }
}
