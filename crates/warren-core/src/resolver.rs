//! Background resolution of lazy descriptors.

use crate::index::{Resolution, ResolveOutcome};
use crate::{JobHandle, JobManager};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use warren_types::{Descriptor, InfoHash, JobStatus, Metainfo};

impl JobManager {
    /// Spawns the task racing metadata arrival against cancellation.
    pub(crate) fn spawn_resolution(self: &Arc<Self>, id: InfoHash, job: JobHandle) -> Resolution {
        let cancel = self.shutdown.child_token();
        let task = self
            .tracker
            .spawn(Arc::clone(self).resolve(id, job, cancel.clone()));
        Resolution { cancel, task }
    }

    async fn resolve(
        self: Arc<Self>,
        id: InfoHash,
        job: JobHandle,
        cancel: CancellationToken,
    ) -> ResolveOutcome {
        let metadata = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = job.await_metadata() => Some(result),
        };

        match metadata {
            None => {
                self.engine.abandon(id).await;
                debug!(info_hash = %id, "resolution canceled");
                ResolveOutcome::Canceled
            }
            Some(Ok(metainfo)) => self.finish_resolution(id, metainfo, &cancel).await,
            Some(Err(e)) => {
                warn!(info_hash = %id, error = %e, "failed to resolve descriptor");
                self.discard_unresolved(id).await;
                ResolveOutcome::Failed
            }
        }
    }

    /// Queues, persists and starts a resolved job, then announces it.
    async fn finish_resolution(
        self: &Arc<Self>,
        id: InfoHash,
        mut metainfo: Metainfo,
        cancel: &CancellationToken,
    ) -> ResolveOutcome {
        {
            let _gate = self.gate.write().await;
            let index = self.index.read().await;
            let Some(entry) = index.get(id) else {
                self.engine.abandon(id).await;
                return ResolveOutcome::Canceled;
            };

            let mut guard = entry.lock().await;
            if cancel.is_cancelled() || guard.removed || guard.record.status != JobStatus::Analysing {
                drop(guard);
                self.engine.abandon(id).await;
                debug!(info_hash = %id, "metadata arrived after cancellation");
                return ResolveOutcome::Canceled;
            }
            if let Err(e) = self.ensure_writable() {
                warn!(info_hash = %id, error = %e, "dropping resolved metadata");
                return ResolveOutcome::Failed;
            }

            if let Some(descriptor) = guard
                .record
                .descriptor
                .as_deref()
                .and_then(|raw| Descriptor::parse(raw).ok())
            {
                metainfo.merge_trackers(descriptor.trackers().iter().cloned());
            }

            guard.ext.resolution = None;
            guard.record.resolve(metainfo.clone());
            guard.record.descriptor = None;
            drop(guard);

            if let Err(e) = self.commit(&index).await {
                error!(info_hash = %id, error = %e, "failed to persist resolved job");
                return ResolveOutcome::Failed;
            }

            let mut guard = entry.lock().await;
            let Some(job) = guard.job.clone() else {
                return ResolveOutcome::Failed;
            };
            let queued = guard.record.clone();
            self.activate(&mut guard, job);
            drop(guard);

            if let Err(e) = self.commit(&index).await {
                let mut guard = entry.lock().await;
                guard.ext.close_subscription();
                guard.record = queued;
                error!(info_hash = %id, error = %e, "failed to persist started job");
                return ResolveOutcome::Failed;
            }
        }

        self.write_torrent_file(&metainfo).await;
        self.notify_refresh();
        info!(info_hash = %id, name = %metainfo.name, "descriptor resolved");
        ResolveOutcome::Resolved
    }

    /// Removes a placeholder whose metadata can never arrive, unless a
    /// delete or shutdown already owns its teardown.
    async fn discard_unresolved(&self, id: InfoHash) {
        let _gate = self.gate.write().await;
        let mut index = self.index.write().await;
        if let Some(entry) = index.get(id) {
            let mut guard = entry.lock().await;
            if guard.ext.resolution.take().is_some() {
                guard.removed = true;
                drop(guard);
                index.remove(id);
                self.notify_refresh();
            }
        }
        self.engine.abandon(id).await;
    }

    async fn write_torrent_file(&self, metainfo: &Metainfo) {
        if !metainfo.has_safe_name() {
            warn!(name = %metainfo.name, "not writing torrent file for unsafe name");
            return;
        }
        let path = self
            .settings
            .tmp_dir
            .join(format!("{}.torrent", metainfo.name));

        let bytes = match metainfo.to_torrent_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(name = %metainfo.name, error = %e, "failed to encode torrent file");
                return;
            }
        };

        match tokio::fs::write(&path, bytes).await {
            Ok(()) => debug!(path = %path.display(), "torrent file written"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to write torrent file"),
        }
    }
}
