//! The job manager: record store and status state machine.

use crate::index::{Entry, RecordIndex};
use crate::{
    Backend, EngineError, EngineMessage, Error, MessageFromWeb, MessageKind, ProgressInfo,
    Result, Settings, Snapshot, TransferEngine,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{RwLock, broadcast};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use warren_store::JobLog;
use warren_types::{Descriptor, InfoHash, JobRecord, JobStatus, Metainfo};

/// Capacity of the notification channel.
const NOTIFY_CAPACITY: usize = 100;

/// Result of an add operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// A new record was created.
    Created(JobRecord),
    /// A record with the same identifier already existed and is returned
    /// unchanged.
    Existing(JobRecord),
}

impl Admission {
    /// Returns the record.
    #[must_use]
    pub const fn record(&self) -> &JobRecord {
        match self {
            Self::Created(record) | Self::Existing(record) => record,
        }
    }

    /// Consumes the admission and returns the record.
    #[must_use]
    pub fn into_record(self) -> JobRecord {
        match self {
            Self::Created(record) | Self::Existing(record) => record,
        }
    }

    /// Returns true if a new record was created.
    #[must_use]
    pub const fn is_new(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Coordinates the lifecycle of every download job.
///
/// Locks are always taken in the order gate, index, record. Operations that
/// change persisted state hold the gate exclusively across the mutation and
/// the save, and queries hold it shared, so a query never observes a status
/// that is not yet durable.
pub struct JobManager {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) settings: Settings,
    pub(crate) engine: Arc<dyn TransferEngine>,
    pub(crate) log: Arc<dyn JobLog>,
    pub(crate) gate: RwLock<()>,
    pub(crate) index: RwLock<RecordIndex>,
    notifier: broadcast::Sender<MessageKind>,
    pub(crate) tracker: TaskTracker,
    pub(crate) shutdown: CancellationToken,
    diverged: AtomicBool,
    pub(crate) closed: AtomicBool,
}

impl fmt::Debug for JobManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobManager")
            .field("settings", &self.settings)
            .field("engine", &self.engine)
            .field("log", &self.log)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl JobManager {
    /// Opens the engine and the log through `backend`, then recovers every
    /// persisted job.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created, the engine or log
    /// cannot be opened, or the persisted records cannot be loaded.
    pub async fn launch(backend: Arc<dyn Backend>, settings: Settings) -> Result<Arc<Self>> {
        for dir in [&settings.data_dir, &settings.tmp_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| Error::CreateDir {
                    path: dir.clone(),
                    source: e,
                })?;
        }

        let engine = backend.open_engine(&settings).await?;
        let log = match backend.open_log(&settings).await {
            Ok(log) => log,
            Err(e) => {
                engine.close().await;
                return Err(e.into());
            }
        };

        let (notifier, _) = broadcast::channel(NOTIFY_CAPACITY);
        let manager = Arc::new(Self {
            backend,
            settings,
            engine,
            log,
            gate: RwLock::new(()),
            index: RwLock::new(RecordIndex::default()),
            notifier,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            diverged: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });

        if let Err(e) = manager.recover().await {
            manager.closed.store(true, Ordering::Release);
            manager.release().await;
            return Err(e);
        }

        Ok(manager)
    }

    /// Returns the settings the manager runs with.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Subscribes to push notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MessageKind> {
        self.notifier.subscribe()
    }

    /// Returns true once the manager has been shut down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        if self.diverged.load(Ordering::Acquire) {
            return Err(Error::Diverged);
        }
        Ok(())
    }

    /// Saves every persistable record. A failure leaves the manager
    /// refusing further state changes.
    pub(crate) async fn commit(&self, index: &RecordIndex) -> Result<()> {
        let records = index.persistable().await;
        if let Err(e) = self.log.save_all(&records).await {
            self.diverged.store(true, Ordering::Release);
            error!(error = %e, "failed to persist job records");
            return Err(e.into());
        }
        debug!(count = records.len(), "job records persisted");
        Ok(())
    }

    pub(crate) fn notify_refresh(&self) {
        let _ = self.notifier.send(MessageKind::RefreshInfo);
    }

    /// Adds a job from a `.torrent` file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded, or if
    /// admission or persistence fails.
    pub async fn add_torrent_file(
        &self,
        path: impl AsRef<Path>,
        storage: Option<PathBuf>,
    ) -> Result<Admission> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| Error::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        let metainfo = Metainfo::from_bytes(&bytes)?;
        self.add_metainfo(metainfo, storage).await
    }

    /// Adds a job whose metadata is known. The new record is `Queued`.
    ///
    /// Adding an identifier that already exists returns the existing record.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the job or the record set
    /// cannot be persisted. No record is left behind on error.
    pub async fn add_metainfo(
        &self,
        metainfo: Metainfo,
        storage: Option<PathBuf>,
    ) -> Result<Admission> {
        self.ensure_writable()?;
        let id = metainfo.info_hash;

        let _gate = self.gate.write().await;
        self.ensure_writable()?;
        let mut index = self.index.write().await;

        if let Some(existing) = index.get(id) {
            debug!(info_hash = %id, "job already present");
            return Ok(Admission::Existing(existing.lock().await.record.clone()));
        }

        let storage = storage.unwrap_or_else(|| self.settings.data_dir.clone());
        let job = self.engine.admit(&metainfo, &storage).await?;
        let record = JobRecord::from_metainfo(metainfo, storage);
        index.insert(Entry::new(record.clone(), Some(job)));

        if let Err(e) = self.commit(&index).await {
            index.remove(id);
            self.engine.abandon(id).await;
            return Err(e);
        }

        info!(info_hash = %id, name = %record.name, "job added");
        Ok(Admission::Created(record))
    }

    /// Adds a job from a lazy descriptor: a `magnet:` URI, `infohash:<hash>`
    /// or a bare hash.
    ///
    /// Returns immediately with an `Analysing` placeholder while metadata is
    /// resolved in the background. Once resolved the job is queued, saved,
    /// started and a [`MessageKind::RefreshInfo`] notification is sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor is malformed or the engine rejects
    /// it. No placeholder exists on error.
    pub async fn add_descriptor(
        self: &Arc<Self>,
        input: &str,
        storage: Option<PathBuf>,
    ) -> Result<Admission> {
        let descriptor = Descriptor::parse(input)?;
        self.ensure_writable()?;
        let id = descriptor.info_hash();

        let _gate = self.gate.write().await;
        self.ensure_writable()?;
        let mut index = self.index.write().await;

        if let Some(existing) = index.get(id) {
            debug!(info_hash = %id, "job already present");
            return Ok(Admission::Existing(existing.lock().await.record.clone()));
        }

        let storage = storage.unwrap_or_else(|| self.settings.data_dir.clone());
        let job = self.engine.admit_lazy(&descriptor, &storage).await?;
        let record = JobRecord::analysing(&descriptor, storage);

        let mut entry = Entry::new(record.clone(), Some(job.clone()));
        entry.ext.resolution = Some(self.spawn_resolution(id, job));
        index.insert(entry);

        info!(info_hash = %id, "resolving descriptor");
        Ok(Admission::Created(record))
    }

    /// Starts a `Queued` or `Stopped` job. Starting a `Running` job is a
    /// no-op.
    ///
    /// Default trackers and the connection cap are applied and progress
    /// tracking begins before the status becomes `Running`.
    ///
    /// # Errors
    ///
    /// Returns an error if the job is unknown, `Analysing` or `Completed`,
    /// or if re-admission or persistence fails.
    pub async fn start(self: &Arc<Self>, id: InfoHash) -> Result<JobRecord> {
        self.ensure_writable()?;
        let _gate = self.gate.write().await;
        self.ensure_writable()?;
        let index = self.index.read().await;
        let entry = index.get(id).ok_or(Error::UnknownJob(id))?;
        let mut guard = entry.lock().await;

        let from = guard.record.status;
        if from == JobStatus::Running {
            return Ok(guard.record.clone());
        }
        if !from.can_transition_to(JobStatus::Running) {
            return Err(Error::InvalidTransition {
                id,
                from,
                to: JobStatus::Running,
            });
        }

        let job = match guard.job.clone().or_else(|| self.engine.lookup(id)) {
            Some(job) => job,
            None => {
                let metainfo = guard
                    .record
                    .metainfo
                    .as_ref()
                    .ok_or(EngineError::Metadata(id))?;
                self.engine.admit(metainfo, &guard.record.storage_path).await?
            }
        };

        let previous = guard.record.clone();
        self.activate(&mut guard, job);
        let record = guard.record.clone();
        drop(guard);

        if let Err(e) = self.commit(&index).await {
            let mut guard = entry.lock().await;
            guard.ext.close_subscription();
            if let Some(job) = &guard.job {
                job.set_max_connections(0);
            }
            guard.record = previous;
            return Err(e);
        }

        info!(info_hash = %id, from = %from, "job started");
        Ok(record)
    }

    /// Stops a `Running` job by throttling its connections to zero. Stopping
    /// a `Stopped` job is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the job is unknown or in any other status, or if
    /// persistence fails.
    pub async fn stop(&self, id: InfoHash) -> Result<JobRecord> {
        self.ensure_writable()?;
        let _gate = self.gate.write().await;
        self.ensure_writable()?;
        let index = self.index.read().await;
        let entry = index.get(id).ok_or(Error::UnknownJob(id))?;
        let mut guard = entry.lock().await;

        match guard.record.status {
            JobStatus::Stopped => return Ok(guard.record.clone()),
            JobStatus::Running => {}
            from => {
                return Err(Error::InvalidTransition {
                    id,
                    from,
                    to: JobStatus::Stopped,
                });
            }
        }

        let previous = guard.record.clone();
        if let Some(job) = &guard.job {
            job.set_max_connections(0);
        }
        guard.ext.close_subscription();
        guard.record.status = JobStatus::Stopped;
        let record = guard.record.clone();
        drop(guard);

        if let Err(e) = self.commit(&index).await {
            entry.lock().await.record = previous;
            return Err(e);
        }

        info!(info_hash = %id, "job stopped");
        Ok(record)
    }

    /// Deletes a job in any status, optionally removing its data from disk.
    ///
    /// An in-flight resolution is canceled and its acknowledgement awaited
    /// first. If the cancellation won, nothing was ever persisted and the
    /// placeholder simply disappears.
    ///
    /// # Errors
    ///
    /// Returns an error if the job is unknown, or if persistence or data
    /// removal fails. A failed save leaves the job untouched.
    pub async fn delete(&self, id: InfoHash, remove_data: bool) -> Result<JobRecord> {
        self.ensure_writable()?;

        let entry = self
            .index
            .read()
            .await
            .get(id)
            .ok_or(Error::UnknownJob(id))?;
        let resolution = entry.lock().await.ext.resolution.take();
        if let Some(resolution) = resolution {
            let outcome = resolution.cancel_and_wait().await;
            debug!(info_hash = %id, ?outcome, "resolution settled before delete");
        }

        let (record, persisted) = {
            let _gate = self.gate.write().await;
            self.ensure_writable()?;
            let mut index = self.index.write().await;
            let position = index.position(id).ok_or(Error::UnknownJob(id))?;
            let entry = index.remove(id).ok_or(Error::UnknownJob(id))?;

            let record = entry.lock().await.record.clone();
            let persisted = record.status.is_persistable();
            if persisted {
                if let Err(e) = self.commit(&index).await {
                    index.restore(position, id, entry);
                    return Err(e);
                }
            }

            let mut guard = entry.lock().await;
            guard.removed = true;
            guard.ext.close_subscription();
            guard.job = None;
            drop(guard);

            self.engine.abandon(id).await;
            (record, persisted)
        };

        if remove_data && persisted {
            match record.data_path() {
                Some(path) => {
                    if remove_path(&path).await? {
                        info!(info_hash = %id, path = %path.display(), "job data removed");
                    }
                }
                None => warn!(
                    info_hash = %id,
                    name = %record.name,
                    "job name is not a plain file name, leaving data in place"
                ),
            }
        }

        info!(info_hash = %id, status = %record.status, "job deleted");
        Ok(record)
    }

    /// Returns a copy of one record.
    pub async fn record(&self, id: InfoHash) -> Option<JobRecord> {
        let _gate = self.gate.read().await;
        let entry = self.index.read().await.get(id)?;
        let record = entry.lock().await.record.clone();
        Some(record)
    }

    /// Returns copies of every record, including `Analysing` placeholders,
    /// in insertion order.
    pub async fn records(&self) -> Vec<JobRecord> {
        let _gate = self.gate.read().await;
        self.index.read().await.records().await
    }

    /// Returns the display state of one job.
    pub async fn snapshot(&self, id: InfoHash) -> Option<Snapshot> {
        let _gate = self.gate.read().await;
        let entry = self.index.read().await.get(id)?;
        let guard = entry.lock().await;
        Some(Snapshot::build(&guard.record, &guard.sampler))
    }

    /// Returns the display state of every job in insertion order.
    pub async fn snapshots(&self) -> Vec<Snapshot> {
        let _gate = self.gate.read().await;
        let entries = self.index.read().await.entries();
        let mut snapshots = Vec::with_capacity(entries.len());
        for (_, entry) in entries {
            let guard = entry.lock().await;
            snapshots.push(Snapshot::build(&guard.record, &guard.sampler));
        }
        snapshots
    }

    /// Samples the progress of a `Running` or `Completed` job.
    ///
    /// Returns `None` for unknown jobs and jobs in any other status. A
    /// `Running` job found with every byte present is completed as a side
    /// effect.
    pub async fn get_info(&self, id: InfoHash) -> Option<ProgressInfo> {
        let (info, reached) = {
            let _gate = self.gate.read().await;
            let entry = self.index.read().await.get(id)?;
            let mut guard = entry.lock().await;

            let (percentage, reached) = match guard.record.status {
                JobStatus::Running => {
                    let reached = guard.sample(tokio::time::Instant::now());
                    (guard.sampler.percentage(), reached)
                }
                JobStatus::Completed => (1.0, false),
                _ => return None,
            };

            let info = ProgressInfo {
                info_hash: id,
                percentage,
                throughput: guard.sampler.throughput_text(),
                eta: guard.sampler.eta_text(),
            };
            (info, reached)
        };

        if reached {
            if let Err(e) = self.complete(id).await {
                warn!(info_hash = %id, error = %e, "failed to complete job");
            }
        }

        Some(info)
    }

    /// Answers a message from the display layer.
    ///
    /// Only [`MessageKind::GetInfo`] requests carrying an identifier get an
    /// answer. [`MessageKind::RefreshInfo`] is push-only.
    pub async fn handle_message(&self, message: &MessageFromWeb) -> Option<EngineMessage> {
        match (message.kind, message.info_hash) {
            (MessageKind::GetInfo, Some(id)) => self.get_info(id).await.map(EngineMessage::GetInfo),
            _ => None,
        }
    }

    #[cfg(test)]
    pub(crate) async fn subscription_closes(&self, id: InfoHash) -> usize {
        match self.index.read().await.get(id) {
            Some(entry) => entry.lock().await.ext.closes(),
            None => 0,
        }
    }

    #[cfg(test)]
    pub(crate) async fn has_live_subscription(&self, id: InfoHash) -> bool {
        match self.index.read().await.get(id) {
            Some(entry) => entry.lock().await.ext.has_live_subscription(),
            None => false,
        }
    }
}

/// Removes a file or directory tree. Returns false if nothing was there.
pub(crate) async fn remove_path(path: &Path) -> Result<bool> {
    let removal = match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => Err(e),
    };
    removal.map(|()| true).map_err(|e| Error::RemoveData {
        path: path.to_path_buf(),
        source: e,
    })
}
