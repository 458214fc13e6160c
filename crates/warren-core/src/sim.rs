//! In-process simulated transfer engine.
//!
//! [`SimulatedEngine`] keeps every admitted job in memory and publishes its
//! byte count on a `watch` channel. By default nothing happens on its own:
//! callers push metadata and byte counts explicitly. A timed
//! [`SimConfig`] makes lazy jobs resolve after a delay and downloading jobs
//! advance at a fixed rate while their connection cap is non-zero.

use crate::{Backend, EngineError, JobHandle, Settings, TransferEngine, TransferJob};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use warren_store::{FileJobLog, JobLog, MemoryJobLog, StoreError};
use warren_types::{Descriptor, InfoHash, Metainfo};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Behaviour of a [`SimulatedEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    /// Download rate in bytes per second. `None` disables automatic progress.
    pub rate: Option<u64>,
    /// Interval between progress steps.
    pub tick: Duration,
    /// Delay before a lazy job obtains metadata. `None` disables automatic
    /// resolution.
    pub metadata_delay: Option<Duration>,
    /// Content size of metadata synthesized for identifiers missing from
    /// the catalogue.
    pub synthetic_length: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            rate: None,
            tick: Duration::from_millis(100),
            metadata_delay: None,
            synthetic_length: 64 * 1024 * 1024,
        }
    }
}

impl SimConfig {
    /// Creates a config that resolves and downloads on its own.
    #[must_use]
    pub fn timed(rate: u64, metadata_delay: Duration) -> Self {
        Self {
            rate: Some(rate),
            metadata_delay: Some(metadata_delay),
            ..Self::default()
        }
    }
}

/// A job held by a [`SimulatedEngine`].
#[derive(Debug)]
pub struct SimJob {
    me: Weak<Self>,
    info_hash: InfoHash,
    storage: PathBuf,
    config: SimConfig,
    metainfo: watch::Sender<Option<Metainfo>>,
    progress: watch::Sender<u64>,
    max_conns: AtomicUsize,
    downloading: AtomicBool,
    ticking: AtomicBool,
    trackers: Mutex<Vec<String>>,
    fail_verification: Arc<AtomicBool>,
    token: CancellationToken,
}

impl SimJob {
    fn new(
        info_hash: InfoHash,
        storage: &Path,
        metainfo: Option<Metainfo>,
        engine: &EngineState,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            info_hash,
            storage: storage.to_path_buf(),
            config: engine.config.clone(),
            metainfo: watch::Sender::new(metainfo),
            progress: watch::Sender::new(0),
            max_conns: AtomicUsize::new(0),
            downloading: AtomicBool::new(false),
            ticking: AtomicBool::new(false),
            trackers: Mutex::new(Vec::new()),
            fail_verification: Arc::clone(&engine.fail_verification),
            token: engine.token.child_token(),
        })
    }

    /// Returns the directory the job was admitted with.
    #[must_use]
    pub fn storage(&self) -> &Path {
        &self.storage
    }

    /// Returns the current connection cap.
    #[must_use]
    pub fn max_connections(&self) -> usize {
        self.max_conns.load(Ordering::Acquire)
    }

    /// Returns the trackers added so far.
    #[must_use]
    pub fn trackers(&self) -> Vec<String> {
        lock(&self.trackers).clone()
    }

    /// Returns true once every piece has been requested.
    #[must_use]
    pub fn is_downloading(&self) -> bool {
        self.downloading.load(Ordering::Acquire)
    }

    /// Returns true once metadata is known.
    #[must_use]
    pub fn has_metadata(&self) -> bool {
        self.metainfo.borrow().is_some()
    }

    /// Returns the number of live byte count subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.progress.receiver_count()
    }

    /// Publishes a new byte count, capped at the content size.
    pub fn set_progress(&self, bytes: u64) {
        let capped = self.total_bytes().map_or(bytes, |total| bytes.min(total));
        self.progress.send_replace(capped);
    }

    /// Publishes metadata. Returns false if it was already known.
    pub fn provide_metadata(&self, metainfo: Metainfo) -> bool {
        self.metainfo.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(metainfo);
            true
        })
    }

    async fn run_ticker(self: Arc<Self>, rate: u64) {
        let tick = self.config.tick;
        let step = (u128::from(rate) * tick.as_millis() / 1_000).max(1);
        let step = u64::try_from(step).unwrap_or(u64::MAX);

        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.token.cancelled() => break,
                _ = interval.tick() => {}
            }

            let Some(total) = self.total_bytes() else {
                continue;
            };
            if self.max_connections() == 0 {
                continue;
            }

            self.progress.send_if_modified(|bytes| {
                if *bytes >= total {
                    return false;
                }
                *bytes = bytes.saturating_add(step).min(total);
                true
            });
            trace!(info_hash = %self.info_hash, bytes = *self.progress.borrow(), "simulated progress");

            if *self.progress.borrow() >= total {
                break;
            }
        }

        self.ticking.store(false, Ordering::Release);
    }
}

#[async_trait]
impl TransferJob for SimJob {
    fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    fn bytes_completed(&self) -> u64 {
        *self.progress.borrow()
    }

    fn total_bytes(&self) -> Option<u64> {
        self.metainfo.borrow().as_ref().map(|m| m.total_length)
    }

    async fn await_metadata(&self) -> Result<Metainfo, EngineError> {
        let mut rx = self.metainfo.subscribe();
        tokio::select! {
            () = self.token.cancelled() => Err(EngineError::Metadata(self.info_hash)),
            result = rx.wait_for(Option::is_some) => result
                .ok()
                .and_then(|m| m.clone())
                .ok_or(EngineError::Metadata(self.info_hash)),
        }
    }

    async fn verify_data(&self) -> Result<bool, EngineError> {
        let total = self.total_bytes().ok_or_else(|| EngineError::Verify {
            id: self.info_hash,
            reason: "metadata unknown".to_string(),
        })?;
        Ok(!self.fail_verification.load(Ordering::Acquire) && self.bytes_completed() >= total)
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.progress.subscribe()
    }

    fn set_max_connections(&self, max: usize) {
        self.max_conns.store(max, Ordering::Release);
    }

    fn add_trackers(&self, trackers: &[String]) {
        let mut current = lock(&self.trackers);
        for tracker in trackers {
            if !current.contains(tracker) {
                current.push(tracker.clone());
            }
        }
    }

    fn download_all(&self) {
        self.downloading.store(true, Ordering::Release);

        let Some(rate) = self.config.rate else {
            return;
        };
        if self.ticking.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(me) = self.me.upgrade() {
            tokio::spawn(me.run_ticker(rate));
        }
    }
}

#[derive(Debug, Default)]
struct EngineState {
    config: SimConfig,
    jobs: Mutex<HashMap<InfoHash, Arc<SimJob>>>,
    catalogue: Mutex<HashMap<InfoHash, Metainfo>>,
    abandoned: Mutex<Vec<InfoHash>>,
    fail_verification: Arc<AtomicBool>,
    reject: AtomicBool,
    closed: AtomicBool,
    token: CancellationToken,
}

/// An in-process [`TransferEngine`]. Clones share the same jobs.
#[derive(Debug, Clone, Default)]
pub struct SimulatedEngine {
    state: Arc<EngineState>,
}

impl SimulatedEngine {
    /// Creates an engine with the given behaviour.
    #[must_use]
    pub fn new(config: SimConfig) -> Self {
        Self {
            state: Arc::new(EngineState {
                config,
                ..EngineState::default()
            }),
        }
    }

    /// Registers metadata that timed resolution hands out for its identifier.
    pub fn add_to_catalogue(&self, metainfo: Metainfo) {
        lock(&self.state.catalogue).insert(metainfo.info_hash, metainfo);
    }

    /// Returns an admitted job.
    #[must_use]
    pub fn job(&self, id: InfoHash) -> Option<Arc<SimJob>> {
        lock(&self.state.jobs).get(&id).cloned()
    }

    /// Returns true if a job with this identifier is admitted.
    #[must_use]
    pub fn is_admitted(&self, id: InfoHash) -> bool {
        lock(&self.state.jobs).contains_key(&id)
    }

    /// Returns the number of admitted jobs.
    #[must_use]
    pub fn admitted(&self) -> usize {
        lock(&self.state.jobs).len()
    }

    /// Returns every identifier abandoned so far, in order.
    #[must_use]
    pub fn abandoned(&self) -> Vec<InfoHash> {
        lock(&self.state.abandoned).clone()
    }

    /// Publishes metadata for an admitted job.
    pub fn provide_metadata(&self, id: InfoHash, metainfo: Metainfo) -> bool {
        self.job(id).is_some_and(|job| job.provide_metadata(metainfo))
    }

    /// Publishes a byte count for an admitted job.
    pub fn set_progress(&self, id: InfoHash, bytes: u64) -> bool {
        let Some(job) = self.job(id) else {
            return false;
        };
        job.set_progress(bytes);
        true
    }

    /// Makes data verification report a mismatch while `fail` is set.
    pub fn fail_verification(&self, fail: bool) {
        self.state.fail_verification.store(fail, Ordering::Release);
    }

    /// Makes admissions fail while `reject` is set.
    pub fn reject_admissions(&self, reject: bool) {
        self.state.reject.store(reject, Ordering::Release);
    }

    /// Returns true once the engine has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }

    fn check_admission(&self, id: InfoHash) -> Result<(), EngineError> {
        if self.is_closed() {
            return Err(EngineError::Closed);
        }
        if self.state.reject.load(Ordering::Acquire) {
            return Err(EngineError::Rejected {
                id,
                reason: "admissions disabled".to_string(),
            });
        }
        Ok(())
    }

    fn schedule_metadata(&self, job: &Arc<SimJob>, delay: Duration) {
        let id = job.info_hash;
        let metainfo = lock(&self.state.catalogue).get(&id).cloned();
        let synthetic_length = self.state.config.synthetic_length;
        let job = Arc::clone(job);

        tokio::spawn(async move {
            tokio::select! {
                () = job.token.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    let metainfo = match metainfo {
                        Some(metainfo) => Ok(metainfo),
                        None => Metainfo::single_file(&id.to_hex(), synthetic_length).map(|mut m| {
                            m.info_hash = id;
                            m
                        }),
                    };
                    match metainfo {
                        Ok(metainfo) => {
                            job.provide_metadata(metainfo);
                            debug!(info_hash = %id, "simulated metadata delivered");
                        }
                        Err(e) => debug!(info_hash = %id, error = %e, "failed to synthesize metadata"),
                    }
                }
            }
        });
    }
}

#[async_trait]
impl TransferEngine for SimulatedEngine {
    async fn admit(&self, metainfo: &Metainfo, storage: &Path) -> Result<JobHandle, EngineError> {
        let id = metainfo.info_hash;
        self.check_admission(id)?;

        let mut jobs = lock(&self.state.jobs);
        if let Some(existing) = jobs.get(&id) {
            existing.provide_metadata(metainfo.clone());
            return Ok(Arc::clone(existing) as JobHandle);
        }

        let job = SimJob::new(id, storage, Some(metainfo.clone()), &self.state);
        jobs.insert(id, Arc::clone(&job));
        debug!(info_hash = %id, storage = %storage.display(), "simulated job admitted");
        Ok(job)
    }

    async fn admit_lazy(
        &self,
        descriptor: &Descriptor,
        storage: &Path,
    ) -> Result<JobHandle, EngineError> {
        let id = descriptor.info_hash();
        self.check_admission(id)?;

        let job = {
            let mut jobs = lock(&self.state.jobs);
            if let Some(existing) = jobs.get(&id) {
                return Ok(Arc::clone(existing) as JobHandle);
            }
            let job = SimJob::new(id, storage, None, &self.state);
            job.add_trackers(descriptor.trackers());
            jobs.insert(id, Arc::clone(&job));
            job
        };

        if let Some(delay) = self.state.config.metadata_delay {
            self.schedule_metadata(&job, delay);
        }
        debug!(info_hash = %id, "simulated lazy job admitted");
        Ok(job)
    }

    fn lookup(&self, id: InfoHash) -> Option<JobHandle> {
        self.job(id).map(|job| job as JobHandle)
    }

    async fn abandon(&self, id: InfoHash) {
        let removed = lock(&self.state.jobs).remove(&id);
        if let Some(job) = removed {
            job.token.cancel();
            lock(&self.state.abandoned).push(id);
            debug!(info_hash = %id, "simulated job abandoned");
        }
    }

    async fn close(&self) {
        self.state.closed.store(true, Ordering::Release);
        self.state.token.cancel();
        lock(&self.state.jobs).clear();
    }
}

#[derive(Debug, Clone)]
enum LogChoice {
    File,
    Memory(MemoryJobLog),
}

/// A [`Backend`] opening a fresh [`SimulatedEngine`] on every launch.
#[derive(Debug)]
pub struct SimulatedBackend {
    config: SimConfig,
    log: LogChoice,
    catalogue: Vec<Metainfo>,
    engines: Mutex<Vec<SimulatedEngine>>,
}

impl SimulatedBackend {
    /// Creates a backend whose log is a JSON file at the settings' database
    /// path.
    #[must_use]
    pub fn with_file_log(config: SimConfig) -> Self {
        Self::build(config, LogChoice::File)
    }

    /// Creates a backend sharing `log` across launches.
    #[must_use]
    pub fn with_memory_log(config: SimConfig, log: MemoryJobLog) -> Self {
        Self::build(config, LogChoice::Memory(log))
    }

    fn build(config: SimConfig, log: LogChoice) -> Self {
        Self {
            config,
            log,
            catalogue: Vec::new(),
            engines: Mutex::new(Vec::new()),
        }
    }

    /// Sets metadata every opened engine starts with in its catalogue.
    #[must_use]
    pub fn with_catalogue(mut self, catalogue: Vec<Metainfo>) -> Self {
        self.catalogue = catalogue;
        self
    }

    /// Returns the most recently opened engine.
    #[must_use]
    pub fn engine(&self) -> Option<SimulatedEngine> {
        lock(&self.engines).last().cloned()
    }

    /// Returns how many engines have been opened.
    #[must_use]
    pub fn engines_opened(&self) -> usize {
        lock(&self.engines).len()
    }
}

#[async_trait]
impl Backend for SimulatedBackend {
    async fn open_engine(
        &self,
        _settings: &Settings,
    ) -> Result<Arc<dyn TransferEngine>, EngineError> {
        let engine = SimulatedEngine::new(self.config.clone());
        for metainfo in &self.catalogue {
            engine.add_to_catalogue(metainfo.clone());
        }
        lock(&self.engines).push(engine.clone());
        Ok(Arc::new(engine))
    }

    async fn open_log(&self, settings: &Settings) -> Result<Arc<dyn JobLog>, StoreError> {
        match &self.log {
            LogChoice::File => Ok(Arc::new(FileJobLog::new(&settings.db_path)?)),
            LogChoice::Memory(log) => Ok(Arc::new(log.reopen())),
        }
    }
}
