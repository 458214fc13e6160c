//! In-memory record index and per-record concurrency state.

use crate::{JobHandle, ProgressSampler};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use warren_types::{InfoHash, JobRecord};

/// How a resolution task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResolveOutcome {
    /// Metadata arrived and the record was queued.
    Resolved,
    /// The resolution was canceled before it could commit.
    Canceled,
    /// Metadata could not be obtained or persisted.
    Failed,
}

/// Cancellation pair of an in-flight resolution: the token requests
/// cancellation and the join handle acknowledges it.
#[derive(Debug)]
pub(crate) struct Resolution {
    pub(crate) cancel: CancellationToken,
    pub(crate) task: JoinHandle<ResolveOutcome>,
}

impl Resolution {
    /// Cancels the resolution and waits for its acknowledgement.
    pub(crate) async fn cancel_and_wait(self) -> ResolveOutcome {
        self.cancel.cancel();
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "resolution task panicked");
                ResolveOutcome::Failed
            }
        }
    }
}

/// Byte count subscription held by a progress watcher.
#[derive(Debug)]
pub(crate) struct Subscription {
    token: CancellationToken,
    closed: bool,
}

/// Per-record concurrency handles.
#[derive(Debug, Default)]
pub(crate) struct Extension {
    subscription: Option<Subscription>,
    pub(crate) resolution: Option<Resolution>,
    closes: usize,
}

impl Extension {
    /// Opens a subscription unless a live one exists. Returns the token the
    /// watcher must stop on.
    pub(crate) fn open_subscription(&mut self, parent: &CancellationToken) -> Option<CancellationToken> {
        if self.has_live_subscription() {
            return None;
        }
        let token = parent.child_token();
        self.subscription = Some(Subscription {
            token: token.clone(),
            closed: false,
        });
        Some(token)
    }

    pub(crate) fn has_live_subscription(&self) -> bool {
        self.subscription.as_ref().is_some_and(|s| !s.closed)
    }

    /// Closes and releases the subscription. Returns false if there was
    /// nothing left to close.
    pub(crate) fn close_subscription(&mut self) -> bool {
        let Some(mut subscription) = self.subscription.take() else {
            return false;
        };
        if subscription.closed {
            return false;
        }
        subscription.closed = true;
        subscription.token.cancel();
        self.closes += 1;
        true
    }

    /// Number of subscriptions closed over the record's lifetime.
    #[cfg(test)]
    pub(crate) const fn closes(&self) -> usize {
        self.closes
    }
}

/// A record together with its live state.
#[derive(Debug)]
pub(crate) struct Entry {
    pub(crate) record: JobRecord,
    pub(crate) job: Option<JobHandle>,
    pub(crate) ext: Extension,
    pub(crate) sampler: ProgressSampler,
    pub(crate) removed: bool,
}

impl Entry {
    pub(crate) fn new(record: JobRecord, job: Option<JobHandle>) -> Self {
        Self {
            record,
            job,
            ext: Extension::default(),
            sampler: ProgressSampler::new(),
            removed: false,
        }
    }

    /// Feeds the engine's byte count into the sampler. Returns true once
    /// every byte is present.
    pub(crate) fn sample(&mut self, now: Instant) -> bool {
        let Some(job) = self.job.as_ref() else {
            return false;
        };
        let Some(total) = job.total_bytes().or_else(|| self.record.total_length()) else {
            return false;
        };
        self.sampler.observe(now, job.bytes_completed(), total) >= 1.0
    }
}

pub(crate) type SharedEntry = Arc<Mutex<Entry>>;

/// Identifier to record map with a stable insertion order.
#[derive(Debug, Default)]
pub(crate) struct RecordIndex {
    entries: HashMap<InfoHash, SharedEntry>,
    order: Vec<InfoHash>,
}

impl RecordIndex {
    /// Rebuilds the index from persisted records. Later duplicates of an
    /// identifier are dropped.
    pub(crate) fn from_records(records: impl IntoIterator<Item = JobRecord>) -> Self {
        let mut index = Self::default();
        for record in records {
            if index.contains(record.info_hash) {
                tracing::warn!(info_hash = %record.info_hash, "duplicate record in job log, skipping");
                continue;
            }
            index.insert(Entry::new(record, None));
        }
        index
    }

    pub(crate) fn contains(&self, id: InfoHash) -> bool {
        self.entries.contains_key(&id)
    }

    pub(crate) fn get(&self, id: InfoHash) -> Option<SharedEntry> {
        self.entries.get(&id).cloned()
    }

    pub(crate) fn insert(&mut self, entry: Entry) -> SharedEntry {
        let id = entry.record.info_hash;
        let shared = Arc::new(Mutex::new(entry));
        if self.entries.insert(id, Arc::clone(&shared)).is_none() {
            self.order.push(id);
        }
        shared
    }

    pub(crate) fn remove(&mut self, id: InfoHash) -> Option<SharedEntry> {
        let removed = self.entries.remove(&id)?;
        self.order.retain(|other| *other != id);
        Some(removed)
    }

    pub(crate) fn position(&self, id: InfoHash) -> Option<usize> {
        self.order.iter().position(|other| *other == id)
    }

    /// Puts a removed entry back at its former position.
    pub(crate) fn restore(&mut self, position: usize, id: InfoHash, entry: SharedEntry) {
        if self.entries.insert(id, entry).is_none() {
            self.order.insert(position.min(self.order.len()), id);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns every entry in insertion order.
    pub(crate) fn entries(&self) -> Vec<(InfoHash, SharedEntry)> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id).map(|e| (*id, Arc::clone(e))))
            .collect()
    }

    /// Returns copies of every record in insertion order.
    pub(crate) async fn records(&self) -> Vec<JobRecord> {
        let mut records = Vec::with_capacity(self.len());
        for (_, entry) in self.entries() {
            records.push(entry.lock().await.record.clone());
        }
        records
    }

    /// Returns the records that belong in the job log.
    pub(crate) async fn persistable(&self) -> Vec<JobRecord> {
        let mut records = self.records().await;
        records.retain(|r| r.status.is_persistable());
        records
    }
}
