//! Persistent job records.

use crate::metainfo::is_plain_component;
use crate::{Descriptor, InfoHash, JobStatus, Metainfo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The durable description of one download job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Content identifier, unique across the store.
    pub info_hash: InfoHash,
    /// Display name. The hex identifier until metadata is resolved.
    pub name: String,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Directory the content is written under.
    pub storage_path: PathBuf,
    /// Resolved metadata, absent while analysing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metainfo: Option<Metainfo>,
    /// Descriptor the job was created from, if it was lazy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<String>,
    /// When the job was created.
    pub added_at: DateTime<Utc>,
    /// When the job was marked completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Creates a queued record for content whose metadata is known.
    #[must_use]
    pub fn from_metainfo(metainfo: Metainfo, storage_path: impl Into<PathBuf>) -> Self {
        Self {
            info_hash: metainfo.info_hash,
            name: metainfo.name.clone(),
            status: JobStatus::Queued,
            storage_path: storage_path.into(),
            metainfo: Some(metainfo),
            descriptor: None,
            added_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Creates an analysing record for a lazy descriptor.
    #[must_use]
    pub fn analysing(descriptor: &Descriptor, storage_path: impl Into<PathBuf>) -> Self {
        let info_hash = descriptor.info_hash();
        Self {
            info_hash,
            name: info_hash.to_hex(),
            status: JobStatus::Analysing,
            storage_path: storage_path.into(),
            metainfo: None,
            descriptor: Some(descriptor.to_string()),
            added_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Returns the record identifier.
    #[must_use]
    pub const fn id(&self) -> InfoHash {
        self.info_hash
    }

    /// Returns the on-disk location of the job's data.
    ///
    /// Returns `None` when the name is not a single plain path component,
    /// since joining it could point at or outside the storage directory.
    #[must_use]
    pub fn data_path(&self) -> Option<PathBuf> {
        is_plain_component(&self.name).then(|| self.storage_path.join(&self.name))
    }

    /// Returns the content size once metadata is known.
    #[must_use]
    pub fn total_length(&self) -> Option<u64> {
        self.metainfo.as_ref().map(|m| m.total_length)
    }

    /// Returns true if the data lives under `dir`.
    #[must_use]
    pub fn is_stored_in(&self, dir: &Path) -> bool {
        self.storage_path == dir
    }

    /// Attaches resolved metadata and moves the record to `Queued`.
    pub fn resolve(&mut self, metainfo: Metainfo) {
        self.name = metainfo.name.clone();
        self.metainfo = Some(metainfo);
        self.status = JobStatus::Queued;
    }

    /// Marks the record as completed.
    pub fn mark_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_metainfo_is_queued() {
        let meta = Metainfo::single_file("iso", 10).unwrap();
        let record = JobRecord::from_metainfo(meta.clone(), "/data");

        assert_eq!(record.id(), meta.info_hash);
        assert_eq!(record.status, JobStatus::Queued);
        assert_eq!(record.data_path(), Some(PathBuf::from("/data/iso")));
        assert_eq!(record.total_length(), Some(10));
    }

    #[test]
    fn test_analysing_uses_hex_name() {
        let descriptor: Descriptor = "c9e15763f722f23e98a29decdfae341b98d53056".parse().unwrap();
        let mut record = JobRecord::analysing(&descriptor, "/data");

        assert_eq!(record.status, JobStatus::Analysing);
        assert_eq!(record.name, descriptor.info_hash().to_hex());
        assert_eq!(record.total_length(), None);

        let meta = Metainfo::single_file("resolved", 3).unwrap();
        record.resolve(meta);
        assert_eq!(record.status, JobStatus::Queued);
        assert_eq!(record.name, "resolved");
        assert_eq!(record.info_hash, descriptor.info_hash());
    }

    #[test]
    fn test_data_path_stays_inside_storage() {
        let mut record = JobRecord::from_metainfo(Metainfo::single_file("a", 1).unwrap(), "/srv/data");
        for name in ["", ".", "..", "/etc", "nested/dir", "../sibling"] {
            record.name = name.to_string();
            assert_eq!(record.data_path(), None, "name {name:?}");
        }

        record.name = "..hidden".to_string();
        assert_eq!(record.data_path(), Some(PathBuf::from("/srv/data/..hidden")));
    }

    #[test]
    fn test_mark_completed_sets_timestamp() {
        let mut record = JobRecord::from_metainfo(Metainfo::single_file("a", 1).unwrap(), "/d");
        assert!(record.completed_at.is_none());
        record.mark_completed();
        assert_eq!(record.status, JobStatus::Completed);
        assert!(record.completed_at.is_some());
    }

    #[test]
    fn test_serde_roundtrip() {
        let record = JobRecord::from_metainfo(Metainfo::single_file("a", 1).unwrap(), "/d");
        let json = serde_json::to_string(&record).unwrap();
        let back: JobRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
