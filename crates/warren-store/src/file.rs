//! JSON file job log.

use crate::{JobLog, Result, StoreError};
use async_trait::async_trait;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs;
use tokio::sync::Mutex;
use warren_types::JobRecord;

/// Version written into every saved document.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct DocumentRef<'a> {
    version: u32,
    records: &'a [JobRecord],
}

#[derive(Deserialize)]
struct Document {
    version: u32,
    #[serde(default)]
    records: Vec<serde_json::Value>,
}

/// Job log stored as a single JSON document.
///
/// Saves write a sibling temporary file and rename it over the log, so a
/// crash mid-save leaves the previous document in place.
#[derive(Debug)]
pub struct FileJobLog {
    path: PathBuf,
    write_lock: Mutex<()>,
    closed: AtomicBool,
}

impl FileJobLog {
    /// Creates a log backed by the file at `path`.
    ///
    /// The parent directory is created if it doesn't exist. The file itself
    /// is created on the first save.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty() && !p.exists())
        {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    /// Returns the default path for the job log.
    ///
    /// Uses the `directories` crate to find the platform data directory:
    /// - Linux: `~/.local/share/warren/jobs.json`
    /// - macOS: `~/Library/Application Support/warren/jobs.json`
    /// - Windows: `C:\Users\<User>\AppData\Roaming\warren\jobs.json`
    ///
    /// Falls back to `~/.warren/jobs.json`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        ProjectDirs::from("", "", "warren")
            .map_or_else(dirs_fallback, |proj_dirs| proj_dirs.data_dir().to_path_buf())
            .join("jobs.json")
    }

    /// Creates a log at the default path.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created.
    pub fn with_default_path() -> Result<Self> {
        Self::new(Self::default_path())
    }

    /// Returns the path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl JobLog for FileJobLog {
    async fn load_all(&self) -> Result<Vec<JobRecord>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "job log missing, starting empty");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(StoreError::ReadFile {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };

        let document: Document =
            serde_json::from_str(&content).map_err(|e| StoreError::ParseJson {
                path: self.path.clone(),
                source: e,
            })?;

        if document.version > FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                path: self.path.clone(),
                found: document.version,
            });
        }

        let mut records = Vec::with_capacity(document.records.len());
        for (index, value) in document.records.into_iter().enumerate() {
            match serde_json::from_value::<JobRecord>(value) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), index, error = %e, "skipping corrupt job record");
                }
            }
        }

        Ok(records)
    }

    async fn save_all(&self, records: &[JobRecord]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }

        let json = serde_json::to_string_pretty(&DocumentRef {
            version: FORMAT_VERSION,
            records,
        })?;

        let temp = self.temp_path();
        fs::write(&temp, json)
            .await
            .map_err(|e| StoreError::WriteFile {
                path: temp.clone(),
                source: e,
            })?;
        fs::rename(&temp, &self.path)
            .await
            .map_err(|e| StoreError::WriteFile {
                path: self.path.clone(),
                source: e,
            })?;

        tracing::trace!(path = %self.path.display(), count = records.len(), "job log saved");
        Ok(())
    }

    async fn close(&self) {
        let _guard = self.write_lock.lock().await;
        self.closed.store(true, Ordering::Release);
    }
}

/// Fallback for determining home directory.
fn dirs_fallback() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".warren")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use warren_types::{JobStatus, Metainfo};

    fn record(name: &str, status: JobStatus) -> JobRecord {
        let mut record = JobRecord::from_metainfo(Metainfo::single_file(name, 64).unwrap(), "/data");
        record.status = status;
        record
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let temp_dir = TempDir::new().unwrap();
        let log = FileJobLog::new(temp_dir.path().join("jobs.json")).unwrap();

        assert!(log.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_creates_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("db").join("jobs.json");
        let log = FileJobLog::new(&path).unwrap();

        assert!(temp_dir.path().join("nested").join("db").exists());
        assert_eq!(log.path(), path);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let log = FileJobLog::new(temp_dir.path().join("jobs.json")).unwrap();

        let records = vec![record("a", JobStatus::Running), record("b", JobStatus::Completed)];
        log.save_all(&records).await.unwrap();

        let loaded = log.load_all().await.unwrap();
        assert_eq!(loaded, records);
        assert!(!log.temp_path().exists());
    }

    #[tokio::test]
    async fn test_save_replaces_previous_set() {
        let temp_dir = TempDir::new().unwrap();
        let log = FileJobLog::new(temp_dir.path().join("jobs.json")).unwrap();

        log.save_all(&[record("a", JobStatus::Queued), record("b", JobStatus::Queued)])
            .await
            .unwrap();
        log.save_all(&[record("c", JobStatus::Stopped)]).await.unwrap();

        let loaded = log.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "c");
    }

    #[tokio::test]
    async fn test_save_after_close_fails() {
        let temp_dir = TempDir::new().unwrap();
        let log = FileJobLog::new(temp_dir.path().join("jobs.json")).unwrap();

        log.save_all(&[record("a", JobStatus::Queued)]).await.unwrap();
        log.close().await;

        let result = log.save_all(&[]).await;
        assert!(matches!(result, Err(StoreError::Closed)));
        assert_eq!(log.load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_record_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("jobs.json");
        let log = FileJobLog::new(&path).unwrap();
        log.save_all(&[record("a", JobStatus::Queued)]).await.unwrap();

        let mut document: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        document["records"]
            .as_array_mut()
            .unwrap()
            .push(serde_json::json!({ "name": "broken" }));
        std::fs::write(&path, document.to_string()).unwrap();

        let loaded = log.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "a");
    }

    #[tokio::test]
    async fn test_invalid_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("jobs.json");
        std::fs::write(&path, "{ not json").unwrap();

        let log = FileJobLog::new(&path).unwrap();
        assert!(matches!(
            log.load_all().await,
            Err(StoreError::ParseJson { .. })
        ));
    }

    #[tokio::test]
    async fn test_newer_version_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("jobs.json");
        std::fs::write(&path, r#"{"version": 99, "records": []}"#).unwrap();

        let log = FileJobLog::new(&path).unwrap();
        assert!(matches!(
            log.load_all().await,
            Err(StoreError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn test_default_path() {
        let path = FileJobLog::default_path();
        assert!(path.ends_with("jobs.json"));
    }
}
