//! Manager configuration.

use directories::ProjectDirs;
use std::path::PathBuf;
use warren_store::FileJobLog;

/// Default cap on established peer connections per job.
pub const DEFAULT_MAX_ESTABLISHED_CONNS: usize = 50;

/// Settings supplied to a [`JobManager`](crate::JobManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Default storage directory for job data.
    pub data_dir: PathBuf,
    /// Directory resolved `.torrent` files are written to.
    pub tmp_dir: PathBuf,
    /// Location of the job log.
    pub db_path: PathBuf,
    /// Trackers added to every job when it starts.
    pub trackers: Vec<String>,
    /// Established connection cap applied to every running job.
    pub max_established_conns: usize,
}

impl Default for Settings {
    fn default() -> Self {
        let (data_dir, tmp_dir) = ProjectDirs::from("", "", "warren").map_or_else(
            || {
                let base = PathBuf::from(".warren");
                (base.join("downloads"), base.join("torrents"))
            },
            |dirs| (dirs.data_dir().join("downloads"), dirs.cache_dir().join("torrents")),
        );

        Self {
            data_dir,
            tmp_dir,
            db_path: FileJobLog::default_path(),
            trackers: Vec::new(),
            max_established_conns: DEFAULT_MAX_ESTABLISHED_CONNS,
        }
    }
}

impl Settings {
    /// Creates settings rooted at `base`, with data, temp files and the log
    /// all below it.
    #[must_use]
    pub fn rooted_at(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            data_dir: base.join("downloads"),
            tmp_dir: base.join("torrents"),
            db_path: base.join("jobs.json"),
            ..Self::default()
        }
    }

    /// Sets the default storage directory.
    #[must_use]
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Sets the directory for resolved `.torrent` files.
    #[must_use]
    pub fn with_tmp_dir(mut self, tmp_dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = tmp_dir.into();
        self
    }

    /// Sets the job log location.
    #[must_use]
    pub fn with_db_path(mut self, db_path: impl Into<PathBuf>) -> Self {
        self.db_path = db_path.into();
        self
    }

    /// Sets the trackers added to every job.
    #[must_use]
    pub fn with_trackers(mut self, trackers: Vec<String>) -> Self {
        self.trackers = trackers;
        self
    }

    /// Sets the established connection cap.
    #[must_use]
    pub fn with_max_established_conns(mut self, max: usize) -> Self {
        self.max_established_conns = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_connection_cap() {
        assert_eq!(Settings::default().max_established_conns, 50);
    }

    #[test]
    fn test_rooted_at() {
        let settings = Settings::rooted_at("/srv/warren");
        assert_eq!(settings.data_dir, PathBuf::from("/srv/warren/downloads"));
        assert_eq!(settings.tmp_dir, PathBuf::from("/srv/warren/torrents"));
        assert_eq!(settings.db_path, PathBuf::from("/srv/warren/jobs.json"));
    }

    #[test]
    fn test_builders() {
        let settings = Settings::default()
            .with_data_dir("/a")
            .with_tmp_dir("/b")
            .with_db_path("/c/jobs.json")
            .with_trackers(vec!["udp://t".to_string()])
            .with_max_established_conns(7);

        assert_eq!(settings.data_dir, PathBuf::from("/a"));
        assert_eq!(settings.tmp_dir, PathBuf::from("/b"));
        assert_eq!(settings.db_path, PathBuf::from("/c/jobs.json"));
        assert_eq!(settings.trackers, vec!["udp://t"]);
        assert_eq!(settings.max_established_conns, 7);
    }
}
