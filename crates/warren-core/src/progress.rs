//! Progress sampling and display snapshots.
//!
//! Byte counts reported by the engine are noisy, so throughput and ETA are
//! only recomputed once at least [`ProgressSampler::SAMPLE_INTERVAL`] has
//! passed since the last accepted sample and the percentage has grown.
//! Between accepted samples the previous display values are kept.

use chrono::{DateTime, Utc};
use indicatif::DecimalBytes;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use warren_types::{InfoHash, JobRecord, JobStatus};

/// Placeholder shown until a rate can be computed.
pub const ESTIMATING: &str = "Estimating";

/// Priority reported for every file. Per-file priorities are not tracked.
const NORMAL_PRIORITY: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Sample {
    at: Instant,
    percentage: f64,
}

/// Derives percentage, throughput and ETA from periodic byte counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSampler {
    last: Option<Sample>,
    throughput: Option<f64>,
    eta: Option<Duration>,
}

impl ProgressSampler {
    /// Minimum time between two accepted samples.
    pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

    /// Creates a sampler with no history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an observation and returns the current completion fraction.
    ///
    /// A job with zero total length is complete. The first observation
    /// becomes the baseline. Later observations update throughput and ETA
    /// only when the interval has elapsed and the fraction grew.
    pub fn observe(&mut self, now: Instant, completed: u64, total: u64) -> f64 {
        let current = fraction(completed, total);

        let Some(last) = self.last else {
            self.last = Some(Sample {
                at: now,
                percentage: current,
            });
            return current;
        };

        let elapsed = now.saturating_duration_since(last.at).as_secs_f64();
        let delta = current - last.percentage;

        if elapsed >= Self::SAMPLE_INTERVAL.as_secs_f64() && delta > 0.0 {
            let rate = delta / elapsed;
            self.throughput = Some(delta * total as f64 / elapsed);
            self.eta = Some(
                Duration::try_from_secs_f64(((1.0 - current) / rate).max(0.0))
                    .unwrap_or(Duration::MAX),
            );
            self.last = Some(Sample {
                at: now,
                percentage: current,
            });
        }

        current
    }

    /// Returns the fraction recorded by the last accepted sample.
    #[must_use]
    pub fn percentage(&self) -> f64 {
        self.last.map_or(0.0, |s| s.percentage)
    }

    /// Returns when the last sample was accepted.
    #[must_use]
    pub fn last_sampled(&self) -> Option<Instant> {
        self.last.map(|s| s.at)
    }

    /// Returns the throughput in bytes per second, once known.
    #[must_use]
    pub const fn bytes_per_second(&self) -> Option<f64> {
        self.throughput
    }

    /// Returns the estimated time remaining, once known.
    #[must_use]
    pub const fn remaining(&self) -> Option<Duration> {
        self.eta
    }

    /// Returns the throughput as decimal byte units per second.
    #[must_use]
    pub fn throughput_text(&self) -> String {
        self.throughput.map_or_else(
            || ESTIMATING.to_string(),
            |rate| format!("{}/s", DecimalBytes(rate as u64)),
        )
    }

    /// Returns the estimated time remaining as text.
    #[must_use]
    pub fn eta_text(&self) -> String {
        self.eta
            .map_or_else(|| ESTIMATING.to_string(), humanize_duration)
    }

    /// Forgets all history.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn fraction(completed: u64, total: u64) -> f64 {
    if total == 0 {
        return 1.0;
    }
    (completed as f64 / total as f64).min(1.0)
}

/// Renders a duration as "N seconds", "N minutes N seconds" and so on up to
/// days.
#[must_use]
pub fn humanize_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (days, hours, minutes, seconds) = (
        total / 86_400,
        total / 3_600 % 24,
        total / 60 % 60,
        total % 60,
    );

    match total {
        0..60 => format!("{seconds} seconds"),
        60..3_600 => format!("{} minutes {seconds} seconds", total / 60),
        3_600..86_400 => format!("{} hours {minutes} minutes {seconds} seconds", total / 3_600),
        _ => format!("{days} days {hours} hours {minutes} minutes {seconds} seconds"),
    }
}

/// A file in a job snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    /// Path relative to the torrent root.
    pub path: PathBuf,
    /// Download priority.
    pub priority: u8,
    /// Human readable size.
    pub size: String,
}

/// Display state of one job. Derived on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// The job identifier.
    pub info_hash: InfoHash,
    /// Display name.
    pub name: String,
    /// Current status.
    pub status: JobStatus,
    /// Storage directory.
    pub storage_path: PathBuf,
    /// Human readable content size, once known.
    pub total_length: Option<String>,
    /// Fraction downloaded, in `[0, 1]`.
    pub percentage: f64,
    /// Human readable throughput.
    pub throughput: String,
    /// Human readable time remaining.
    pub eta: String,
    /// Per-file breakdown.
    pub files: Vec<FileInfo>,
    /// When the job was created.
    pub added_at: DateTime<Utc>,
}

impl Snapshot {
    pub(crate) fn build(record: &JobRecord, sampler: &ProgressSampler) -> Self {
        let percentage = match record.status {
            JobStatus::Completed => 1.0,
            JobStatus::Analysing => 0.0,
            _ => sampler.percentage(),
        };

        let files = record
            .metainfo
            .iter()
            .flat_map(|m| &m.files)
            .map(|f| FileInfo {
                path: f.path.clone(),
                priority: NORMAL_PRIORITY,
                size: DecimalBytes(f.length).to_string(),
            })
            .collect();

        Self {
            info_hash: record.info_hash,
            name: record.name.clone(),
            status: record.status,
            storage_path: record.storage_path.clone(),
            total_length: record.total_length().map(|n| DecimalBytes(n).to_string()),
            percentage,
            throughput: sampler.throughput_text(),
            eta: sampler.eta_text(),
            files,
            added_at: record.added_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warren_types::Metainfo;

    const TOTAL: u64 = 1_000_000;

    #[test]
    fn test_first_observation_is_baseline() {
        let mut sampler = ProgressSampler::new();
        let current = sampler.observe(Instant::now(), 250_000, TOTAL);

        assert!((current - 0.25).abs() < f64::EPSILON);
        assert!((sampler.percentage() - 0.25).abs() < f64::EPSILON);
        assert_eq!(sampler.throughput_text(), ESTIMATING);
        assert_eq!(sampler.eta_text(), ESTIMATING);
    }

    #[test]
    fn test_updates_within_interval_are_ignored() {
        let start = Instant::now();
        let mut sampler = ProgressSampler::new();
        sampler.observe(start, 0, TOTAL);
        sampler.observe(start + Duration::from_millis(1_000), 100_000, TOTAL);
        let before = sampler.clone();

        sampler.observe(start + Duration::from_millis(1_200), 150_000, TOTAL);
        sampler.observe(start + Duration::from_millis(1_500), 200_000, TOTAL);
        assert_eq!(sampler, before);

        sampler.observe(start + Duration::from_millis(2_700), 300_000, TOTAL);
        assert_ne!(sampler.bytes_per_second(), before.bytes_per_second());
    }

    #[test]
    fn test_rate_and_eta() {
        let start = Instant::now();
        let mut sampler = ProgressSampler::new();
        sampler.observe(start, 0, 1_000);
        sampler.observe(start + Duration::from_secs(2), 500, 1_000);

        let rate = sampler.bytes_per_second().unwrap();
        assert!((rate - 250.0).abs() < 1e-9);
        assert_eq!(sampler.remaining(), Some(Duration::from_secs(2)));
        assert_eq!(sampler.throughput_text(), "250 B/s");
        assert_eq!(sampler.eta_text(), "2 seconds");
    }

    #[test]
    fn test_no_progress_keeps_previous_values() {
        let start = Instant::now();
        let mut sampler = ProgressSampler::new();
        sampler.observe(start, 0, TOTAL);
        sampler.observe(start + Duration::from_secs(1), 100_000, TOTAL);
        let before = sampler.clone();

        sampler.observe(start + Duration::from_secs(5), 100_000, TOTAL);
        sampler.observe(start + Duration::from_secs(6), 50_000, TOTAL);
        assert_eq!(sampler, before);
    }

    #[test]
    fn test_percentage_non_decreasing() {
        let start = Instant::now();
        let mut sampler = ProgressSampler::new();
        let mut seen = 0.0;

        for (i, bytes) in [0, 100, 50, 400, 300, 900, 1_000].into_iter().enumerate() {
            sampler.observe(start + Duration::from_secs(i as u64 * 2), bytes, 1_000);
            assert!(sampler.percentage() >= seen);
            seen = sampler.percentage();
        }
        assert!((seen - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_total_is_complete() {
        let mut sampler = ProgressSampler::new();
        assert!((sampler.observe(Instant::now(), 0, 0) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_humanize_duration() {
        assert_eq!(humanize_duration(Duration::from_secs(0)), "0 seconds");
        assert_eq!(humanize_duration(Duration::from_secs(59)), "59 seconds");
        assert_eq!(humanize_duration(Duration::from_secs(61)), "1 minutes 1 seconds");
        assert_eq!(
            humanize_duration(Duration::from_secs(3 * 3_600 + 120 + 5)),
            "3 hours 2 minutes 5 seconds"
        );
        assert_eq!(
            humanize_duration(Duration::from_secs(2 * 86_400 + 3_600 + 60 + 1)),
            "2 days 1 hours 1 minutes 1 seconds"
        );
    }

    #[test]
    fn test_snapshot_of_completed_record() {
        let mut record =
            JobRecord::from_metainfo(Metainfo::single_file("disk.img", 2_000_000).unwrap(), "/d");
        record.mark_completed();

        let snapshot = Snapshot::build(&record, &ProgressSampler::new());
        assert!((snapshot.percentage - 1.0).abs() < f64::EPSILON);
        assert_eq!(snapshot.total_length.as_deref(), Some("2.00 MB"));
        assert_eq!(snapshot.files.len(), 1);
        assert_eq!(snapshot.files[0].size, "2.00 MB");
        assert_eq!(snapshot.status, JobStatus::Completed);
    }
}
