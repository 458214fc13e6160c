//! Clean command implementation.

use anyhow::{Context, Result};
use warren_core::{FileJobLog, JobLog, JobStatus, Settings};

/// Remove completed jobs from the database. Their data stays on disk.
pub(crate) async fn clean(settings: &Settings) -> Result<()> {
    let log = FileJobLog::new(&settings.db_path).context("Failed to open job database")?;
    let records = log.load_all().await.context("Failed to load jobs")?;
    let before = records.len();

    let kept: Vec<_> = records
        .into_iter()
        .filter(|record| record.status != JobStatus::Completed)
        .collect();
    let removed = before - kept.len();

    if removed > 0 {
        log.save_all(&kept).await.context("Failed to save jobs")?;
    }
    log.close().await;

    println!("Removed {removed} completed jobs ({} remaining)", kept.len());
    Ok(())
}
