//! List command implementation.

use anyhow::{Context, Result};
use warren_core::{FileJobLog, JobLog, JobStatus, Settings};

/// Print persisted jobs. Completed jobs are hidden unless `all` is set.
pub(crate) async fn list(settings: &Settings, all: bool) -> Result<()> {
    let log = FileJobLog::new(&settings.db_path).context("Failed to open job database")?;
    let records = log.load_all().await.context("Failed to load jobs")?;

    let shown: Vec<_> = records
        .iter()
        .filter(|record| all || record.status != JobStatus::Completed)
        .collect();

    if shown.is_empty() {
        println!("No jobs found.");
        if !all {
            println!("Use --all to include completed jobs.");
        }
        return Ok(());
    }

    println!(
        "{:<40} {:<10} {:<30} {:<16}",
        "INFO HASH", "STATUS", "NAME", "ADDED"
    );
    println!("{}", "-".repeat(98));

    for record in &shown {
        println!(
            "{:<40} {:<10} {:<30} {:<16}",
            record.info_hash,
            record.status.as_str(),
            truncate(&record.name, 30),
            record.added_at.format("%Y-%m-%d %H:%M"),
        );
    }

    println!("\nTotal: {} jobs", shown.len());
    Ok(())
}

fn truncate(name: &str, width: usize) -> String {
    if name.chars().count() <= width {
        return name.to_string();
    }
    let mut short: String = name.chars().take(width.saturating_sub(3)).collect();
    short.push_str("...");
    short
}
