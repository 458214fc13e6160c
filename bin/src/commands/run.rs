//! Run command implementation.
//!
//! Opens the job manager on the simulated engine, adds the given sources,
//! starts every idle job and renders progress until all jobs have completed
//! or the user interrupts.

use crate::display::ProgressBoard;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use warren_core::sim::{SimConfig, SimulatedBackend};
use warren_core::{Admission, JobManager, JobStatus, MessageKind, Settings};

/// Interval between progress queries.
const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Execute the run command.
pub(crate) async fn run(
    settings: Settings,
    sources: &[String],
    sim: SimConfig,
    quiet: bool,
) -> Result<()> {
    let backend = Arc::new(SimulatedBackend::with_file_log(sim));
    let manager = JobManager::launch(backend, settings)
        .await
        .context("Failed to start job manager")?;

    let outcome = drive(&manager, sources, quiet).await;

    manager
        .cleanup()
        .await
        .context("Failed to persist jobs on shutdown")?;
    outcome
}

async fn drive(manager: &Arc<JobManager>, sources: &[String], quiet: bool) -> Result<()> {
    for source in sources {
        let admission = add_source(manager, source)
            .await
            .with_context(|| format!("Failed to add {source}"))?;
        let record = admission.record();
        if !quiet {
            let verb = if admission.is_new() { "Added" } else { "Already present" };
            println!("{verb}: {} ({})", record.name, record.info_hash);
        }
    }

    for record in manager.records().await {
        if matches!(record.status, JobStatus::Queued | JobStatus::Stopped) {
            manager
                .start(record.info_hash)
                .await
                .with_context(|| format!("Failed to start {}", record.name))?;
        }
    }

    if manager.records().await.is_empty() {
        println!("No jobs to run.");
        return Ok(());
    }

    let mut board = ProgressBoard::new(quiet)?;
    let mut notifications = manager.subscribe();
    let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            result = &mut interrupt => {
                if let Err(e) = result {
                    warn!(error = %e, "failed to listen for interrupt");
                }
                board.abandon();
                info!("interrupted, shutting down");
                return Ok(());
            }
            _ = ticker.tick() => {}
            received = notifications.recv() => match received {
                Ok(MessageKind::RefreshInfo) | Err(RecvError::Lagged(_)) => {}
                Ok(MessageKind::GetInfo) => continue,
                Err(RecvError::Closed) => return Ok(()),
            },
        }

        if board.refresh(manager).await {
            board.finish();
            if !quiet {
                println!("All jobs completed.");
            }
            return Ok(());
        }
    }
}

async fn add_source(manager: &Arc<JobManager>, source: &str) -> warren_core::Result<Admission> {
    let path = Path::new(source);
    if path.is_file() {
        manager.add_torrent_file(path, None).await
    } else {
        manager.add_descriptor(source, None).await
    }
}
