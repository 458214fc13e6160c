//! Progress rendering for the warren CLI.

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use warren_core::{
    EngineMessage, InfoHash, JobManager, JobStatus, MessageFromWeb, ProgressInfo, Snapshot,
};

/// Bar length. Percentages are scaled onto it.
const BAR_SCALE: u64 = 1_000;

/// One progress bar per job, refreshed from manager queries.
pub(crate) struct ProgressBoard {
    multi: MultiProgress,
    style: ProgressStyle,
    bars: HashMap<InfoHash, ProgressBar>,
}

impl ProgressBoard {
    pub(crate) fn new(quiet: bool) -> Result<Self> {
        let multi = if quiet {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };
        let style = ProgressStyle::default_bar()
            .template("{prefix:.bold} [{bar:30.cyan/blue}] {percent:>3}% {msg}")?
            .progress_chars("=>-");

        Ok(Self {
            multi,
            style,
            bars: HashMap::new(),
        })
    }

    /// Brings every bar up to date. Returns true once every job has
    /// completed.
    pub(crate) async fn refresh(&mut self, manager: &JobManager) -> bool {
        let snapshots = manager.snapshots().await;
        let mut finished = !snapshots.is_empty();

        for snapshot in &snapshots {
            let bar = self.bar_for(snapshot);
            match snapshot.status {
                JobStatus::Analysing => bar.set_message("resolving metadata"),
                JobStatus::Running => {
                    let reply = manager
                        .handle_message(&MessageFromWeb::get_info(snapshot.info_hash))
                        .await;
                    if let Some(EngineMessage::GetInfo(info)) = reply {
                        show_progress(bar, &info, snapshot);
                    }
                }
                JobStatus::Completed => {
                    if !bar.is_finished() {
                        bar.set_position(BAR_SCALE);
                        bar.finish_with_message(
                            snapshot.total_length.clone().unwrap_or_default(),
                        );
                    }
                }
                JobStatus::Queued | JobStatus::Stopped => {
                    bar.set_message(snapshot.status.as_str());
                }
            }
            finished &= snapshot.status.is_finished();
        }

        finished
    }

    fn bar_for(&mut self, snapshot: &Snapshot) -> &ProgressBar {
        let bar = self.bars.entry(snapshot.info_hash).or_insert_with(|| {
            let bar = self.multi.add(ProgressBar::new(BAR_SCALE));
            bar.set_style(self.style.clone());
            bar
        });
        bar.set_prefix(snapshot.name.clone());
        bar
    }

    /// Leaves the bars on screen as they are.
    pub(crate) fn finish(&self) {
        for bar in self.bars.values() {
            if !bar.is_finished() {
                bar.finish();
            }
        }
    }

    /// Stops drawing unfinished bars.
    pub(crate) fn abandon(&self) {
        for bar in self.bars.values() {
            if !bar.is_finished() {
                bar.abandon_with_message("interrupted");
            }
        }
    }
}

fn show_progress(bar: &ProgressBar, info: &ProgressInfo, snapshot: &Snapshot) {
    let position = (info.percentage.clamp(0.0, 1.0) * BAR_SCALE as f64).round() as u64;
    bar.set_position(position);
    bar.set_message(format!(
        "{} of {}, {} left",
        info.throughput,
        snapshot.total_length.as_deref().unwrap_or("?"),
        info.eta
    ));
}
