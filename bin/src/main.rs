//! warren CLI - download job manager.

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use warren_core::Settings;
use warren_core::sim::SimConfig;

mod commands;
mod display;

#[derive(Parser)]
#[command(name = "warren")]
#[command(about = "Download job manager for torrents and magnet links", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (errors only, no progress output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Directory job data is stored in
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Location of the job database
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Tracker added to every started job (repeatable)
    #[arg(long = "tracker", global = true)]
    trackers: Vec<String>,

    /// Maximum established connections per job
    #[arg(long, global = true)]
    max_conns: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add sources and download until every job has completed
    Run {
        /// `.torrent` files, magnet links, `infohash:<hash>` or bare hashes
        sources: Vec<String>,

        /// Simulated download rate in bytes per second
        #[arg(long, default_value = "4000000")]
        rate: u64,

        /// Simulated metadata lookup delay in milliseconds
        #[arg(long, default_value = "1500")]
        metadata_delay: u64,
    },

    /// List persisted jobs
    List {
        /// Include completed jobs
        #[arg(long)]
        all: bool,
    },

    /// Remove completed jobs from the database
    Clean,

    /// Show the contents of a `.torrent` file
    Inspect {
        /// Path to the `.torrent` file
        file: PathBuf,
    },
}

impl Cli {
    fn settings(&self) -> Settings {
        let mut settings = Settings::default();
        if let Some(dir) = &self.data_dir {
            settings = settings.with_data_dir(dir);
        }
        if let Some(db) = &self.db {
            settings = settings.with_db_path(db);
        }
        if !self.trackers.is_empty() {
            settings = settings.with_trackers(self.trackers.clone());
        }
        if let Some(max) = self.max_conns {
            settings = settings.with_max_established_conns(max);
        }
        settings
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    let settings = cli.settings();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        Commands::Run {
            sources,
            rate,
            metadata_delay,
        } => {
            let sim = SimConfig::timed(rate, Duration::from_millis(metadata_delay));
            commands::run::run(settings, &sources, sim, cli.quiet).await
        }
        Commands::List { all } => commands::list::list(&settings, all).await,
        Commands::Clean => commands::clean::clean(&settings).await,
        Commands::Inspect { file } => commands::inspect::inspect(&file),
    }
}
