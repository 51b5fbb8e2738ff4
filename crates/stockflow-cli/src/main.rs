//! Command-line administration for the stockflow cache and progress store

mod render;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use stockflow_cache::{CacheConfig, CacheManager};
use stockflow_progress::{ObservationOutcome, ProgressConfig, ProgressObserver, ProgressTracker};
use stockflow_utils::{AppConfig, LogFormat, init_tracing_with};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "stockflow")]
#[command(about = "Inspect the stockflow data cache and analysis progress", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tiered data cache
    #[command(subcommand)]
    Cache(CacheCommand),
    /// Analysis progress records
    #[command(subcommand)]
    Progress(ProgressCommand),
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Entry counts and sizes per tier and data type
    Stats,
    /// Remove entries older than the given age
    Cleanup {
        #[arg(long, default_value_t = 7)]
        max_age_days: u64,
    },
}

#[derive(Subcommand, Debug)]
enum ProgressCommand {
    /// Print the current state of one analysis
    Show { analysis_id: String },
    /// Poll an analysis until it finishes (defaults to the latest one)
    Watch {
        analysis_id: Option<String>,
        /// Seconds between polls
        #[arg(long)]
        interval: Option<f64>,
        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<f64>,
    },
    /// Print the id of the most recently updated analysis
    Latest,
    /// List every analysis in the store
    List,
    /// Delete the record of a finished analysis
    Purge { analysis_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let app = AppConfig::from_env();
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        app.log_format
    };
    init_tracing_with(format);

    match cli.command {
        Commands::Cache(command) => run_cache(command).await,
        Commands::Progress(command) => run_progress(command).await,
    }
}

async fn run_cache(command: CacheCommand) -> anyhow::Result<ExitCode> {
    let config = CacheConfig::from_env().context("invalid cache configuration")?;
    let cache = CacheManager::from_config(&config).context("failed to open cache")?;

    match command {
        CacheCommand::Stats => {
            let stats = cache.stats().await;
            println!("{}", render::cache_stats(&stats));
        }
        CacheCommand::Cleanup { max_age_days } => {
            let max_age = days(max_age_days)?;
            info!(max_age_days, "Cleaning cache");
            let removed = cache.cleanup(max_age).await;
            println!("Removed {removed} cache entries older than {max_age_days} days");
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn run_progress(command: ProgressCommand) -> anyhow::Result<ExitCode> {
    let config = ProgressConfig::from_env().context("invalid progress configuration")?;
    let tracker = Arc::new(ProgressTracker::from_config(&config).context("failed to open progress store")?);

    match command {
        ProgressCommand::Show { analysis_id } => match tracker.get(&analysis_id).await {
            Some(record) => println!("{}", render::progress_record(&record)),
            None => {
                println!("{analysis_id}: progress unavailable, the analysis may not have started yet");
                return Ok(ExitCode::FAILURE);
            }
        },
        ProgressCommand::Watch {
            analysis_id,
            interval,
            timeout,
        } => {
            let analysis_id = match analysis_id {
                Some(id) => id,
                None => tracker
                    .latest_analysis_id()
                    .await
                    .context("no analyses in the progress store")?,
            };

            let mut observer = ProgressObserver::new(tracker.clone(), &config);
            if let Some(secs) = interval {
                observer = observer.poll_interval(seconds(secs, "--interval")?);
            }
            if let Some(secs) = timeout {
                observer = observer.max_duration(seconds(secs, "--timeout")?);
            }

            let outcome = observer
                .observe(&analysis_id, |view| println!("{}", render::progress_line(view)))
                .await;

            return Ok(match outcome {
                ObservationOutcome::Completed(record) => {
                    println!("{}", render::progress_record(&record));
                    ExitCode::SUCCESS
                }
                ObservationOutcome::Failed(record) => {
                    println!("{}", render::progress_record(&record));
                    ExitCode::FAILURE
                }
                ObservationOutcome::Stalled { waited, .. } => {
                    println!(
                        "{analysis_id}: no final state after {}, the analysis may be stuck",
                        stockflow_progress::format_duration(waited.as_secs_f64())
                    );
                    ExitCode::from(2)
                }
            });
        }
        ProgressCommand::Latest => match tracker.latest_analysis_id().await {
            Some(id) => println!("{id}"),
            None => return Ok(ExitCode::FAILURE),
        },
        ProgressCommand::List => {
            let mut records = tracker.list().await;
            records.sort_by(|a, b| b.last_update.cmp(&a.last_update));
            println!("{}", render::progress_list(&records));
        }
        ProgressCommand::Purge { analysis_id } => {
            if tracker.purge(&analysis_id).await {
                println!("Purged {analysis_id}");
            } else {
                println!("{analysis_id}: nothing to purge");
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn seconds(value: f64, flag: &str) -> anyhow::Result<Duration> {
    match Duration::try_from_secs_f64(value) {
        Ok(duration) if !duration.is_zero() => Ok(duration),
        _ => anyhow::bail!("{flag} must be a positive number of seconds, got {value}"),
    }
}

fn days(count: u64) -> anyhow::Result<Duration> {
    count
        .checked_mul(24 * 60 * 60)
        .map(Duration::from_secs)
        .with_context(|| format!("--max-age-days {count} is too large"))
}
