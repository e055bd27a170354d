//! offline-daemon: Native host for the offline queue.
//!
//! Persists analyses and images under a data directory and flushes them to
//! the backend API, either once (`sync`) or periodically (`run`).

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use offline_core::OfflineService;
use offline_daemon::{Config, SyncLoop, build_service, queue_image_file, save_analysis_file};

#[derive(Parser, Debug)]
#[command(name = "offline-daemon")]
#[command(about = "Offline analysis storage and upload queue")]
struct Args {
    /// Directory holding the stored document and config.json
    #[arg(short, long, env = "OFFLINE_DATA_DIR", default_value = ".offline-data")]
    data_dir: PathBuf,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sync periodically until interrupted
    Run,
    /// Run a single sync pass
    Sync,
    /// Show pending counts, last sync time and storage usage
    Status,
    /// Queue an image file for upload
    QueueImage {
        /// Image file to encode and queue
        path: PathBuf,
    },
    /// Save an analysis (JSON file) for offline access and upload
    SaveAnalysis {
        /// JSON file containing one analysis result
        path: PathBuf,
    },
    /// Print the stored analysis history as JSON
    List,
    /// Delete all offline data
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,offline_daemon=debug"
    } else {
        "info,offline_daemon=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!("Data directory: {:?}", args.data_dir);
    let config = Config::load(&args.data_dir)?;
    let service = build_service(&args.data_dir, &config)?;

    // Events stand in for UI notifications
    let _events = service.events().subscribe(|event| {
        if event.is_error() {
            warn!("{}", event.message());
        } else {
            info!("{}", event.message());
        }
    });

    service.queue().initialize().await?;

    match args.command {
        Command::Run => run(&service, &config).await,
        Command::Sync => {
            let report = service.sync().sync_offline_data().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Status => status(&service).await,
        Command::QueueImage { path } => {
            let id = queue_image_file(&service, &path).await?;
            println!("{id}");
            Ok(())
        }
        Command::SaveAnalysis { path } => {
            let id = save_analysis_file(&service, &path).await?;
            println!("{id}");
            Ok(())
        }
        Command::List => {
            let analyses = service.queue().get_offline_analyses().await?;
            println!("{}", serde_json::to_string_pretty(&analyses)?);
            Ok(())
        }
        Command::Clear => {
            service.queue().clear_offline_data().await?;
            Ok(())
        }
    }
}

async fn run(service: &OfflineService, config: &Config) -> Result<()> {
    info!(
        "Syncing every {}s to {}. Press Ctrl+C to stop.",
        config.sync.interval_secs, config.sink.endpoint
    );

    let sync_loop = SyncLoop::new(config.sync.clone());
    sync_loop
        .run(service, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        })
        .await;

    info!("Shutting down");
    Ok(())
}

async fn status(service: &OfflineService) -> Result<()> {
    let counts = service.queue().pending_counts().await?;
    let last_sync = service.queue().get_last_sync_timestamp().await?;
    let quota = service.storage_quota_or_zero().await;

    println!("Pending images:    {}", counts.images);
    println!("Pending analyses:  {}", counts.analyses);
    println!("Last sync (ms):    {}", last_sync);
    match quota.usage_ratio() {
        Some(ratio) => println!(
            "Storage:           {} of {} bytes ({:.2}%)",
            quota.used,
            quota.available,
            ratio * 100.0
        ),
        None => println!("Storage:           unknown"),
    }
    Ok(())
}
