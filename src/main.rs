// skywave - focus-aware internet radio for the terminal
// Streams one station, holds a wake lock while it plays, keeps a persistent
// notification up, and gets out of the way when something else needs audio

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use skywave::config::Config;
use skywave::service::RadioService;

#[derive(Parser)]
#[command(name = "skywave")]
#[command(about = "Streams a single internet radio station with focus-aware playback")]
struct Args {
    /// Enable developer logging (stderr + debug output)
    #[arg(long)]
    dev: bool,

    /// Stream URL, overriding the configured station
    #[arg(long)]
    url: Option<String>,

    /// Alternate config file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_logging(dev: bool) -> Result<()> {
    // Daily rotating file logs next to the working directory
    let log_dir = PathBuf::from("logs");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "skywave.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    let base_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,skywave=debug"));

    let subscriber = tracing_subscriber::fmt()
        .with_writer(file_writer)
        .with_target(true)
        .with_level(true)
        .with_ansi(false)
        .with_env_filter(base_filter)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if dev {
        eprintln!("Dev mode: debug output mirrored to logs/skywave.log");
    }

    // Keep the appender alive for the life of the process
    std::mem::forget(_guard);

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.dev)?;
    info!("skywave starting up");

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(url) = args.url {
        config.station.stream_url = url;
    }

    let mut service = RadioService::new(config);
    service.run().await?;

    Ok(())
}
