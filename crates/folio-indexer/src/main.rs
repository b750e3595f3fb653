//! folio-indexer - hotfolder indexing daemon

use anyhow::Result;
use clap::Parser;
use folio_common::logging::{init_logging, LogConfig, LogLevel};
use folio_core::EngineConfig;
use folio_indexer::{Daemon, DaemonConfig};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "folio-indexer")]
#[command(author, version, about = "Hotfolder metadata indexing daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Watched input directory, overriding FOLIO_HOTFOLDER
    #[arg(long)]
    hotfolder: Option<std::path::PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Run the polling daemon
    Run,

    /// Process everything currently queued, then exit
    Once,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A .env file is honored in development; real deployments set the
    // environment directly
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("folio-indexer".to_string())
        .build();

    // Merge with environment variables (they take precedence)
    let log_config = LogConfig::from_env().unwrap_or(log_config);

    init_logging(&log_config)?;

    let mut config = DaemonConfig::from_env()?;
    if let Some(hotfolder) = cli.hotfolder {
        config.hotfolder = hotfolder;
    }
    let engine = EngineConfig::from_env()?;
    let daemon = Daemon::new(config, engine)?;

    match cli.command {
        Command::Run => daemon.run().await?,
        Command::Once => {
            let processed = daemon.scan_once().await?;
            info!(processed, "single scan complete");
        },
    }

    Ok(())
}
