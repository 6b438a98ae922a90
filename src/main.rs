//! Depot - bundle fetcher and launcher
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use depot::cli::{Cli, Commands};
use depot::config::ConfigManager;
use depot::error::DepotResult;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_cancelled() => {
            // User-initiated; not reported as a failure.
            eprintln!("{} {}", style("Cancelled:").yellow().bold(), e);
            ExitCode::from(130)
        }
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> DepotResult<()> {
    let cli = Cli::parse();

    // Initialize logging: 0 = warn (progress bars only), 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("depot=warn"),
        1 => EnvFilter::new("depot=info"),
        _ => EnvFilter::new("depot=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    depot::ui::init_theme();

    // Init command doesn't need config loading
    if let Commands::Init(args) = cli.command {
        return depot::cli::commands::init(args).await;
    }

    // Load configuration
    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    let config = config_manager.load().await?;

    // Ensure state directories exist
    ConfigManager::ensure_state_dirs().await?;

    // Dispatch to command
    match cli.command {
        Commands::Init(_) => unreachable!("Init handled above"),
        Commands::Install(args) => depot::cli::commands::install(args, &config).await,
        Commands::Launch(args) => depot::cli::commands::launch(args, &config).await,
        Commands::Stop(args) => depot::cli::commands::stop(args, &config).await,
        Commands::Status => depot::cli::commands::status(&config).await,
        Commands::Cache(args) => depot::cli::commands::cache(args, &config).await,
    }
}
