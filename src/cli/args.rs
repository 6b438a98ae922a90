//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Depot - bundle fetcher and launcher
///
/// Downloads large software bundles with resume support, keeps them in a
/// bounded cache, unpacks them, and runs them on coordinated local ports.
#[derive(Parser, Debug)]
#[command(name = "depot")]
#[command(author, version, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "DEPOT_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download one or more archives and unpack them
    Install(InstallArgs),

    /// Start a bundle's process on a coordinated port
    Launch(LaunchArgs),

    /// Stop the process owning a port
    Stop(StopArgs),

    /// Show recorded ports and their owners
    Status,

    /// Inspect or clean the content cache
    Cache(CacheArgs),

    /// Write a default config.toml
    Init(InitArgs),
}

/// Arguments for the install command
#[derive(Parser, Debug)]
pub struct InstallArgs {
    /// Source URL(s); multiple URLs form one batch install
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Directory the archive is unpacked into
    #[arg(short, long)]
    pub dest: PathBuf,

    /// Cache folder name (derived from the first URL if omitted)
    #[arg(long)]
    pub cache_key: Option<String>,

    /// Declared size in bytes per URL, in order; enables whole-batch
    /// percent and fail-fast size validation
    #[arg(long = "size")]
    pub sizes: Vec<u64>,
}

/// Arguments for the launch command
#[derive(Parser, Debug)]
pub struct LaunchArgs {
    /// Executable to start
    pub program: PathBuf,

    /// Label recorded in the port lock (defaults to the program name)
    #[arg(short, long)]
    pub label: Option<String>,

    /// Insist on one port instead of probing the configured range
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Working directory for the process
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Arguments passed to the program
    #[arg(last = true)]
    pub args: Vec<String>,
}

/// Arguments for the stop command
#[derive(Parser, Debug)]
pub struct StopArgs {
    /// Port whose owner should be stopped
    pub port: u16,

    /// Kill listeners even without a valid ownership record
    #[arg(short, long)]
    pub force: bool,

    /// Auto-approve the kill prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cached entries with sizes
    List,

    /// Evict old entries and sweep abandoned partial downloads
    Clean {
        /// Only sweep stale partials, skip eviction
        #[arg(long)]
        stale_only: bool,
    },
}

/// Arguments for the init command
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config file
    #[arg(short, long)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_structure_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn install_parses_multiple_urls_and_sizes() {
        let cli = Cli::parse_from([
            "depot",
            "install",
            "https://e.com/a.7z.001",
            "https://e.com/a.7z.002",
            "--dest",
            "/opt/bundle",
            "--size",
            "100",
            "--size",
            "50",
        ]);
        match cli.command {
            Commands::Install(args) => {
                assert_eq!(args.urls.len(), 2);
                assert_eq!(args.sizes, vec![100, 50]);
            }
            other => panic!("expected install, got {other:?}"),
        }
    }

    #[test]
    fn launch_passes_trailing_args() {
        let cli = Cli::parse_from([
            "depot", "launch", "/opt/b/server", "--port", "9100", "--", "--headless",
        ]);
        match cli.command {
            Commands::Launch(args) => {
                assert_eq!(args.port, Some(9100));
                assert_eq!(args.args, vec!["--headless"]);
            }
            other => panic!("expected launch, got {other:?}"),
        }
    }
}
