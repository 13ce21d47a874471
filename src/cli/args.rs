//! Command-line argument parsing for HB Fetcher
//!
//! The CLI structure uses clap derive macros. Global options override the
//! config file; the subcommand selects the action and defaults to `download`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{Action, Overrides};

/// HB Fetcher - Download your Humble Bundle library
#[derive(Parser, Debug)]
#[command(
    name = "hb_fetcher",
    version,
    about = "Download and verify every file of a Humble Bundle library",
    long_about = "Lists purchased orders and downloads their files concurrently.
Transfers resume after interruption, content is verified against declared checksums
and a hash index makes repeated runs skip files that are already up to date."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand; `download` when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode - errors only
    #[arg(short, long, global = true, conflicts_with_all = ["debug", "verbose"])]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory to download into
    #[arg(short = 'l', long, global = true, value_name = "DIR")]
    pub download_location: Option<PathBuf>,

    /// Session cookie value (`_simple_auth`)
    #[arg(short = 'c', long, global = true, value_name = "COOKIE")]
    pub auth_cookie: Option<String>,

    /// Chunk size for downloading and hashing, in bytes
    #[arg(long, global = true, value_name = "BYTES")]
    pub chunk_size: Option<usize>,

    /// Number of concurrent file transfers
    #[arg(short = 'w', long, global = true)]
    pub workers: Option<usize>,

    /// Put every file straight into the download location
    #[arg(long, global = true)]
    pub no_order_folders: bool,

    /// Discard partial downloads instead of resuming them
    #[arg(long, global = true)]
    pub no_resume: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Print the purchased orders
    List(ListArgs),

    /// Download the library
    Download(DownloadArgs),
}

/// Arguments for the list command
#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Sort orders by purchase date, oldest first
    #[arg(long)]
    pub sort_by_date: bool,

    /// Print the storefront URL of each order
    #[arg(short = 'u', long)]
    pub print_url: bool,
}

/// Arguments for the download command
#[derive(Args, Debug, Clone, Default)]
pub struct DownloadArgs {
    /// Only download the order with this key
    #[arg(long, value_name = "KEY")]
    pub bundle_id: Option<String>,

    /// Platforms or groups (games, ebooks, audio) to download
    #[arg(short = 'p', long = "platform", value_name = "PLATFORM")]
    pub platforms: Vec<String>,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the logging level based on global arguments
    pub fn log_level(&self) -> tracing::Level {
        if self.global.quiet {
            tracing::Level::ERROR
        } else if self.global.debug {
            tracing::Level::DEBUG
        } else if self.global.verbose {
            tracing::Level::INFO
        } else {
            tracing::Level::WARN
        }
    }

    /// The selected action
    pub fn action(&self) -> Action {
        match &self.command {
            Some(Commands::List(args)) => Action::List {
                sort_by_date: args.sort_by_date,
                print_url: args.print_url,
            },
            Some(Commands::Download(_)) | None => Action::Download,
        }
    }

    /// Values that override the config file
    pub fn overrides(&self) -> Overrides {
        let download = match &self.command {
            Some(Commands::Download(args)) => args.clone(),
            _ => DownloadArgs::default(),
        };

        Overrides {
            download_location: self.global.download_location.clone(),
            session_cookie: self.global.auth_cookie.clone(),
            chunk_size: self.global.chunk_size,
            workers: self.global.workers,
            no_order_folders: self.global.no_order_folders,
            no_resume: self.global.no_resume,
            debug: self.global.debug,
            platforms: download.platforms,
            bundle_id: download.bundle_id,
        }
    }
}
