//! HB Fetcher CLI application
//!
//! Command-line interface for listing and downloading a Humble Bundle library.
//! Exits with 1 on a fatal error and 2 when the run finished with failed or
//! cancelled files.

use std::process;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use hb_fetcher::app::{create_shutdown_channel, SignalHandler};
use hb_fetcher::cli::{handle_download, handle_list, Cli, ProgressConfig};
use hb_fetcher::config::{Action, AppConfig, Settings};

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };
    process::exit(code);
}

/// Main application logic
async fn run() -> anyhow::Result<i32> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();

    let (config, config_path) = AppConfig::load(cli.global.config.as_deref())
        .await
        .context("loading configuration")?;
    init_logging(&cli, config.debug);

    info!("HB Fetcher v{} starting", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        info!("Using config file {}", path.display());
    }

    let settings = Settings::resolve(config, cli.overrides(), cli.action())
        .context("resolving settings")?;

    let (trigger, shutdown) = create_shutdown_channel();
    let signals = SignalHandler::new(trigger).setup();

    let code = match settings.action.clone() {
        Action::List {
            sort_by_date,
            print_url,
        } => {
            info!("Executing list command");
            handle_list(&settings, sort_by_date, print_url, shutdown).await?;
            0
        }
        Action::Download => {
            info!("Executing download command");
            let progress = if cli.global.quiet {
                ProgressConfig::quiet()
            } else {
                ProgressConfig::default()
            };
            let result = handle_download(&settings, shutdown, progress).await?;
            if result.has_failures() || result.was_cancelled() {
                warn!(
                    "{} files failed, {} cancelled, {} orders not fetched",
                    result.failed, result.cancelled, result.orders_skipped
                );
                2
            } else {
                0
            }
        }
    };

    signals.abort();
    Ok(code)
}

/// Initialize logging based on CLI verbosity settings
fn init_logging(cli: &Cli, config_debug: bool) {
    let log_level = if config_debug && !cli.global.quiet {
        tracing::Level::DEBUG
    } else {
        cli.log_level()
    };

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("hb_fetcher={}", log_level).parse() {
        filter = filter.add_directive(directive);
    }

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(log_level >= tracing::Level::DEBUG)
        .with_writer(std::io::stderr)
        .init();

    if log_level >= tracing::Level::DEBUG {
        info!("Debug logging enabled");
    }
}
