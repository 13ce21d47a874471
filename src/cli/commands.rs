//! Command handlers for HB Fetcher CLI
//!
//! The handlers wire resolved [`Settings`] into the storefront client, the
//! hash store, the download engine and the orchestrator. They own all user
//! facing output; the core only emits events.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::app::{
    list_orders, BatchResult, BundleOrchestrator, Credential, DownloadEngine, EventSink,
    HashStore, OrderDetail, ShutdownSignal, StorefrontClient,
};
use crate::cli::{ProgressConfig, ProgressDisplay};
use crate::config::Settings;
use crate::errors::{AuthError, Result};

/// Credential from settings, or prompted for on an interactive terminal
pub fn resolve_credential(settings: &Settings) -> Result<Credential> {
    if let Some(credential) = &settings.credential {
        return Ok(credential.clone());
    }

    if !atty::is(atty::Stream::Stdin) {
        return Err(AuthError::MissingCredential.into());
    }

    let value = rpassword::prompt_password("Session cookie (_simple_auth): ")?;
    let credential = Credential::new(value);
    if credential.is_empty() {
        return Err(AuthError::MissingCredential.into());
    }
    Ok(credential)
}

/// Handle the list command
///
/// Prints one tab-separated line per order: key, purchase date and name, plus
/// the storefront URL when asked for.
pub async fn handle_list(
    settings: &Settings,
    sort_by_date: bool,
    print_url: bool,
    shutdown: ShutdownSignal,
) -> Result<()> {
    let credential = resolve_credential(settings)?;
    let client = StorefrontClient::new(settings.client_config())?;
    let session = client.authenticate(&credential).await?;

    let keys = client.list_order_keys(&session).await?;
    let listing = list_orders(&client, &session, keys, sort_by_date, shutdown).await;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for order in &listing.orders {
        for line in format_order_lines(order, print_url) {
            writeln!(out, "{}", line)?;
        }
    }
    out.flush()?;

    for failure in &listing.failures {
        warn!("Order {} could not be listed: {}", failure.order_key, failure.message);
    }
    Ok(())
}

/// Handle the download command
pub async fn handle_download(
    settings: &Settings,
    shutdown: ShutdownSignal,
    progress: ProgressConfig,
) -> Result<BatchResult> {
    let start_time = Instant::now();
    settings.validate()?;

    let credential = resolve_credential(settings)?;
    let client_config = settings.client_config();
    let client = Arc::new(StorefrontClient::new(client_config.clone())?);
    let session = client.authenticate(&credential).await?;
    info!("Authenticated in {:?}", start_time.elapsed());

    let store = Arc::new(HashStore::open(&settings.hash_index).await?);
    debug!(
        "Hash index {} holds {} records",
        store.index_path().display(),
        store.len().await
    );
    let engine = Arc::new(DownloadEngine::new(
        client_config
            .build_download_client()
            .map_err(AuthError::Client)?,
        store,
        &settings.download_root,
        settings.download_config(),
    ));

    let keys = client.list_order_keys(&session).await?;

    let (events, rx) = EventSink::channel();
    let display = ProgressDisplay::new(progress).spawn(rx);

    let orchestrator = BundleOrchestrator::new(client, engine, settings.orchestrator_config())
        .with_events(events)
        .with_shutdown(shutdown);
    let result = orchestrator.run(&session, keys, &settings.selection()).await;

    // The display task ends once the orchestrator's sink is gone.
    drop(orchestrator);
    if let Err(e) = display.await {
        warn!("Progress display task failed: {}", e);
    }

    print_summary(&result)?;
    Ok(result)
}

/// Print the end-of-run report to stdout
fn print_summary(result: &BatchResult) -> Result<()> {
    let summary = result.summary();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    writeln!(
        out,
        "{} orders: {} files downloaded, {} already up to date, {} failed, {} cancelled ({}) in {:.1}s",
        summary.orders,
        summary.complete,
        summary.up_to_date,
        summary.failed,
        summary.cancelled,
        format_bytes(summary.bytes_transferred),
        summary.elapsed.as_secs_f64()
    )?;
    if summary.orders_skipped > 0 {
        writeln!(
            out,
            "  {} orders not fetched before shutdown; run again to continue",
            summary.orders_skipped
        )?;
    }

    for failure in &result.failures {
        match &failure.file {
            Some(file) => writeln!(
                out,
                "  FAILED {} [{}]: {}",
                file.display(),
                failure.kind,
                failure.message
            )?,
            None => writeln!(
                out,
                "  FAILED order {} [{}]: {}",
                failure.order_key, failure.kind, failure.message
            )?,
        }
    }
    out.flush()?;
    Ok(())
}

/// Lines printed for one order by `list`
///
/// The first line is tab-separated key, purchase date and name. With
/// `print_url` every file URL follows on its own indented line.
pub fn format_order_lines(order: &OrderDetail, print_url: bool) -> Vec<String> {
    let created = order
        .created
        .map(|c| c.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string());
    let mut lines = vec![format!(
        "{}\t{}\t{}",
        order.order_key, created, order.human_name
    )];
    if print_url {
        lines.extend(order.files.iter().map(|file| format!("\t{}", file.url)));
    }
    lines
}

/// Human-readable byte count
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
