//! Progress display for download runs
//!
//! Consumes [`DownloadEvent`]s from the pipeline and renders them with
//! indicatif: one overall bar counting finished files plus a byte bar per
//! in-flight transfer. When stderr is not a terminal, a line per finished
//! order is logged instead.
//!
//! # Examples
//!
//! ```rust,no_run
//! use hb_fetcher::app::EventSink;
//! use hb_fetcher::cli::{ProgressConfig, ProgressDisplay};
//!
//! # async fn example() {
//! let (events, rx) = EventSink::channel();
//! let display = ProgressDisplay::new(ProgressConfig::default()).spawn(rx);
//! // hand `events` to the orchestrator, then drop it
//! drop(events);
//! display.await.ok();
//! # }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::app::{DownloadEvent, FileResult, TransferPhase};

/// Progress display configuration
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Draw bars at all; otherwise log lines
    pub enable_progress_bars: bool,
    /// Per-file byte bars under the overall bar
    pub show_file_bars: bool,
    /// Longest file name shown before truncation
    pub max_name_len: usize,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enable_progress_bars: true,
            show_file_bars: true,
            max_name_len: 40,
        }
    }
}

impl ProgressConfig {
    /// Log lines only
    pub fn quiet() -> Self {
        Self {
            enable_progress_bars: false,
            show_file_bars: false,
            ..Self::default()
        }
    }
}

/// Renders pipeline events
pub struct ProgressDisplay {
    config: ProgressConfig,
    multi: MultiProgress,
    overall: ProgressBar,
    files: HashMap<PathBuf, ProgressBar>,
    bars_enabled: bool,
}

impl ProgressDisplay {
    pub fn new(config: ProgressConfig) -> Self {
        let bars_enabled = config.enable_progress_bars && atty::is(atty::Stream::Stderr);
        let target = if bars_enabled {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        let multi = MultiProgress::with_draw_target(target);

        let overall = multi.add(ProgressBar::new(0));
        overall.set_style(overall_style());
        overall.set_message("Fetching orders");

        Self {
            config,
            multi,
            overall,
            files: HashMap::new(),
            bars_enabled,
        }
    }

    /// Drain `events` on a background task until every sender is gone
    pub fn spawn(mut self, mut events: mpsc::UnboundedReceiver<DownloadEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                self.handle(&event);
            }
            self.finish();
        })
    }

    /// Apply one event to the display
    pub fn handle(&mut self, event: &DownloadEvent) {
        match event {
            DownloadEvent::OrdersListed { count } => {
                self.overall.set_message(format!("{} orders", count));
            }
            DownloadEvent::OrderFetched { selected, .. } => {
                self.overall.inc_length(*selected as u64);
            }
            DownloadEvent::OrderFailed {
                order_key, message, ..
            } => {
                self.println(format!("Order {} failed: {}", order_key, message));
            }
            DownloadEvent::FilePhase { destination, phase } => match phase {
                TransferPhase::InProgress => self.file_started(destination),
                TransferPhase::Verifying => {
                    if let Some(bar) = self.files.get(destination) {
                        bar.set_message(format!("{} (verifying)", self.short_name(destination)));
                    }
                }
                _ => {}
            },
            DownloadEvent::FileProgress {
                destination,
                bytes_written,
                total,
            } => {
                if let Some(bar) = self.files.get(destination) {
                    if let Some(total) = total {
                        bar.set_length(*total);
                    }
                    bar.set_position(*bytes_written);
                }
            }
            DownloadEvent::FileFinished {
                destination,
                result,
                ..
            } => {
                if let Some(bar) = self.files.remove(destination) {
                    bar.finish_and_clear();
                    self.multi.remove(&bar);
                }
                self.overall.inc(1);
                if let FileResult::Failed { message, .. } = result {
                    self.println(format!("{}: {}", destination.display(), message));
                }
            }
            DownloadEvent::OrderFinished(summary) => {
                if !self.bars_enabled {
                    info!(
                        "Order {} ({}): {} complete, {} up to date, {} failed",
                        summary.order_key,
                        summary.human_name,
                        summary.complete,
                        summary.up_to_date,
                        summary.failed
                    );
                }
            }
            DownloadEvent::BatchFinished(summary) => {
                self.overall.finish_with_message(format!(
                    "{} complete, {} up to date, {} failed",
                    summary.complete, summary.up_to_date, summary.failed
                ));
            }
        }
    }

    fn file_started(&mut self, destination: &Path) {
        if !self.bars_enabled || !self.config.show_file_bars || self.files.contains_key(destination)
        {
            return;
        }
        let bar = self.multi.add(ProgressBar::new(0));
        bar.set_style(file_style());
        bar.set_message(self.short_name(destination));
        self.files.insert(destination.to_path_buf(), bar);
    }

    fn println(&self, line: String) {
        if self.bars_enabled {
            if self.multi.println(&line).is_err() {
                eprintln!("{}", line);
            }
        } else {
            warn!("{}", line);
        }
    }

    fn short_name(&self, path: &Path) -> String {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        truncate_name(&name, self.config.max_name_len)
    }

    fn finish(&mut self) {
        for (_, bar) in self.files.drain() {
            bar.finish_and_clear();
        }
        if !self.overall.is_finished() {
            self.overall.abandon();
        }
    }
}

fn overall_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}",
    )
    .map(|style| style.progress_chars("##-"))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn file_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "  {msg:40} [{bar:25.blue}] {bytes}/{total_bytes} {bytes_per_sec}",
    )
    .map(|style| style.progress_chars("=> "))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Shorten `name` to `max` characters, keeping the extension visible
fn truncate_name(name: &str, max: usize) -> String {
    let count = name.chars().count();
    if count <= max || max < 4 {
        return name.to_string();
    }
    let tail: String = name.chars().skip(count - (max / 2 - 1)).collect();
    let head: String = name.chars().take(max - tail.chars().count() - 3).collect();
    format!("{}...{}", head, tail)
}
