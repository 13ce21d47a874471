//! Structured progress and result events
//!
//! The core never prints. Everything a user interface might want to show is
//! emitted as a [`DownloadEvent`] on an unbounded channel; with no listener
//! attached, events are dropped.

use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::app::download::TransferPhase;
use crate::app::models::OrderKey;
use crate::app::orchestrator::stats::{BatchSummary, OrderSummary};

/// Terminal result of one file, as reported in events
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum FileResult {
    Complete { bytes_transferred: u64 },
    AlreadyUpToDate,
    Failed { kind: String, message: String },
    Cancelled,
}

/// Everything the pipeline reports while running
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DownloadEvent {
    /// Order keys to process are known
    OrdersListed { count: usize },
    /// An order was fetched and its files planned
    OrderFetched {
        order_key: OrderKey,
        human_name: String,
        files: usize,
        selected: usize,
        declared_bytes: u64,
    },
    /// An order could not be fetched or parsed
    OrderFailed {
        order_key: OrderKey,
        kind: String,
        message: String,
    },
    /// A file moved to a new transfer phase
    FilePhase {
        destination: PathBuf,
        phase: TransferPhase,
    },
    /// Bytes written so far for a file (throttled)
    FileProgress {
        destination: PathBuf,
        bytes_written: u64,
        total: Option<u64>,
    },
    /// A file reached a terminal result
    FileFinished {
        order_key: OrderKey,
        destination: PathBuf,
        result: FileResult,
    },
    /// Every file of an order has finished
    OrderFinished(OrderSummary),
    /// The whole batch has finished
    BatchFinished(BatchSummary),
}

/// Cheap, cloneable sender for [`DownloadEvent`]s
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<DownloadEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<DownloadEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Sink paired with a receiver, for UIs and tests
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DownloadEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// A sink that discards everything
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: DownloadEvent) {
        if let Some(tx) = &self.tx {
            // A closed receiver only means nobody is watching any more.
            let _ = tx.send(event);
        }
    }
}
