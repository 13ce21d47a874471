//! Per-order and per-batch result aggregation
//!
//! [`BatchResult`] is the single source of truth for what a run achieved: any
//! file not counted as complete or up to date was not reliably downloaded.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::app::events::FileResult;
use crate::app::models::OrderKey;
use crate::app::worker::JobReport;

/// One failed order or file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub order_key: OrderKey,
    /// `None` when the order itself could not be fetched
    pub file: Option<PathBuf>,
    pub kind: String,
    pub message: String,
}

/// Outcome counts for one order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    pub order_key: OrderKey,
    pub human_name: String,
    /// Files selected for download
    pub files: usize,
    pub complete: usize,
    pub up_to_date: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub bytes_transferred: u64,
    /// Set when the order detail could not be fetched
    pub error: Option<String>,
    /// Shutdown arrived before the order was fetched
    pub skipped: bool,
}

impl OrderSummary {
    fn new(order_key: OrderKey, human_name: String, files: usize) -> Self {
        Self {
            order_key,
            human_name,
            files,
            complete: 0,
            up_to_date: 0,
            failed: 0,
            cancelled: 0,
            bytes_transferred: 0,
            error: None,
            skipped: false,
        }
    }

    /// Files that reached a terminal result
    pub fn finished(&self) -> usize {
        self.complete + self.up_to_date + self.failed + self.cancelled
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && !self.skipped && self.failed == 0 && self.cancelled == 0
    }
}

/// Final counts of a run, as emitted in events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub orders: usize,
    pub orders_failed: usize,
    pub orders_skipped: usize,
    pub complete: usize,
    pub up_to_date: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub bytes_transferred: u64,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}

/// Everything a run produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub complete: usize,
    pub up_to_date: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Orders never fetched because of a shutdown
    pub orders_skipped: usize,
    pub bytes_transferred: u64,
    pub failures: Vec<BatchFailure>,
    /// Orders in the order they were processed
    pub orders: Vec<OrderSummary>,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}

impl BatchResult {
    /// Files that reached a terminal result
    pub fn total_files(&self) -> usize {
        self.complete + self.up_to_date + self.failed + self.cancelled
    }

    /// Any file or order failed
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Any file was cancelled or any order left unvisited
    pub fn was_cancelled(&self) -> bool {
        self.cancelled > 0 || self.orders_skipped > 0
    }

    pub fn order(&self, key: &OrderKey) -> Option<&OrderSummary> {
        self.orders.iter().find(|o| &o.order_key == key)
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            orders: self.orders.len(),
            orders_failed: self.orders.iter().filter(|o| o.error.is_some()).count(),
            orders_skipped: self.orders_skipped,
            complete: self.complete,
            up_to_date: self.up_to_date,
            failed: self.failed,
            cancelled: self.cancelled,
            bytes_transferred: self.bytes_transferred,
            elapsed: self.elapsed,
        }
    }
}

/// Builds a [`BatchResult`] while the producer and the workers report in
#[derive(Debug, Default)]
pub(crate) struct BatchTracker {
    result: BatchResult,
    index: HashMap<OrderKey, usize>,
}

impl BatchTracker {
    /// Register a fetched order with `files` selected files
    ///
    /// Returns the finished summary straight away for an order with nothing
    /// to download.
    pub fn order_planned(
        &mut self,
        order_key: OrderKey,
        human_name: String,
        files: usize,
    ) -> Option<OrderSummary> {
        let summary = OrderSummary::new(order_key.clone(), human_name, files);
        self.index.insert(order_key, self.result.orders.len());
        self.result.orders.push(summary.clone());
        (files == 0).then_some(summary)
    }

    pub fn order_failed(&mut self, order_key: OrderKey, kind: &str, message: String) {
        self.result.failures.push(BatchFailure {
            order_key: order_key.clone(),
            file: None,
            kind: kind.to_string(),
            message: message.clone(),
        });

        let mut summary = OrderSummary::new(order_key.clone(), String::new(), 0);
        summary.error = Some(message);
        self.index.insert(order_key, self.result.orders.len());
        self.result.orders.push(summary);
    }

    /// Register an order that was never fetched
    pub fn order_skipped(&mut self, order_key: OrderKey) {
        let mut summary = OrderSummary::new(order_key.clone(), String::new(), 0);
        summary.skipped = true;
        self.result.orders_skipped += 1;
        self.index.insert(order_key, self.result.orders.len());
        self.result.orders.push(summary);
    }

    /// Count one terminal file result
    ///
    /// Returns the order's summary when this was its last outstanding file.
    pub fn file_finished(&mut self, report: &JobReport) -> Option<OrderSummary> {
        let slot = match self.index.get(&report.order_key) {
            Some(&slot) => slot,
            None => {
                let slot = self.result.orders.len();
                self.index.insert(report.order_key.clone(), slot);
                self.result.orders.push(OrderSummary::new(
                    report.order_key.clone(),
                    String::new(),
                    0,
                ));
                slot
            }
        };
        let order = &mut self.result.orders[slot];

        match &report.result {
            FileResult::Complete { bytes_transferred } => {
                self.result.complete += 1;
                self.result.bytes_transferred += bytes_transferred;
                order.complete += 1;
                order.bytes_transferred += bytes_transferred;
            }
            FileResult::AlreadyUpToDate => {
                self.result.up_to_date += 1;
                order.up_to_date += 1;
            }
            FileResult::Failed { kind, message } => {
                self.result.failed += 1;
                order.failed += 1;
                self.result.failures.push(BatchFailure {
                    order_key: report.order_key.clone(),
                    file: Some(report.destination.clone()),
                    kind: kind.clone(),
                    message: message.clone(),
                });
            }
            FileResult::Cancelled => {
                self.result.cancelled += 1;
                order.cancelled += 1;
            }
        }

        (order.finished() == order.files).then(|| order.clone())
    }

    pub fn finish(mut self, elapsed: Duration) -> BatchResult {
        self.result.elapsed = elapsed;
        self.result
    }
}
