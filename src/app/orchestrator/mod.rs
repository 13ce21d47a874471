//! Bundle orchestration
//!
//! The orchestrator turns a list of order keys into downloaded files:
//!
//! - a producer fetches order details one at a time (the client's rate
//!   limiter keeps this polite), filters files through the [`SelectionPolicy`],
//!   plans destination paths and pushes one job per file into a bounded queue;
//! - a fixed [`WorkerPool`] drains the queue through the [`DownloadEngine`];
//! - a collector folds every terminal file result into the [`BatchResult`].
//!
//! A failed order or file is recorded and the run carries on.
//!
//! - [`config`] - Configuration structures and validation
//! - [`listing`] - Order details for the `list` action
//! - [`selection`] - Platform and bundle filtering
//! - [`stats`] - Per-order and per-batch results

pub mod config;
pub mod listing;
pub mod selection;
pub mod stats;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::app::client::{Session, StorefrontClient};
use crate::app::download::{DownloadEngine, FileRequest};
use crate::app::events::{DownloadEvent, EventSink, FileResult};
use crate::app::models::{OrderKey, ProductFile};
use crate::app::queue::{DownloadJob, WorkQueue};
use crate::app::signals::ShutdownSignal;
use crate::app::store::DestinationPlanner;
use crate::app::worker::{JobReport, WorkerPool};
use crate::errors::ApiError;

pub use config::OrchestratorConfig;
pub use listing::{list_orders, Listing};
pub use selection::SelectionPolicy;
pub use stats::{BatchFailure, BatchResult, BatchSummary, OrderSummary};

use stats::BatchTracker;

fn lock(tracker: &Mutex<BatchTracker>) -> MutexGuard<'_, BatchTracker> {
    tracker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Drives a whole library download
#[derive(Debug)]
pub struct BundleOrchestrator {
    client: Arc<StorefrontClient>,
    engine: Arc<DownloadEngine>,
    config: OrchestratorConfig,
    events: EventSink,
    shutdown: ShutdownSignal,
}

impl BundleOrchestrator {
    pub fn new(
        client: Arc<StorefrontClient>,
        engine: Arc<DownloadEngine>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            client,
            engine,
            config,
            events: EventSink::disabled(),
            shutdown: ShutdownSignal::never(),
        }
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Download every selected file of `order_keys`
    ///
    /// Never fails as a whole: order and file failures end up in the result.
    pub async fn run(
        &self,
        session: &Session,
        order_keys: Vec<OrderKey>,
        selection: &SelectionPolicy,
    ) -> BatchResult {
        let started = Instant::now();
        let tracker = Mutex::new(BatchTracker::default());

        let (order_keys, missing) = selection.select_keys(order_keys);
        if let Some(missing) = missing {
            let error = ApiError::NotFound {
                order_key: missing.to_string(),
            };
            warn!("Bundle {} is not among the purchased orders", missing);
            self.order_failed(&tracker, missing, &error);
        }
        self.events.emit(DownloadEvent::OrdersListed {
            count: order_keys.len(),
        });
        info!(
            "Processing {} orders with {} workers",
            order_keys.len(),
            self.config.worker_count
        );

        let queue = Arc::new(WorkQueue::new(self.config.queue_capacity));
        let (report_tx, mut report_rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::spawn(
            &self.config.worker_config(),
            Arc::clone(&queue),
            Arc::clone(&self.engine),
            self.events.clone(),
            report_tx,
            self.shutdown.clone(),
        );

        // Closing on shutdown releases a producer blocked on a full queue.
        let closer = {
            let queue = Arc::clone(&queue);
            let mut shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                shutdown.triggered().await;
                queue.close().await;
            })
        };

        let producer = self.produce(session, order_keys, selection, &queue, &tracker);
        let collector = async {
            while let Some(report) = report_rx.recv().await {
                self.file_finished(&tracker, &report);
            }
        };
        tokio::join!(producer, collector);
        closer.abort();
        let worker_stats = pool.join().await;
        for stats in &worker_stats {
            debug!(
                "Worker {}: {} jobs, {} complete, {} failed ({} bytes)",
                stats.worker_id, stats.jobs, stats.complete, stats.failed, stats.bytes_transferred
            );
        }

        let queue_stats = queue.stats().await;
        debug!(
            "Queue: {} pushed, {} taken, {} left pending",
            queue_stats.pushed, queue_stats.taken, queue_stats.pending
        );
        for job in queue.drain().await {
            self.cancel_job(&tracker, &job);
        }

        let result = tracker
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .finish(started.elapsed());
        let summary = result.summary();
        info!(
            "Batch finished: {} complete, {} up to date, {} failed, {} cancelled ({} bytes)",
            summary.complete,
            summary.up_to_date,
            summary.failed,
            summary.cancelled,
            summary.bytes_transferred
        );
        self.events.emit(DownloadEvent::BatchFinished(summary));
        result
    }

    /// Fetch, filter and plan orders, feeding the queue
    async fn produce(
        &self,
        session: &Session,
        order_keys: Vec<OrderKey>,
        selection: &SelectionPolicy,
        queue: &WorkQueue,
        tracker: &Mutex<BatchTracker>,
    ) {
        let mut planner = DestinationPlanner::new(
            self.engine.download_root(),
            self.config.folder_by_order_name,
        );
        let mut shutdown = self.shutdown.clone();

        let mut remaining = order_keys.into_iter();
        while let Some(order_key) = remaining.next() {
            let fetched = if shutdown.is_triggered() {
                None
            } else {
                tokio::select! {
                    fetched = self.client.fetch_order_detail(session, &order_key) => Some(fetched),
                    _ = shutdown.triggered() => None,
                }
            };
            let Some(fetched) = fetched else {
                let skipped: Vec<OrderKey> = std::iter::once(order_key).chain(remaining).collect();
                info!(
                    "Shutdown requested, {} orders left unfetched",
                    skipped.len()
                );
                let mut tracker = lock(tracker);
                for order_key in skipped {
                    tracker.order_skipped(order_key);
                }
                break;
            };
            let order = match fetched {
                Ok(order) => order,
                Err(e) => {
                    warn!("Order {} failed: {}", order_key, e);
                    self.order_failed(tracker, order_key, &e);
                    continue;
                }
            };

            let selected: Vec<&ProductFile> = order
                .files
                .iter()
                .filter(|file| selection.allows_file(file))
                .collect();
            self.events.emit(DownloadEvent::OrderFetched {
                order_key: order_key.clone(),
                human_name: order.human_name.clone(),
                files: order.files.len(),
                selected: selected.len(),
                declared_bytes: selected.iter().filter_map(|f| f.declared_size).sum(),
            });

            let jobs: Vec<DownloadJob> = selected
                .into_iter()
                .map(|file| DownloadJob {
                    order_key: order_key.clone(),
                    request: FileRequest::from_product(file, planner.plan(&order, file)),
                })
                .collect();

            let finished =
                lock(tracker).order_planned(order_key.clone(), order.human_name.clone(), jobs.len());
            if let Some(summary) = finished {
                self.events.emit(DownloadEvent::OrderFinished(summary));
            }

            for job in jobs {
                if let Err(job) = queue.push(job).await {
                    self.cancel_job(tracker, &job);
                }
            }
        }

        queue.close().await;
    }

    fn order_failed(&self, tracker: &Mutex<BatchTracker>, order_key: OrderKey, error: &ApiError) {
        lock(tracker).order_failed(order_key.clone(), error.kind(), error.to_string());
        self.events.emit(DownloadEvent::OrderFailed {
            order_key,
            kind: error.kind().to_string(),
            message: error.to_string(),
        });
    }

    fn file_finished(&self, tracker: &Mutex<BatchTracker>, report: &JobReport) {
        let finished = lock(tracker).file_finished(report);
        if let Some(summary) = finished {
            info!(
                "Order {} done: {} complete, {} up to date, {} failed",
                summary.order_key, summary.complete, summary.up_to_date, summary.failed
            );
            self.events.emit(DownloadEvent::OrderFinished(summary));
        }
    }

    /// Record a job no worker picked up
    fn cancel_job(&self, tracker: &Mutex<BatchTracker>, job: &DownloadJob) {
        let report = JobReport::cancelled(job);
        self.events.emit(DownloadEvent::FileFinished {
            order_key: report.order_key.clone(),
            destination: report.destination.clone(),
            result: FileResult::Cancelled,
        });
        self.file_finished(tracker, &report);
    }
}
