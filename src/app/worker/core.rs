//! Core download worker implementation
//!
//! A worker takes the next job from the queue, claims its destination, runs
//! the engine and reports the terminal result. Failures are per file: a
//! worker never stops because one file failed.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::config::WorkerConfig;
use crate::app::download::{DownloadEngine, DownloadOutcome};
use crate::app::events::{DownloadEvent, EventSink, FileResult};
use crate::app::models::OrderKey;
use crate::app::queue::{DownloadJob, WorkQueue};
use crate::app::signals::ShutdownSignal;
use crate::app::store::PathClaims;
use crate::errors::{DownloadError, DownloadResult};

/// Terminal result of one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub order_key: OrderKey,
    pub destination: PathBuf,
    pub result: FileResult,
}

impl JobReport {
    pub fn new(job: &DownloadJob, outcome: &DownloadResult<DownloadOutcome>) -> Self {
        Self {
            order_key: job.order_key.clone(),
            destination: job.request.destination.clone(),
            result: file_result(outcome),
        }
    }

    /// Report for a job that never reached a worker
    pub fn cancelled(job: &DownloadJob) -> Self {
        Self {
            order_key: job.order_key.clone(),
            destination: job.request.destination.clone(),
            result: FileResult::Cancelled,
        }
    }
}

fn file_result(outcome: &DownloadResult<DownloadOutcome>) -> FileResult {
    match outcome {
        Ok(DownloadOutcome::Complete {
            bytes_transferred, ..
        }) => FileResult::Complete {
            bytes_transferred: *bytes_transferred,
        },
        Ok(DownloadOutcome::AlreadyUpToDate) => FileResult::AlreadyUpToDate,
        Err(DownloadError::Cancelled { .. }) => FileResult::Cancelled,
        Err(e) => FileResult::Failed {
            kind: e.kind().to_string(),
            message: e.to_string(),
        },
    }
}

/// Per-worker counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub worker_id: u32,
    pub jobs: u64,
    pub complete: u64,
    pub up_to_date: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub bytes_transferred: u64,
}

impl WorkerStats {
    fn record(&mut self, result: &FileResult) {
        self.jobs += 1;
        match result {
            FileResult::Complete { bytes_transferred } => {
                self.complete += 1;
                self.bytes_transferred += bytes_transferred;
            }
            FileResult::AlreadyUpToDate => self.up_to_date += 1,
            FileResult::Failed { .. } => self.failed += 1,
            FileResult::Cancelled => self.cancelled += 1,
        }
    }
}

/// Individual download worker
#[derive(Debug)]
pub struct DownloadWorker {
    id: u32,
    config: WorkerConfig,
    queue: Arc<WorkQueue>,
    engine: Arc<DownloadEngine>,
    claims: PathClaims,
    events: EventSink,
    reports: mpsc::UnboundedSender<JobReport>,
    shutdown: ShutdownSignal,
    stats: WorkerStats,
}

impl DownloadWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u32,
        config: WorkerConfig,
        queue: Arc<WorkQueue>,
        engine: Arc<DownloadEngine>,
        claims: PathClaims,
        events: EventSink,
        reports: mpsc::UnboundedSender<JobReport>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            id,
            config,
            queue,
            engine,
            claims,
            events,
            reports,
            shutdown,
            stats: WorkerStats {
                worker_id: id,
                ..WorkerStats::default()
            },
        }
    }

    /// Process jobs until the queue is drained or shutdown is requested
    pub async fn run(mut self) -> WorkerStats {
        debug!("Worker {} starting", self.id);

        loop {
            let job = tokio::select! {
                biased;
                _ = self.shutdown.triggered() => {
                    info!("Worker {} received shutdown signal", self.id);
                    break;
                }
                job = self.queue.next_job() => job,
            };

            let Some(job) = job else {
                break;
            };
            self.process(job).await;
        }

        debug!(
            "Worker {} finished: {} jobs, {} failed",
            self.id, self.stats.jobs, self.stats.failed
        );
        self.stats
    }

    async fn process(&mut self, job: DownloadJob) {
        let destination = &job.request.destination;
        debug!("Worker {} got {}", self.id, destination.display());

        let claim = self
            .claims
            .claim(destination, self.id, self.config.claim_poll_interval)
            .await;
        let outcome = self
            .engine
            .download(&job.request, &self.events, self.shutdown.clone())
            .await;
        drop(claim);

        if let Err(e) = &outcome {
            if !matches!(e, DownloadError::Cancelled { .. }) {
                warn!("Failed {}: {}", destination.display(), e);
            }
        }

        let report = JobReport::new(&job, &outcome);
        self.stats.record(&report.result);
        self.events.emit(DownloadEvent::FileFinished {
            order_key: report.order_key.clone(),
            destination: report.destination.clone(),
            result: report.result.clone(),
        });

        // A closed receiver means the orchestrator is gone; keep draining anyway.
        let _ = self.reports.send(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::hash::{ContentHash, HashAlgorithm};

    #[test]
    fn test_file_result_mapping() {
        let complete: DownloadResult<DownloadOutcome> = Ok(DownloadOutcome::Complete {
            bytes_transferred: 10,
            size: 10,
            hash: Some(ContentHash::of_bytes(HashAlgorithm::Md5, b"x")),
        });
        assert_eq!(
            file_result(&complete),
            FileResult::Complete {
                bytes_transferred: 10
            }
        );

        let cancelled: DownloadResult<DownloadOutcome> =
            Err(DownloadError::Cancelled { offset: 3 });
        assert_eq!(file_result(&cancelled), FileResult::Cancelled);

        let failed: DownloadResult<DownloadOutcome> = Err(DownloadError::TransferFailed {
            offset: 600,
            attempts: 3,
            reason: "connection reset".to_string(),
        });
        match file_result(&failed) {
            FileResult::Failed { kind, message } => {
                assert_eq!(kind, "transfer-failed");
                assert!(message.contains("600"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_stats_accumulate() {
        let mut stats = WorkerStats::default();
        stats.record(&FileResult::Complete {
            bytes_transferred: 5,
        });
        stats.record(&FileResult::AlreadyUpToDate);
        stats.record(&FileResult::Cancelled);
        assert_eq!(stats.jobs, 3);
        assert_eq!(stats.complete, 1);
        assert_eq!(stats.up_to_date, 1);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.bytes_transferred, 5);
    }
}
