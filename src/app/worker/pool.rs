//! Fixed-size pool of download workers

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::WorkerConfig;
use super::core::{DownloadWorker, JobReport, WorkerStats};
use crate::app::download::DownloadEngine;
use crate::app::events::EventSink;
use crate::app::queue::WorkQueue;
use crate::app::signals::ShutdownSignal;
use crate::app::store::PathClaims;

/// Pool for managing multiple download workers
#[derive(Debug)]
pub struct WorkerPool {
    handles: Vec<JoinHandle<WorkerStats>>,
}

impl WorkerPool {
    /// Spawn `config.worker_count` workers sharing one queue and engine
    ///
    /// Every worker holds a clone of `reports`; the receiving side closes once
    /// all workers have finished.
    pub fn spawn(
        config: &WorkerConfig,
        queue: Arc<WorkQueue>,
        engine: Arc<DownloadEngine>,
        events: EventSink,
        reports: mpsc::UnboundedSender<JobReport>,
        shutdown: ShutdownSignal,
    ) -> Self {
        let worker_count = config.worker_count.max(1);
        info!("Starting {} workers", worker_count);

        let claims = PathClaims::new();
        let handles = (0..worker_count)
            .map(|id| {
                let worker = DownloadWorker::new(
                    id as u32,
                    config.clone(),
                    Arc::clone(&queue),
                    Arc::clone(&engine),
                    claims.clone(),
                    events.clone(),
                    reports.clone(),
                    shutdown.clone(),
                );
                tokio::spawn(worker.run())
            })
            .collect();

        Self { handles }
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to finish
    pub async fn join(self) -> Vec<WorkerStats> {
        let mut stats = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            match handle.await {
                Ok(worker_stats) => stats.push(worker_stats),
                Err(e) => warn!("Worker task ended abnormally: {}", e),
            }
        }

        debug!(
            "Worker pool finished: {} jobs across {} workers",
            stats.iter().map(|s| s.jobs).sum::<u64>(),
            stats.len()
        );
        stats
    }
}
