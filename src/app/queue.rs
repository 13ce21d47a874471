//! Bounded FIFO of planned downloads
//!
//! The producer pushes one [`DownloadJob`] per selected file and waits while
//! the queue is full; workers take jobs until the queue is closed and empty.

use std::collections::VecDeque;

use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::app::download::FileRequest;
use crate::app::models::OrderKey;

/// One file waiting for a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub order_key: OrderKey,
    pub request: FileRequest,
}

/// Snapshot of queue counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub pushed: u64,
    pub taken: u64,
    pub closed: bool,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<DownloadJob>,
    closed: bool,
    pushed: u64,
    taken: u64,
}

#[derive(Debug)]
pub struct WorkQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    work_available: Notify,
    space_available: Notify,
}

impl WorkQueue {
    /// Create a queue holding at most `capacity` pending jobs
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(QueueState::default()),
            work_available: Notify::new(),
            space_available: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a job, waiting while the queue is full
    ///
    /// Hands the job back if the queue has been closed.
    pub async fn push(&self, job: DownloadJob) -> Result<(), DownloadJob> {
        loop {
            let space = self.space_available.notified();
            {
                let mut state = self.state.lock().await;
                if state.closed {
                    return Err(job);
                }
                if state.pending.len() < self.capacity {
                    debug!("Queued {}", job.request.destination.display());
                    state.pending.push_back(job);
                    state.pushed += 1;
                    self.work_available.notify_one();
                    return Ok(());
                }
            }
            space.await;
        }
    }

    /// Next job in FIFO order
    ///
    /// Waits while the queue is open and empty; `None` once it is closed and
    /// drained.
    pub async fn next_job(&self) -> Option<DownloadJob> {
        loop {
            let work = self.work_available.notified();
            {
                let mut state = self.state.lock().await;
                if let Some(job) = state.pending.pop_front() {
                    state.taken += 1;
                    self.space_available.notify_one();
                    return Some(job);
                }
                if state.closed {
                    return None;
                }
            }
            work.await;
        }
    }

    /// Stop accepting jobs and wake everyone waiting
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
        self.work_available.notify_waiters();
        self.space_available.notify_waiters();
    }

    /// Remove every job nobody has taken
    pub async fn drain(&self) -> Vec<DownloadJob> {
        let jobs: Vec<DownloadJob> = self.state.lock().await.pending.drain(..).collect();
        self.space_available.notify_waiters();
        jobs
    }

    pub async fn stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        QueueStats {
            pending: state.pending.len(),
            pushed: state.pushed,
            taken: state.taken,
            closed: state.closed,
        }
    }
}
