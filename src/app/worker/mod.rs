//! Download workers
//!
//! A fixed number of workers pull jobs from the [`WorkQueue`](crate::app::queue::WorkQueue),
//! claim the destination path, run the [`DownloadEngine`](crate::app::download::DownloadEngine)
//! and report one [`JobReport`] per job. Concurrency is bounded by the worker
//! count alone.

pub mod config;
pub mod core;
pub mod pool;

pub use config::WorkerConfig;
pub use self::core::{DownloadWorker, JobReport, WorkerStats};
pub use pool::WorkerPool;
