//! Download engine configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::retry::RetryPolicy;
use crate::app::store::HashPolicy;
use crate::constants::{files, http, workers};

/// Configuration for single-file transfers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Bytes per write and per hash update
    pub chunk_size: usize,
    /// Continue existing temporary files with range requests
    pub resume: bool,
    /// Retry budget per file
    pub retry: RetryPolicy,
    pub hash_policy: HashPolicy,
    /// Longest silence tolerated between body chunks
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
    /// Minimum interval between progress events for one file
    #[serde(with = "humantime_serde")]
    pub progress_interval: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            chunk_size: files::DEFAULT_CHUNK_SIZE,
            resume: true,
            retry: RetryPolicy::default(),
            hash_policy: HashPolicy::default(),
            read_timeout: http::READ_TIMEOUT,
            progress_interval: workers::PROGRESS_INTERVAL,
        }
    }
}

impl DownloadConfig {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_hash_policy(mut self, hash_policy: HashPolicy) -> Self {
        self.hash_policy = hash_policy;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }
}
