//! Worker configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::workers;
use crate::errors::{ConfigError, ConfigResult};

/// Configuration for the download worker pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent workers to spawn
    pub worker_count: usize,
    /// How often a worker re-checks a destination held by another worker
    #[serde(with = "humantime_serde")]
    pub claim_poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: workers::DEFAULT_WORKER_COUNT,
            claim_poll_interval: workers::CLAIM_POLL_INTERVAL,
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Validate configuration values and return errors for invalid settings
    pub fn validate(&self) -> ConfigResult<()> {
        if self.worker_count == 0 {
            return Err(ConfigError::InvalidValue {
                field: "workers",
                reason: "worker count cannot be zero".to_string(),
            });
        }

        if self.worker_count > workers::MAX_WORKER_COUNT {
            return Err(ConfigError::InvalidValue {
                field: "workers",
                reason: format!(
                    "worker count ({}) exceeds maximum ({})",
                    self.worker_count,
                    workers::MAX_WORKER_COUNT
                ),
            });
        }

        Ok(())
    }
}
