//! Configuration for the bundle orchestrator

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::worker::WorkerConfig;
use crate::constants::workers;
use crate::errors::{ConfigError, ConfigResult};

/// Configuration for one orchestrated run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Number of concurrent file downloads
    pub worker_count: usize,
    /// Jobs buffered between the order fetcher and the workers
    pub queue_capacity: usize,
    /// Minimum interval between progress events for one file
    #[serde(with = "humantime_serde")]
    pub progress_interval: Duration,
    /// Put each order's files under a folder named after the order
    pub folder_by_order_name: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            worker_count: workers::DEFAULT_WORKER_COUNT,
            queue_capacity: workers::DEFAULT_QUEUE_CAPACITY,
            progress_interval: workers::PROGRESS_INTERVAL,
            folder_by_order_name: true,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_folder_by_order_name(mut self, enabled: bool) -> Self {
        self.folder_by_order_name = enabled;
        self
    }

    /// Worker pool settings derived from this configuration
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig::default().with_worker_count(self.worker_count)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.worker_config().validate()?;
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "queue_capacity",
                reason: "queue capacity cannot be zero".to_string(),
            });
        }
        Ok(())
    }
}
