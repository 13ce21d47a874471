//! Prelude module for HB Fetcher Library
//!
//! This module re-exports the most commonly used items from the library,
//! providing a convenient way to import everything needed for typical usage
//! with a single `use hb_fetcher::prelude::*;` statement.
//!
//! # Usage
//!
//! ```rust,no_run
//! use hb_fetcher::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let root = PathBuf::from("/srv/library");
//!     let config = ClientConfig::default();
//!     let client = Arc::new(StorefrontClient::new(config.clone())?);
//!     let store = Arc::new(HashStore::open(HashStore::default_index_path(&root)).await?);
//!
//!     // Continue with engine and orchestrator setup...
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, Result};

// Essential app components that are used in most integrations
pub use crate::app::{
    // Results
    BatchResult,
    BatchSummary,
    // Core orchestration
    BundleOrchestrator,
    ClientConfig,
    // Data types
    Credential,
    DownloadConfig,
    DownloadEngine,
    DownloadEvent,
    DownloadOutcome,
    EventSink,
    FileRequest,
    HashPolicy,
    HashStore,
    OrchestratorConfig,
    OrderDetail,
    OrderKey,
    Platform,
    SelectionPolicy,
    Session,
    StorefrontClient,
};

// Configuration
pub use crate::config::{AppConfig, Settings};

// Commonly used constants
pub use crate::constants::{DEFAULT_RATE_LIMIT_RPS, DEFAULT_WORKER_COUNT, USER_AGENT};

// Standard library re-exports that are commonly needed
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;

pub use tokio;
