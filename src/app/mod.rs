//! Core application logic for hb_fetcher
//!
//! This module contains the storefront client, the hash store, the download
//! engine and the orchestration that ties them together.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hb_fetcher::app::{
//!     BundleOrchestrator, ClientConfig, Credential, DownloadConfig, DownloadEngine, HashStore,
//!     OrchestratorConfig, SelectionPolicy, StorefrontClient,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::default();
//! let client = Arc::new(StorefrontClient::new(config.clone())?);
//! let session = client.authenticate(&Credential::new("cookie value")).await?;
//!
//! let root = std::path::PathBuf::from("/srv/library");
//! let store = Arc::new(HashStore::open(HashStore::default_index_path(&root)).await?);
//! let engine = Arc::new(DownloadEngine::new(
//!     config.build_download_client()?,
//!     store,
//!     &root,
//!     DownloadConfig::default(),
//! ));
//!
//! let keys = client.list_order_keys(&session).await?;
//! let result = BundleOrchestrator::new(client, engine, OrchestratorConfig::default())
//!     .run(&session, keys, &SelectionPolicy::all())
//!     .await;
//! println!("{} files complete", result.complete);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod download;
pub mod events;
pub mod hash;
pub mod models;
pub mod orchestrator;
pub mod queue;
pub mod retry;
pub mod signals;
pub mod store;
pub mod worker;

// Re-export main public API
pub use client::{ClientConfig, Session, StorefrontClient};
pub use download::{
    DownloadConfig, DownloadEngine, DownloadOutcome, FileRequest, TransferPhase,
};
pub use events::{DownloadEvent, EventSink, FileResult};
pub use hash::{ContentHash, HashAlgorithm, StreamingHasher};
pub use models::{Credential, OrderDetail, OrderKey, Platform, ProductFile};
pub use orchestrator::{
    list_orders, BatchFailure, BatchResult, BatchSummary, BundleOrchestrator, Listing,
    OrchestratorConfig, OrderSummary, SelectionPolicy,
};
pub use queue::{DownloadJob, QueueStats, WorkQueue};
pub use retry::RetryPolicy;
pub use signals::{create_shutdown_channel, ShutdownSignal, ShutdownTrigger, SignalHandler};
pub use store::{DestinationPlanner, DownloadRecord, FileIdentity, HashPolicy, HashStore};
pub use worker::{WorkerConfig, WorkerPool};
