//! Single-file download engine
//!
//! - `engine`: the per-file state machine, range requests, retries, verification
//! - `resume`: temporary file naming and resume offsets
//! - `transfer`: in-memory state of one transfer
//! - `config`: chunk size, retry budget and hash policy for transfers

pub mod config;
pub mod engine;
pub mod resume;
pub mod transfer;

pub use config::DownloadConfig;
pub use engine::{DownloadEngine, DownloadOutcome, FileRequest};
pub use resume::temp_path_for;
pub use transfer::{TransferPhase, TransferState};
