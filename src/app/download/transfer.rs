//! Per-file transfer state

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::app::hash::{ContentHash, HashAlgorithm, StreamingHasher};

/// Phase of one file's state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferPhase {
    NotStarted,
    InProgress,
    Verifying,
    Complete,
    Failed,
}

impl TransferPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferPhase::Complete | TransferPhase::Failed)
    }
}

/// Bookkeeping for one in-flight transfer
///
/// `bytes_written` always equals the length of the temporary file and the
/// number of bytes fed to the hasher.
#[derive(Debug)]
pub struct TransferState {
    pub partial_path: PathBuf,
    pub bytes_written: u64,
    /// Bytes received from the network during this invocation
    pub bytes_transferred: u64,
    pub total_expected: Option<u64>,
    pub phase: TransferPhase,
    algorithm: Option<HashAlgorithm>,
    hasher: Option<StreamingHasher>,
}

impl TransferState {
    /// Fresh state; `algorithm` is `None` when hashing is disabled
    pub fn new(
        partial_path: PathBuf,
        total_expected: Option<u64>,
        algorithm: Option<HashAlgorithm>,
    ) -> Self {
        Self {
            partial_path,
            bytes_written: 0,
            bytes_transferred: 0,
            total_expected,
            phase: TransferPhase::NotStarted,
            algorithm,
            hasher: algorithm.map(StreamingHasher::new),
        }
    }

    /// Continue from `offset` bytes already on disk, hashed into `hasher`
    pub fn resume_from(&mut self, offset: u64, hasher: Option<StreamingHasher>) {
        self.bytes_written = offset;
        self.hasher = hasher.or_else(|| self.algorithm.map(StreamingHasher::new));
    }

    /// Forget everything written so far
    pub fn restart(&mut self) {
        self.bytes_written = 0;
        self.hasher = self.algorithm.map(StreamingHasher::new);
    }

    /// Account for a chunk that has been written to the temporary file
    pub fn absorb(&mut self, chunk: &[u8]) {
        if let Some(hasher) = self.hasher.as_mut() {
            hasher.update(chunk);
        }
        self.bytes_written += chunk.len() as u64;
        self.bytes_transferred += chunk.len() as u64;
    }

    pub fn algorithm(&self) -> Option<HashAlgorithm> {
        self.algorithm
    }

    /// Whether every expected byte is on disk
    pub fn is_complete(&self) -> bool {
        matches!(self.total_expected, Some(total) if self.bytes_written >= total)
    }

    /// Final digest of everything written; consumes the hasher
    pub fn finish_hash(&mut self) -> Option<ContentHash> {
        self.hasher.take().map(StreamingHasher::finalize)
    }
}
