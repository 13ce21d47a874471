//! Hash policy flags
//!
//! The four switches mirror the long-standing `write_md5`, `read_md5`,
//! `force_md5` and `ignore_md5` settings. They are resolved once from the
//! configuration and handed to the engine; nothing here reads global state.

use serde::{Deserialize, Serialize};

/// How content hashes are computed, trusted and persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashPolicy {
    /// Record hashes that could not be checked against anything
    /// (no declared hash and no earlier record)
    pub write: bool,
    /// Trust a stored record whose size matches instead of re-reading the file
    pub read: bool,
    /// Always recompute from file contents; overrides `read`
    pub force: bool,
    /// Skip hash comparison entirely, sizes are still checked
    pub ignore: bool,
}

impl Default for HashPolicy {
    fn default() -> Self {
        Self {
            write: true,
            read: true,
            force: false,
            ignore: false,
        }
    }
}

impl HashPolicy {
    pub fn with_write(mut self, write: bool) -> Self {
        self.write = write;
        self
    }

    pub fn with_read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_ignore(mut self, ignore: bool) -> Self {
        self.ignore = ignore;
        self
    }

    /// Whether a stored record may stand in for reading the file
    pub fn trusts_stored_hash(&self) -> bool {
        self.read && !self.force
    }

    /// Whether any hashing is needed at all
    pub fn verifies(&self) -> bool {
        !self.ignore
    }
}
