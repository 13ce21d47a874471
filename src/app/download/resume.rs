//! Temporary files and resume offsets
//!
//! A partial download lives next to its destination under a fixed suffix. On
//! the next run its length is the resume offset and its bytes are re-hashed to
//! seed the running hash, so the final digest still covers the whole file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::app::hash::{HashAlgorithm, StreamingHasher};
use crate::app::store::hash_prefix;
use crate::constants::files::TEMP_FILE_SUFFIX;

/// Temporary path for a destination: the same name with a fixed suffix
pub fn temp_path_for(destination: &Path) -> PathBuf {
    let mut name: OsString = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(TEMP_FILE_SUFFIX);
    destination.with_file_name(name)
}

/// Where a transfer picks up
#[derive(Debug)]
pub struct ResumePoint {
    pub offset: u64,
    /// Hasher already fed with the first `offset` bytes
    pub hasher: Option<StreamingHasher>,
}

impl ResumePoint {
    fn start() -> Self {
        Self {
            offset: 0,
            hasher: None,
        }
    }
}

/// Work out the resume offset for `temp_path`
///
/// Returns offset 0 when resuming is disabled, there is no partial file, the
/// partial file is longer than the declared size, or it cannot be read back.
/// The caller truncates the file in that case.
pub async fn resume_point(
    temp_path: &Path,
    resume_enabled: bool,
    declared_size: Option<u64>,
    algorithm: Option<HashAlgorithm>,
    chunk_size: usize,
) -> ResumePoint {
    let existing = match tokio::fs::metadata(temp_path).await {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => return ResumePoint::start(),
    };

    if existing == 0 {
        return ResumePoint::start();
    }

    if !resume_enabled {
        debug!(
            "Resume disabled, discarding {} bytes in {}",
            existing,
            temp_path.display()
        );
        return ResumePoint::start();
    }

    if let Some(declared) = declared_size {
        if existing > declared {
            warn!(
                "Partial file {} has {} bytes but only {} are expected; restarting",
                temp_path.display(),
                existing,
                declared
            );
            return ResumePoint::start();
        }
    }

    let hasher = match algorithm {
        Some(algorithm) => match hash_prefix(temp_path, existing, algorithm, chunk_size).await {
            Ok(hasher) => Some(hasher),
            Err(e) => {
                warn!(
                    "Could not re-read partial file {}: {}; restarting",
                    temp_path.display(),
                    e
                );
                return ResumePoint::start();
            }
        },
        None => None,
    };

    debug!(
        "Resuming {} from byte {}",
        temp_path.display(),
        existing
    );
    ResumePoint {
        offset: existing,
        hasher,
    }
}
