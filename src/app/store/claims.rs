//! Per-destination claims
//!
//! A worker claims a destination path before touching it and the claim is
//! released when the guard drops, whatever the outcome of the transfer. Two
//! workers therefore never write the same file (or its temporary file) at once.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::debug;

/// Result of a claim attempt
#[derive(Debug)]
pub enum ClaimStatus {
    /// Path is ours until the guard drops
    Claimed(PathClaim),
    /// Another worker is working on this path
    HeldBy { worker_id: u32 },
}

#[derive(Debug, Clone)]
struct ClaimInfo {
    worker_id: u32,
}

type ClaimMap = Arc<Mutex<HashMap<PathBuf, ClaimInfo>>>;

fn lock(map: &ClaimMap) -> MutexGuard<'_, HashMap<PathBuf, ClaimInfo>> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Registry of destination paths currently being written
#[derive(Debug, Clone, Default)]
pub struct PathClaims {
    claims: ClaimMap,
}

impl PathClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `path` for `worker_id` if nobody else holds it
    pub fn try_claim(&self, path: &Path, worker_id: u32) -> ClaimStatus {
        let mut claims = lock(&self.claims);
        if let Some(existing) = claims.get(path) {
            return ClaimStatus::HeldBy {
                worker_id: existing.worker_id,
            };
        }

        claims.insert(
            path.to_path_buf(),
            ClaimInfo { worker_id },
        );
        ClaimStatus::Claimed(PathClaim {
            path: path.to_path_buf(),
            claims: Arc::clone(&self.claims),
        })
    }

    /// Claim `path`, polling until the current holder releases it
    pub async fn claim(&self, path: &Path, worker_id: u32, poll: Duration) -> PathClaim {
        loop {
            match self.try_claim(path, worker_id) {
                ClaimStatus::Claimed(claim) => return claim,
                ClaimStatus::HeldBy { worker_id: holder } => {
                    debug!(
                        "Worker {} waiting for worker {} to release {}",
                        worker_id,
                        holder,
                        path.display()
                    );
                    tokio::time::sleep(poll).await;
                }
            }
        }
    }

    pub fn is_claimed(&self, path: &Path) -> bool {
        lock(&self.claims).contains_key(path)
    }

    /// Number of paths currently claimed
    pub fn active(&self) -> usize {
        lock(&self.claims).len()
    }
}

/// Guard for a claimed path; releases the claim on drop
#[derive(Debug)]
pub struct PathClaim {
    path: PathBuf,
    claims: ClaimMap,
}

impl PathClaim {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PathClaim {
    fn drop(&mut self) {
        lock(&self.claims).remove(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_claim_is_refused() {
        let claims = PathClaims::new();
        let path = Path::new("/lib/game.zip");

        let first = claims.try_claim(path, 1);
        assert!(matches!(first, ClaimStatus::Claimed(_)));
        assert!(matches!(
            claims.try_claim(path, 2),
            ClaimStatus::HeldBy { worker_id: 1 }
        ));
        assert!(claims.is_claimed(path));
        assert_eq!(claims.active(), 1);
    }

    #[test]
    fn test_drop_releases() {
        let claims = PathClaims::new();
        let path = Path::new("/lib/game.zip");
        {
            let _claim = claims.try_claim(path, 1);
        }
        assert!(!claims.is_claimed(path));
        assert!(matches!(claims.try_claim(path, 2), ClaimStatus::Claimed(_)));
    }

    #[tokio::test]
    async fn test_claim_waits_for_release() {
        let claims = PathClaims::new();
        let path = PathBuf::from("/lib/game.zip");

        let held = match claims.try_claim(&path, 1) {
            ClaimStatus::Claimed(claim) => claim,
            other => panic!("unexpected {:?}", other),
        };

        let waiter = {
            let claims = claims.clone();
            let path = path.clone();
            tokio::spawn(async move { claims.claim(&path, 2, Duration::from_millis(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());
        drop(held);

        let claim = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claim.path(), path.as_path());
    }
}
