//! Persistent hash index
//!
//! One JSON document maps each downloaded file to the hash and size it had
//! when last verified. It is the only thing standing between a repeat run and
//! re-reading (or re-downloading) every large file in the library, so every
//! `record` is on disk before it returns.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::app::hash::{ContentHash, HashAlgorithm};
use crate::app::store::verification::hash_file;
use crate::constants::files;
use crate::errors::{StoreError, StoreResult};

/// Stable identity of a downloaded file: its path relative to the download root
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileIdentity(String);

impl FileIdentity {
    /// Identity of `destination` under `root`, always `/`-separated
    ///
    /// Paths outside the root keep their full form.
    pub fn for_destination(root: &Path, destination: &Path) -> Self {
        let relative = destination.strip_prefix(root).unwrap_or(destination);
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        Self(parts.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileIdentity {
    fn from(identity: &str) -> Self {
        Self(identity.to_string())
    }
}

/// What we knew about a file the last time it verified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub hash: ContentHash,
    pub size: u64,
    #[serde(default = "unix_epoch")]
    pub verified_at: DateTime<Utc>,
}

fn unix_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from(std::time::UNIX_EPOCH)
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexDocument {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    records: BTreeMap<FileIdentity, DownloadRecord>,
}

/// Concurrent, durable map of file identity to [`DownloadRecord`]
#[derive(Debug)]
pub struct HashStore {
    index_path: PathBuf,
    records: RwLock<BTreeMap<FileIdentity, DownloadRecord>>,
    /// Serializes mutations so snapshots reach disk in the order they were taken
    persist_lock: Mutex<()>,
}

impl HashStore {
    /// Default index location inside a download root
    pub fn default_index_path(download_root: &Path) -> PathBuf {
        download_root.join(files::HASH_INDEX_FILE)
    }

    /// Open the index at `index_path`, starting empty if it does not exist
    ///
    /// An unreadable document is moved aside to `<index>.corrupt` and the
    /// store starts empty rather than refusing to run.
    pub async fn open(index_path: impl Into<PathBuf>) -> StoreResult<Self> {
        let index_path = index_path.into();
        let records = match fs::read(&index_path).await {
            Ok(bytes) => match serde_json::from_slice::<IndexDocument>(&bytes) {
                Ok(document) => {
                    if document.version > files::HASH_INDEX_VERSION {
                        debug!(
                            "Hash index {} has newer version {}, reading known fields",
                            index_path.display(),
                            document.version
                        );
                    }
                    document.records
                }
                Err(e) => {
                    let aside = index_path.with_extension("json.corrupt");
                    warn!(
                        "Hash index {} is unreadable ({}); moving it to {}",
                        index_path.display(),
                        e,
                        aside.display()
                    );
                    fs::rename(&index_path, &aside)
                        .await
                        .map_err(|source| StoreError::Io {
                            path: index_path.clone(),
                            source,
                        })?;
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(StoreError::Io {
                    path: index_path,
                    source,
                })
            }
        };

        debug!(
            "Opened hash index {} with {} records",
            index_path.display(),
            records.len()
        );

        Ok(Self {
            index_path,
            records: RwLock::new(records),
            persist_lock: Mutex::new(()),
        })
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Stored record for a file, if any
    pub async fn lookup(&self, identity: &FileIdentity) -> Option<DownloadRecord> {
        self.records.read().await.get(identity).cloned()
    }

    /// Insert or overwrite the record for a file and persist the index
    pub async fn record(
        &self,
        identity: FileIdentity,
        hash: ContentHash,
        size: u64,
    ) -> StoreResult<DownloadRecord> {
        let record = DownloadRecord {
            hash,
            size,
            verified_at: Utc::now(),
        };

        let _guard = self.persist_lock.lock().await;
        let snapshot = {
            let mut records = self.records.write().await;
            records.insert(identity.clone(), record.clone());
            serde_json::to_vec_pretty(&IndexDocument {
                version: files::HASH_INDEX_VERSION,
                records: records.clone(),
            })?
        };
        self.write_atomically(&snapshot).await?;

        debug!("Recorded {} as {} ({} bytes)", identity, record.hash, size);
        Ok(record)
    }

    /// Number of files in the index
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Hash a file in bounded chunks
    pub async fn compute_hash(
        path: &Path,
        algorithm: HashAlgorithm,
        chunk_size: usize,
    ) -> StoreResult<ContentHash> {
        hash_file(path, algorithm, chunk_size)
            .await
            .map(|(hash, _)| hash)
    }

    async fn write_atomically(&self, bytes: &[u8]) -> StoreResult<()> {
        let io_err = |source| StoreError::Io {
            path: self.index_path.clone(),
            source,
        };

        if let Some(parent) = self.index_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(io_err)?;
            }
        }

        let temp_path = self.index_path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path).await.map_err(io_err)?;
        file.write_all(bytes).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        drop(file);

        fs::rename(&temp_path, &self.index_path)
            .await
            .map_err(io_err)?;

        #[cfg(unix)]
        {
            if let Some(parent) = self.index_path.parent() {
                if let Ok(dir) = fs::File::open(parent).await {
                    let _ = dir.sync_all().await;
                }
            }
        }

        Ok(())
    }
}
