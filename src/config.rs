//! Configuration management for hb_fetcher
//!
//! Settings come from three layers, later ones winning: built-in defaults,
//! a TOML config file and command-line overrides. The result is a fully
//! populated [`Settings`] value from which every component configuration is
//! derived and passed explicitly. There is no global configuration.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::{
    ClientConfig, Credential, DownloadConfig, HashPolicy, HashStore, OrchestratorConfig, OrderKey,
    Platform, RetryPolicy, SelectionPolicy,
};
use crate::constants::{env, files, limits, storefront, workers};
use crate::errors::{ConfigError, ConfigResult};

/// Contents of a config file
///
/// Every key is optional. The spellings of the older YAML configuration
/// (`download-location`, `write_md5`, ...) are accepted as aliases.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root directory for downloaded files
    #[serde(alias = "download-location")]
    pub download_location: Option<PathBuf>,
    /// Value of the storefront session cookie
    #[serde(alias = "session-cookie")]
    pub session_cookie: Option<String>,
    /// Put each order in its own folder
    #[serde(alias = "folderstructure_OrderName")]
    pub folder_by_order_name: bool,
    /// Chunk size for downloading and hashing (bytes)
    #[serde(alias = "chunksize")]
    pub chunk_size: usize,
    /// Resume partial downloads
    #[serde(alias = "resume_downloads")]
    pub resume: bool,
    #[serde(alias = "write_md5")]
    pub write_hash: bool,
    #[serde(alias = "read_md5")]
    pub read_hash: bool,
    #[serde(alias = "force_md5")]
    pub force_hash: bool,
    #[serde(alias = "ignore_md5")]
    pub ignore_hash: bool,
    /// Platform or platform group → selected; empty selects everything
    #[serde(alias = "download-platforms")]
    pub platforms: BTreeMap<String, bool>,
    pub debug: bool,
    pub workers: usize,
    pub rate_limit_rps: u32,
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_retry_after: Duration,
    /// Hash index location; defaults to a file in the download root
    pub hash_index: Option<PathBuf>,
    pub base_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            download_location: None,
            session_cookie: None,
            folder_by_order_name: true,
            chunk_size: files::DEFAULT_CHUNK_SIZE,
            resume: true,
            write_hash: true,
            read_hash: true,
            force_hash: false,
            ignore_hash: false,
            platforms: BTreeMap::new(),
            debug: false,
            workers: workers::DEFAULT_WORKER_COUNT,
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            max_attempts: retry.max_attempts,
            retry_base_delay: retry.base_delay,
            max_retry_after: retry.max_retry_after,
            hash_index: None,
            base_url: storefront::BASE_URL.to_string(),
        }
    }
}

impl AppConfig {
    /// Load the config file, or defaults when there is none
    ///
    /// An explicitly given file must exist. Returns the path actually read.
    pub async fn load(explicit: Option<&Path>) -> ConfigResult<(Self, Option<PathBuf>)> {
        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound {
                        path: path.to_path_buf(),
                    });
                }
                Some(path.to_path_buf())
            }
            None => find_config_file(),
        };

        match path {
            Some(path) => {
                let config = Self::load_from_file(&path).await?;
                Ok((config, Some(path)))
            }
            None => {
                debug!("No config file found, using defaults");
                Ok((Self::default(), None))
            }
        }
    }

    /// Load configuration from a TOML file
    pub async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let config: AppConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Platforms enabled in the `platforms` table, `None` when it is empty
    pub fn selected_platforms(&self) -> ConfigResult<Option<HashSet<Platform>>> {
        if self.platforms.is_empty() {
            return Ok(None);
        }

        let mut selected = HashSet::new();
        for (name, enabled) in &self.platforms {
            let expanded = Platform::expand_selector(name)?;
            if *enabled {
                selected.extend(expanded);
            }
        }
        Ok(Some(selected))
    }
}

/// Config file locations in search order
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(".").join(files::LOCAL_CONFIG_FILE)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join(files::CONFIG_DIR_NAME).join("config.toml"));
    }
    #[cfg(unix)]
    paths.push(PathBuf::from("/etc").join(files::LOCAL_CONFIG_FILE));
    paths
}

/// First existing file among [`config_search_paths`]
pub fn find_config_file() -> Option<PathBuf> {
    let found = config_search_paths().into_iter().find(|path| path.is_file());
    if let Some(path) = &found {
        debug!("Found config file: {}", path.display());
    }
    found
}

/// What the user asked the program to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Print the order library
    List { sort_by_date: bool, print_url: bool },
    /// Download the library
    Download,
}

/// Values given on the command line; `None` leaves the file/default value
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub download_location: Option<PathBuf>,
    pub session_cookie: Option<String>,
    pub chunk_size: Option<usize>,
    pub workers: Option<usize>,
    pub no_order_folders: bool,
    pub no_resume: bool,
    pub debug: bool,
    /// Platform names or groups; replaces the config file's table
    pub platforms: Vec<String>,
    pub bundle_id: Option<String>,
}

/// Fully resolved runtime settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub action: Action,
    pub download_root: PathBuf,
    /// From the command line, the environment or the config file, in that order
    pub credential: Option<Credential>,
    pub chunk_size: usize,
    pub resume: bool,
    pub hash_policy: HashPolicy,
    pub folder_by_order_name: bool,
    /// `None` selects every platform
    pub platforms: Option<HashSet<Platform>>,
    pub bundle_id: Option<OrderKey>,
    pub workers: usize,
    pub rate_limit_rps: u32,
    pub retry: RetryPolicy,
    pub hash_index: PathBuf,
    pub base_url: String,
    pub debug: bool,
}

impl Settings {
    /// Merge the config file with command-line overrides
    pub fn resolve(config: AppConfig, overrides: Overrides, action: Action) -> ConfigResult<Self> {
        let download_root = overrides
            .download_location
            .or(config.download_location.clone())
            .unwrap_or_else(|| PathBuf::from("."));

        let credential = overrides
            .session_cookie
            .or_else(|| std::env::var(env::SESSION_COOKIE).ok())
            .or(config.session_cookie.clone())
            .map(Credential::new)
            .filter(|c| !c.is_empty());

        let platforms = if overrides.platforms.is_empty() {
            config.selected_platforms()?
        } else {
            let mut selected = HashSet::new();
            for selector in &overrides.platforms {
                selected.extend(Platform::expand_selector(selector)?);
            }
            Some(selected)
        };

        let retry = RetryPolicy::default()
            .with_max_attempts(config.max_attempts)
            .with_base_delay(config.retry_base_delay)
            .with_max_retry_after(config.max_retry_after);

        let hash_index = config
            .hash_index
            .clone()
            .unwrap_or_else(|| HashStore::default_index_path(&download_root));

        let settings = Self {
            action,
            credential,
            chunk_size: overrides.chunk_size.unwrap_or(config.chunk_size),
            resume: config.resume && !overrides.no_resume,
            hash_policy: HashPolicy {
                write: config.write_hash,
                read: config.read_hash,
                force: config.force_hash,
                ignore: config.ignore_hash,
            },
            folder_by_order_name: config.folder_by_order_name && !overrides.no_order_folders,
            platforms,
            bundle_id: overrides.bundle_id.map(OrderKey::new),
            workers: overrides.workers.unwrap_or(config.workers),
            rate_limit_rps: config.rate_limit_rps,
            retry,
            hash_index,
            base_url: config.base_url,
            debug: config.debug || overrides.debug,
            download_root,
        };

        debug!("Resolved settings: {:#?}", settings);
        Ok(settings)
    }

    /// Check values that would only fail later, mid-run
    pub fn validate(&self) -> ConfigResult<()> {
        if self.chunk_size < files::MIN_CHUNK_SIZE {
            return Err(ConfigError::InvalidValue {
                field: "chunk_size",
                reason: format!(
                    "{} bytes is below the minimum of {}",
                    self.chunk_size,
                    files::MIN_CHUNK_SIZE
                ),
            });
        }
        if self.chunk_size > files::MAX_CHUNK_SIZE {
            return Err(ConfigError::InvalidValue {
                field: "chunk_size",
                reason: format!(
                    "{} bytes is above the maximum of {}",
                    self.chunk_size,
                    files::MAX_CHUNK_SIZE
                ),
            });
        }

        self.orchestrator_config().validate()?;
        validate_download_root(&self.download_root)
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_base_url(self.base_url.clone())
            .with_rate_limit(self.rate_limit_rps)
            .with_retry(self.retry.clone())
    }

    pub fn download_config(&self) -> DownloadConfig {
        DownloadConfig::default()
            .with_chunk_size(self.chunk_size)
            .with_resume(self.resume)
            .with_retry(self.retry.clone())
            .with_hash_policy(self.hash_policy)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig::default()
            .with_worker_count(self.workers)
            .with_folder_by_order_name(self.folder_by_order_name)
    }

    pub fn selection(&self) -> SelectionPolicy {
        SelectionPolicy {
            platforms: self.platforms.clone(),
            bundle_id: self.bundle_id.clone(),
        }
    }
}

/// The download root must be an existing, writable directory
fn validate_download_root(root: &Path) -> ConfigResult<()> {
    let unusable = |reason: String| ConfigError::DownloadRoot {
        path: root.to_path_buf(),
        reason,
    };

    let meta = std::fs::metadata(root).map_err(|e| unusable(e.to_string()))?;
    if !meta.is_dir() {
        return Err(unusable("not a directory".to_string()));
    }

    let marker = root.join(format!(".hb_write_check_{}", std::process::id()));
    std::fs::write(&marker, b"").map_err(|e| unusable(format!("not writable: {}", e)))?;
    let _ = std::fs::remove_file(&marker);
    Ok(())
}
