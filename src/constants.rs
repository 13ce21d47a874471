//! Application constants for HB Fetcher
//!
//! Constants are grouped by functional domain. Anything a user may want to
//! change also has a configuration key; these are the defaults.

use std::time::Duration;

/// Environment variable names
pub mod env {
    /// Session cookie value (the `_simple_auth` cookie from a browser)
    pub const SESSION_COOKIE: &str = "HB_SESSION_COOKIE";
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = concat!("hb_fetcher/", env!("CARGO_PKG_VERSION"));

    /// Default HTTP request timeout for API calls
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Read timeout between body chunks of a file transfer
    pub const READ_TIMEOUT: Duration = Duration::from_secs(60);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum idle connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 16;

    /// Maximum number of redirects to follow
    pub const MAX_REDIRECTS: usize = 10;
}

/// Storefront endpoints and protocol details
pub mod storefront {
    /// Storefront base URL
    pub const BASE_URL: &str = "https://www.humblebundle.com";

    /// Lists every order key of the logged-in user
    pub const ORDER_LIST_PATH: &str = "/api/v1/user/order";

    /// Prefix of the order detail endpoint, followed by the order key
    pub const ORDER_DETAIL_PATH: &str = "/api/v1/order/";

    /// Name of the session cookie
    pub const SESSION_COOKIE_NAME: &str = "_simple_auth";

    /// Header the storefront expects on API requests
    pub const REQUESTED_BY_HEADER: &str = "X-Requested-By";

    /// Value for [`REQUESTED_BY_HEADER`]
    pub const REQUESTED_BY_VALUE: &str = "hb_android_app";

    /// Path fragment the storefront redirects to when a session is not valid
    pub const LOGIN_PATH_FRAGMENT: &str = "/login";
}

/// Rate limiting and retry configuration
pub mod limits {
    /// Default ceiling for API requests (requests per second)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 4;

    /// Attempts per API request or file transfer before giving up
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Base delay for exponential backoff (milliseconds)
    pub const RETRY_BASE_DELAY_MS: u64 = 1000;

    /// Maximum backoff delay between attempts (seconds)
    pub const MAX_BACKOFF_SECS: u64 = 60;

    /// Longest Retry-After we are willing to sleep through (seconds)
    pub const MAX_RETRY_AFTER_SECS: u64 = 120;

    /// Retry-After assumed when a 429 carries no usable header (seconds)
    pub const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

    /// Randomization factor applied to backoff delays
    pub const BACKOFF_JITTER_FACTOR: f64 = 0.1;
}

/// File handling constants
pub mod files {
    /// Suffix of in-progress downloads, next to the final path
    pub const TEMP_FILE_SUFFIX: &str = ".hbpart";

    /// Name of the hash index kept in the download root
    pub const HASH_INDEX_FILE: &str = ".hb_hash_index.json";

    /// Hash index schema version written by this build
    pub const HASH_INDEX_VERSION: u32 = 1;

    /// Default chunk size for downloading and hashing (bytes)
    pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

    /// Smallest accepted chunk size (bytes)
    pub const MIN_CHUNK_SIZE: usize = 1024;

    /// Largest accepted chunk size (bytes)
    pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

    /// Project-local config file name
    pub const LOCAL_CONFIG_FILE: &str = "hb-downloader.toml";

    /// Directory under the user config dir
    pub const CONFIG_DIR_NAME: &str = "hb-downloader";
}

/// Worker pool configuration
pub mod workers {
    use super::Duration;

    /// Default number of concurrent file transfers
    pub const DEFAULT_WORKER_COUNT: usize = 4;

    /// Upper bound on concurrent file transfers
    pub const MAX_WORKER_COUNT: usize = 32;

    /// Jobs buffered ahead of the workers
    pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

    /// Minimum interval between progress events for one file
    pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

    /// Poll interval while waiting for another worker to release a path
    pub const CLAIM_POLL_INTERVAL: Duration = Duration::from_millis(50);
}

/// Platform names used by the storefront and by the CLI groups
pub mod platforms {
    /// Platforms selected by the `games` group
    pub const GAMES: &[&str] = &["android", "asmjs", "linux", "mac", "windows"];

    /// Platforms selected by the `ebooks` group
    pub const EBOOKS: &[&str] = &["ebook"];

    /// Platforms selected by the `audio` group
    pub const AUDIO: &[&str] = &["audio"];
}

// Re-export commonly used constants at module level
pub use files::{DEFAULT_CHUNK_SIZE, TEMP_FILE_SUFFIX};
pub use http::USER_AGENT;
pub use limits::{DEFAULT_RATE_LIMIT_RPS, MAX_ATTEMPTS};
pub use workers::DEFAULT_WORKER_COUNT;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_suffix_is_distinct() {
        assert!(TEMP_FILE_SUFFIX.starts_with('.'));
        assert_ne!(TEMP_FILE_SUFFIX, files::HASH_INDEX_FILE);
    }

    #[test]
    fn test_user_agent_has_version() {
        assert!(USER_AGENT.starts_with("hb_fetcher/"));
    }

    #[test]
    fn test_platform_groups_are_disjoint() {
        for game in platforms::GAMES {
            assert!(!platforms::EBOOKS.contains(game));
            assert!(!platforms::AUDIO.contains(game));
        }
    }
}
