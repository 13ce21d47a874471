//! Error types for HB Fetcher
//!
//! Each component owns an error enum. Transient faults are retried inside the
//! component that saw them and only surface here once the retry budget is spent;
//! structural faults (invalid login, integrity mismatch, malformed responses,
//! unwritable destinations) are surfaced immediately and never retried.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::app::hash::ContentHash;

/// Authentication errors raised while validating a session credential
#[derive(Error, Debug)]
pub enum AuthError {
    /// The storefront rejected the credential
    #[error("Login to the storefront failed. Please verify your session cookie")]
    Invalid,

    /// The storefront could not be reached; says nothing about the credential
    #[error("Could not reach the storefront while logging in: {message}")]
    NetworkError { message: String },

    /// No credential was supplied by any configuration source
    #[error(
        "No session cookie configured. Set HB_SESSION_COOKIE, pass --auth-cookie or add session-cookie to the config file"
    )]
    MissingCredential,

    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Errors from the order-listing and order-detail endpoints
#[derive(Error, Debug)]
pub enum ApiError {
    /// The storefront asked us to slow down
    #[error("Rate limited by the storefront, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// The order key no longer resolves
    #[error("Order {order_key} not found")]
    NotFound { order_key: String },

    /// The response body did not have the expected shape
    #[error("Unexpected response from {endpoint}: {reason}")]
    ParseError { endpoint: String, reason: String },

    /// Transport failure after all retries
    #[error("Network error talking to {endpoint}: {message}")]
    NetworkError { endpoint: String, message: String },

    /// The storefront kept failing with a server error
    #[error("Storefront returned HTTP {status} for {endpoint}")]
    Server { endpoint: String, status: u16 },

    /// The session stopped being accepted mid-run
    #[error("Session rejected by the storefront (HTTP {status})")]
    Unauthorized { status: u16 },

    /// A URL could not be built from the configured base
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Errors from a single file transfer
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Retry budget spent; the partial file is kept for a later resume
    #[error("Transfer failed at byte {offset} after {attempts} attempts: {reason}")]
    TransferFailed {
        offset: u64,
        attempts: u32,
        reason: String,
    },

    /// Content hash did not match; the partial file is kept for inspection
    #[error("Hash mismatch for {path}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        path: PathBuf,
        expected: ContentHash,
        actual: ContentHash,
    },

    /// Received more or fewer bytes than declared
    #[error("Size mismatch for {path}: expected {expected} bytes, got {actual} bytes")]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// Destination directory, temporary file or final rename failed
    #[error("Cannot write to {path}: {source}")]
    DestinationUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File host refused the request in a way retries will not fix
    #[error("File host rejected the request with HTTP {status}")]
    Rejected { status: u16 },

    /// Run was cancelled while this file was in flight
    #[error("Cancelled at byte {offset}; partial file kept for resume")]
    Cancelled { offset: u64 },

    /// Hash index could not be updated after a verified transfer
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Hash index errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Reading or writing the index failed
    #[error("Hash index I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Index could not be serialized
    #[error("Failed to serialize hash index: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Hashing task panicked or was cancelled
    #[error("Hashing task failed: {0}")]
    Task(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file given explicitly but missing
    #[error("Config file not found: {path}")]
    NotFound { path: PathBuf },

    /// Config file exists but could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for our schema
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Download location missing or not writable
    #[error("Download location {path} is not usable: {reason}")]
    DownloadRoot { path: PathBuf, reason: String },

    /// A value is out of range
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    /// Platform name not recognised
    #[error("Unknown platform or platform group: {0}")]
    UnknownPlatform(String),
}

/// Main application error type that encompasses all component errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable by running again later
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Auth(AuthError::NetworkError { .. })
            | AppError::Api(ApiError::RateLimited { .. })
            | AppError::Api(ApiError::NetworkError { .. })
            | AppError::Api(ApiError::Server { .. })
            | AppError::Download(DownloadError::TransferFailed { .. })
            | AppError::Download(DownloadError::Cancelled { .. }) => true,

            AppError::Auth(_)
            | AppError::Api(_)
            | AppError::Download(_)
            | AppError::Store(_)
            | AppError::Config(_) => false,

            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Auth(_) => "authentication",
            AppError::Api(_) => "api",
            AppError::Download(_) => "download",
            AppError::Store(_) => "hash-store",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

impl ApiError {
    /// Short machine-friendly name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::RateLimited { .. } => "rate-limited",
            ApiError::NotFound { .. } => "not-found",
            ApiError::ParseError { .. } => "parse-error",
            ApiError::NetworkError { .. } => "network-error",
            ApiError::Server { .. } => "server-error",
            ApiError::Unauthorized { .. } => "unauthorized",
            ApiError::InvalidUrl { .. } => "invalid-url",
        }
    }
}

impl DownloadError {
    /// Short machine-friendly name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            DownloadError::TransferFailed { .. } => "transfer-failed",
            DownloadError::IntegrityMismatch { .. } => "integrity-mismatch",
            DownloadError::SizeMismatch { .. } => "size-mismatch",
            DownloadError::DestinationUnwritable { .. } => "destination-unwritable",
            DownloadError::Rejected { .. } => "rejected",
            DownloadError::Cancelled { .. } => "cancelled",
            DownloadError::Store(_) => "hash-store",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Authentication result type alias
pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// Storefront API result type alias
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Download result type alias
pub type DownloadResult<T> = std::result::Result<T, DownloadError>;

/// Hash index result type alias
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
