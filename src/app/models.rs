//! Data models for HB Fetcher
//!
//! Orders and the files inside them, as the download engine needs them. The
//! storefront returns a lot more metadata; only title, platform, URL, size and
//! declared hash survive parsing.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::app::hash::ContentHash;
use crate::constants::platforms;
use crate::errors::ConfigError;

/// Opaque session token (the storefront's session cookie)
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_string())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Identifier of one purchased bundle
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderKey(String);

impl OrderKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Platform tag attached to each download
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Platform {
    Windows,
    Mac,
    Linux,
    Android,
    Asmjs,
    Ebook,
    Audio,
    Other(String),
}

impl Platform {
    pub fn as_str(&self) -> &str {
        match self {
            Platform::Windows => "windows",
            Platform::Mac => "mac",
            Platform::Linux => "linux",
            Platform::Android => "android",
            Platform::Asmjs => "asmjs",
            Platform::Ebook => "ebook",
            Platform::Audio => "audio",
            Platform::Other(name) => name,
        }
    }

    /// Expand a platform name or one of the `games`, `ebooks`, `audio` groups
    pub fn expand_selector(selector: &str) -> Result<Vec<Platform>, ConfigError> {
        let selector = selector.trim().to_ascii_lowercase();
        let group = match selector.as_str() {
            "games" => platforms::GAMES,
            "ebooks" => platforms::EBOOKS,
            "audio" => platforms::AUDIO,
            _ => {
                return match Platform::from(selector.clone()) {
                    Platform::Other(name) => Err(ConfigError::UnknownPlatform(name)),
                    known => Ok(vec![known]),
                };
            }
        };
        Ok(group.iter().map(|name| Platform::from(*name)).collect())
    }
}

impl From<&str> for Platform {
    fn from(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "windows" => Platform::Windows,
            "mac" => Platform::Mac,
            "linux" => Platform::Linux,
            "android" => Platform::Android,
            "asmjs" => Platform::Asmjs,
            "ebook" => Platform::Ebook,
            "audio" => Platform::Audio,
            other => Platform::Other(other.to_string()),
        }
    }
}

impl From<String> for Platform {
    fn from(name: String) -> Self {
        Platform::from(name.as_str())
    }
}

impl From<Platform> for String {
    fn from(platform: Platform) -> Self {
        platform.as_str().to_string()
    }
}

impl FromStr for Platform {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Platform::from(s))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One downloadable asset within an order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductFile {
    /// File name as served, used for the local file name
    pub display_name: String,
    pub platform: Platform,
    pub url: Url,
    pub declared_size: Option<u64>,
    pub declared_hash: Option<ContentHash>,
    /// Human name of the subproduct this file belongs to
    pub sub_name: String,
}

/// One fetched order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDetail {
    pub order_key: OrderKey,
    pub human_name: String,
    pub created: Option<NaiveDateTime>,
    pub files: Vec<ProductFile>,
}

impl OrderDetail {
    /// Total declared size of all files, ignoring files without a size
    pub fn declared_bytes(&self) -> u64 {
        self.files.iter().filter_map(|f| f.declared_size).sum()
    }
}
