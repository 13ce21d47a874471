//! HTTP client configuration and building logic
//!
//! API calls and file transfers use separately built clients: the API client
//! carries the session cookie jar and a total request timeout, the transfer
//! client carries neither since file hosts use signed URLs and large files can
//! legitimately take hours.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{redirect, Client};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::app::retry::RetryPolicy;
use crate::constants::{http, limits, storefront};
use crate::errors::{ApiError, ApiResult, AuthError, AuthResult};

/// Configuration for talking to the storefront and its file hosts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Storefront base URL
    pub base_url: String,
    /// Total timeout for one API request
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Connect timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// TCP nodelay (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
    /// Connection pool idle timeout
    #[serde(with = "humantime_serde")]
    pub pool_idle_timeout: Duration,
    /// Maximum idle connections per host
    pub pool_max_per_host: usize,
    /// Ceiling on API requests per second, shared by all API calls
    pub rate_limit_rps: u32,
    /// Retry budget for API calls
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: storefront::BASE_URL.to_string(),
            request_timeout: http::DEFAULT_TIMEOUT,
            connect_timeout: http::CONNECT_TIMEOUT,
            tcp_nodelay: true,
            pool_idle_timeout: http::POOL_IDLE_TIMEOUT,
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Parsed base URL
    pub fn parsed_base_url(&self) -> ApiResult<Url> {
        Url::parse(&self.base_url).map_err(|e| ApiError::InvalidUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })
    }

    pub fn with_rate_limit(mut self, rate_limit_rps: u32) -> Self {
        self.rate_limit_rps = rate_limit_rps;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Builds the API client for one session, with its own cookie jar
    pub fn build_api_client(&self, jar: Arc<Jar>) -> AuthResult<Client> {
        let mut headers = HeaderMap::new();
        headers.insert(
            storefront::REQUESTED_BY_HEADER,
            HeaderValue::from_static(storefront::REQUESTED_BY_VALUE),
        );

        self.base_builder()
            .cookie_provider(jar)
            .default_headers(headers)
            .timeout(self.request_timeout)
            .build()
            .map_err(AuthError::Client)
    }

    /// Builds the client used for file transfers
    pub fn build_download_client(&self) -> reqwest::Result<Client> {
        self.base_builder().build()
    }

    fn base_builder(&self) -> reqwest::ClientBuilder {
        Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(http::USER_AGENT)
            .tcp_nodelay(self.tcp_nodelay)
            .pool_idle_timeout(self.pool_idle_timeout)
            .pool_max_idle_per_host(self.pool_max_per_host)
            .redirect(redirect::Policy::limited(http::MAX_REDIRECTS))
    }
}
