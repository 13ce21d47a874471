//! Storefront API session layer
//!
//! The module is organized into specialized components:
//! - `config`: HTTP client configuration and building
//! - `auth`: session cookie validation and the [`Session`] handle
//! - `http`: rate-limited requests with bounded retries
//! - `api`: response shapes and conversion into orders and files

use reqwest::StatusCode;
use tracing::{debug, info};
use url::Url;

use crate::app::models::{Credential, OrderDetail, OrderKey};
use crate::constants::storefront;
use crate::errors::{ApiError, ApiResult, AuthResult};

pub mod api;
pub mod auth;
pub mod config;
pub mod http;

pub use auth::Session;
pub use config::ClientConfig;

use auth::{order_list_url, AuthHandler};
use http::HttpHandler;

/// Client for the storefront's order endpoints
///
/// Holds configuration and the shared rate limiter, but no login state: each
/// call names the [`Session`] it runs under.
#[derive(Debug)]
pub struct StorefrontClient {
    config: ClientConfig,
    base_url: Url,
    http: HttpHandler,
}

impl StorefrontClient {
    /// Creates a client; fails only if the configured base URL is invalid
    pub fn new(config: ClientConfig) -> ApiResult<Self> {
        let base_url = config.parsed_base_url()?;
        let http = HttpHandler::new(config.rate_limit_rps, config.retry.clone());
        Ok(Self {
            config,
            base_url,
            http,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Validate a credential and open a session
    pub async fn authenticate(&self, credential: &Credential) -> AuthResult<Session> {
        AuthHandler::new(&self.config, &self.http)
            .authenticate(credential)
            .await
    }

    /// All order keys of the logged-in user, in storefront order
    pub async fn list_order_keys(&self, session: &Session) -> ApiResult<Vec<OrderKey>> {
        let url = order_list_url(&self.base_url);
        let body = self.fetch(session, &url, None).await?;
        let keys = api::parse_order_keys(url.path(), &body)?;
        info!("{} orders found", keys.len());
        Ok(keys)
    }

    /// Fetch and parse one order
    pub async fn fetch_order_detail(
        &self,
        session: &Session,
        order_key: &OrderKey,
    ) -> ApiResult<OrderDetail> {
        let url = self.order_detail_url(order_key);
        let body = self.fetch(session, &url, Some(order_key)).await?;
        let order = api::parse_order_detail(url.path(), order_key, &body)?;
        debug!(
            "Order {} ({}) has {} downloadable files",
            order.order_key,
            order.human_name,
            order.files.len()
        );
        Ok(order)
    }

    fn order_detail_url(&self, order_key: &OrderKey) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(&format!(
            "{}{}",
            storefront::ORDER_DETAIL_PATH,
            urlencoding::encode(order_key.as_str())
        ));
        url.set_query(Some("all_tpkds=true"));
        url
    }

    async fn fetch(
        &self,
        session: &Session,
        url: &Url,
        order_key: Option<&OrderKey>,
    ) -> ApiResult<Vec<u8>> {
        let endpoint = url.path().to_string();
        let response = self.http.get(session.client(), url).await?;
        let status = response.status();

        match status {
            s if s.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(ApiError::NotFound {
                    order_key: order_key
                        .map(|k| k.to_string())
                        .unwrap_or_else(|| endpoint.clone()),
                })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ApiError::Unauthorized {
                    status: status.as_u16(),
                })
            }
            _ => {
                return Err(ApiError::Server {
                    endpoint,
                    status: status.as_u16(),
                })
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::NetworkError {
                endpoint: endpoint.clone(),
                message: e.to_string(),
            })?;
        Ok(body.to_vec())
    }
}
