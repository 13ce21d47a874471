//! Session authentication
//!
//! A [`Session`] is an HTTP client whose cookie jar holds one credential. It is
//! passed explicitly to every API call; nothing about the login is stored
//! globally.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::cookie::Jar;
use reqwest::{Client, StatusCode};
use tracing::{debug, info};
use url::Url;

use super::config::ClientConfig;
use super::http::HttpHandler;
use crate::app::models::Credential;
use crate::constants::storefront;
use crate::errors::{AuthError, AuthResult};

/// Authenticated handle used for API calls
#[derive(Debug, Clone)]
pub struct Session {
    client: Client,
    authenticated_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    pub fn authenticated_at(&self) -> DateTime<Utc> {
        self.authenticated_at
    }
}

/// Builds sessions and checks them against the storefront
#[derive(Debug)]
pub struct AuthHandler<'a> {
    config: &'a ClientConfig,
    http: &'a HttpHandler,
}

impl<'a> AuthHandler<'a> {
    pub fn new(config: &'a ClientConfig, http: &'a HttpHandler) -> Self {
        Self { config, http }
    }

    /// Validate `credential` and return a session carrying it
    ///
    /// The session is checked against the order-list endpoint. A 401/403, a redirect to the
    /// login page or a body that is not an order list means the credential was
    /// rejected. Transport failures are reported separately.
    pub async fn authenticate(&self, credential: &Credential) -> AuthResult<Session> {
        if credential.is_empty() {
            return Err(AuthError::MissingCredential);
        }

        let base = self
            .config
            .parsed_base_url()
            .map_err(|e| AuthError::NetworkError {
                message: e.to_string(),
            })?;

        info!("Step 1: Building session for {}", base);
        let jar = Arc::new(Jar::default());
        jar.add_cookie_str(
            &format!(
                "{}={}; Path=/",
                storefront::SESSION_COOKIE_NAME,
                credential.expose()
            ),
            &base,
        );
        let client = self.config.build_api_client(jar)?;

        info!("Step 2: Validating session cookie");
        let check_url = order_list_url(&base);
        let response = self
            .http
            .get(&client, &check_url)
            .await
            .map_err(|e| AuthError::NetworkError {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            debug!("Session check rejected with HTTP {}", status);
            return Err(AuthError::Invalid);
        }
        if response
            .url()
            .path()
            .contains(storefront::LOGIN_PATH_FRAGMENT)
        {
            debug!("Session check redirected to {}", response.url());
            return Err(AuthError::Invalid);
        }
        if !status.is_success() {
            return Err(AuthError::NetworkError {
                message: format!("unexpected HTTP {} from {}", status, check_url.path()),
            });
        }

        let body = response.bytes().await.map_err(|e| AuthError::NetworkError {
            message: e.to_string(),
        })?;
        if serde_json::from_slice::<Vec<serde_json::Value>>(&body).is_err() {
            debug!("Session check returned something other than an order list");
            return Err(AuthError::Invalid);
        }

        info!("Step 3: Session cookie accepted");
        Ok(Session {
            client,
            authenticated_at: Utc::now(),
        })
    }
}

/// URL of the order-list endpoint under `base`
pub(crate) fn order_list_url(base: &Url) -> Url {
    let mut url = base.clone();
    url.set_path(storefront::ORDER_LIST_PATH);
    url.set_query(Some("ajax=true"));
    url
}
