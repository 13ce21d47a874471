//! Storefront API requests with rate limiting and retry logic
//!
//! Every API call goes through one shared rate limiter, so the number of
//! download workers has no bearing on how hard the storefront API is hit.
//! Transient failures (timeouts, connection errors, 5xx, 429) are retried here
//! and never reach the caller unless the budget runs out.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Jitter, Quota, RateLimiter};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::app::retry::{retry_after, RetryPolicy};
use crate::constants::limits;
use crate::errors::{ApiError, ApiResult};

/// HTTP operations handler with resilience patterns
#[derive(Debug)]
pub struct HttpHandler {
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    retry: RetryPolicy,
}

impl HttpHandler {
    /// Creates a handler allowing `rate_limit_rps` requests per second
    ///
    /// A zero rate is treated as one request per second.
    pub fn new(rate_limit_rps: u32, retry: RetryPolicy) -> Self {
        let rate = NonZeroU32::new(rate_limit_rps).unwrap_or(NonZeroU32::MIN);
        Self {
            rate_limiter: RateLimiter::direct(Quota::per_second(rate)),
            retry,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// GET `url` with `client`, retrying transient failures
    ///
    /// Returns the first response that is neither a 429 nor a server error;
    /// classifying 4xx statuses is left to the caller.
    pub async fn get(&self, client: &Client, url: &Url) -> ApiResult<Response> {
        let endpoint = url.path().to_string();
        let mut schedule = self.retry.schedule();

        loop {
            let attempt = schedule.start_attempt();

            self.rate_limiter
                .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
                .await;

            match client.get(url.as_str()).send().await {
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let suggested = retry_after(response.headers()).unwrap_or(Duration::from_secs(
                        limits::DEFAULT_RETRY_AFTER_SECS,
                    ));

                    if !schedule.can_retry() || suggested > self.retry.max_retry_after {
                        warn!(
                            "Rate limited on {} after {} attempts (retry after {:?})",
                            endpoint, attempt, suggested
                        );
                        return Err(ApiError::RateLimited {
                            retry_after: suggested,
                        });
                    }

                    let delay = suggested.max(schedule.next_delay());
                    warn!(
                        "Rate limited by storefront (429) on {}. Waiting {}ms",
                        endpoint,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(response) if is_transient_status(response.status()) => {
                    let status = response.status().as_u16();
                    if !schedule.can_retry() {
                        warn!(
                            "Storefront returned HTTP {} for {} after {} attempts",
                            status, endpoint, attempt
                        );
                        return Err(ApiError::Server { endpoint, status });
                    }

                    let delay = schedule.next_delay();
                    warn!(
                        "HTTP {} from {} (attempt {}/{}). Retrying in {}ms",
                        status,
                        endpoint,
                        attempt,
                        self.retry.max_attempts,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(response) => {
                    debug!("HTTP {} from {}", response.status(), endpoint);
                    return Ok(response);
                }
                Err(e) if schedule.can_retry() => {
                    let delay = schedule.next_delay();
                    warn!(
                        "Request to {} failed (attempt {}/{}): {}. Retrying in {}ms",
                        endpoint,
                        attempt,
                        self.retry.max_attempts,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(
                        "Request to {} failed after {} attempts: {}",
                        endpoint, attempt, e
                    );
                    return Err(ApiError::NetworkError {
                        endpoint,
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}

/// Statuses worth retrying besides 429
pub fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT
}
