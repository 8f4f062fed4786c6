//! HTTP client with request pacing and rate-limit awareness.
//!
//! - Minimum spacing between requests (governor)
//! - Rate limit tracking from `X-RateLimit-*` headers
//! - Extra back-off when the remaining budget runs low

use crate::config::UpstreamDefaults;
use crate::error::{DexError, Result};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{header, Client, Response, StatusCode};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

type Pacer = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limit state extracted from response headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitState {
    pub remaining: Option<u64>,
    pub limit: Option<u64>,
    /// Unix timestamp when the window resets.
    pub reset: Option<u64>,
}

impl RateLimitState {
    /// Throttle once fewer than 10% of the window's requests remain.
    pub fn should_throttle(&self) -> bool {
        match (self.remaining, self.limit) {
            (Some(remaining), Some(limit)) if limit > 0 => {
                let threshold = (limit as f64 * 0.1) as u64;
                remaining < threshold.max(1)
            }
            _ => false,
        }
    }
}

pub struct HttpClient {
    client: Client,
    pacer: Option<Pacer>,
    rate_limit_remaining: AtomicI64,
    rate_limit_limit: AtomicU64,
    rate_limit_reset: AtomicU64,
    timeout: Duration,
    throttle_delay: Duration,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        Self::with_settings(
            UpstreamDefaults::REQUEST_TIMEOUT,
            UpstreamDefaults::MIN_REQUEST_INTERVAL,
        )
    }

    /// `min_interval` of zero disables pacing.
    pub fn with_settings(timeout: Duration, min_interval: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(UpstreamDefaults::USER_AGENT)
            .build()
            .map_err(|e| DexError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(e),
            })?;

        let pacer = Quota::with_period(min_interval).map(RateLimiter::direct);

        Ok(Self {
            client,
            pacer,
            rate_limit_remaining: AtomicI64::new(-1),
            rate_limit_limit: AtomicU64::new(0),
            rate_limit_reset: AtomicU64::new(0),
            timeout,
            throttle_delay: Duration::from_millis(500),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn rate_limit_state(&self) -> RateLimitState {
        let remaining = self.rate_limit_remaining.load(Ordering::SeqCst);
        let limit = self.rate_limit_limit.load(Ordering::SeqCst);
        let reset = self.rate_limit_reset.load(Ordering::SeqCst);
        RateLimitState {
            remaining: (remaining >= 0).then_some(remaining as u64),
            limit: (limit > 0).then_some(limit),
            reset: (reset > 0).then_some(reset),
        }
    }

    /// GET a URL. Any status other than 429 is handed back to the caller.
    pub async fn get(&self, url: &str) -> Result<Response> {
        if let Some(pacer) = &self.pacer {
            pacer.until_ready().await;
        }
        self.maybe_throttle().await;

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                DexError::Timeout(self.timeout)
            } else {
                DexError::Network {
                    message: format!("GET {} failed: {}", url, e),
                    source: Some(e),
                }
            }
        })?;

        self.update_rate_limits(&response);
        self.check_rate_limited(response, url)
    }

    async fn maybe_throttle(&self) {
        let state = self.rate_limit_state();
        if state.should_throttle() {
            warn!(
                "Rate limit approaching (remaining: {:?}/{:?}), throttling for {:?}",
                state.remaining, state.limit, self.throttle_delay
            );
            tokio::time::sleep(self.throttle_delay).await;
        }
    }

    fn update_rate_limits(&self, response: &Response) {
        let headers = response.headers();
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        if let Some(num) = read("X-RateLimit-Remaining").and_then(|v| v.parse::<i64>().ok()) {
            self.rate_limit_remaining.store(num, Ordering::SeqCst);
        }
        if let Some(num) = read("X-RateLimit-Limit").and_then(|v| v.parse::<u64>().ok()) {
            self.rate_limit_limit.store(num, Ordering::SeqCst);
        }
        if let Some(num) = read("X-RateLimit-Reset").and_then(|v| v.parse::<u64>().ok()) {
            self.rate_limit_reset.store(num, Ordering::SeqCst);
        }

        let state = self.rate_limit_state();
        if let (Some(remaining), Some(limit)) = (state.remaining, state.limit) {
            debug!("Rate limit: {}/{}", remaining, limit);
        }
    }

    fn check_rate_limited(&self, response: Response, url: &str) -> Result<Response> {
        if response.status() != StatusCode::TOO_MANY_REQUESTS {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());

        Err(DexError::RateLimited {
            service: extract_domain(url),
            retry_after_secs: retry_after,
        })
    }
}

/// Host part of a URL, or `unknown`.
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_state_throttle() {
        let low = RateLimitState {
            remaining: Some(5),
            limit: Some(100),
            reset: None,
        };
        assert!(low.should_throttle());

        let plenty = RateLimitState {
            remaining: Some(50),
            limit: Some(100),
            reset: None,
        };
        assert!(!plenty.should_throttle());
        assert!(!RateLimitState::default().should_throttle());
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            extract_domain("https://pokeapi.co/api/v2/pokemon/1"),
            "pokeapi.co"
        );
        assert_eq!(extract_domain("not a url"), "unknown");
    }

    #[tokio::test]
    async fn test_client_creation() {
        let client = HttpClient::with_settings(Duration::from_secs(5), Duration::ZERO).unwrap();
        assert_eq!(client.timeout(), Duration::from_secs(5));
        assert_eq!(client.rate_limit_state(), RateLimitState::default());
        assert!(client.pacer.is_none());
    }
}
