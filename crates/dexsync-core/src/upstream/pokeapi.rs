//! PokeAPI client.

use super::payload::PokemonPayload;
use super::UpstreamSource;
use crate::config::SyncConfig;
use crate::error::{DexError, Result};
use crate::models::NormalizedRecord;
use crate::network::{retry_async, HttpClient, RetryConfig};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::error::Category;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Point-in-time request metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpstreamMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Percentage, 0-100.
    pub success_rate: f64,
    pub average_response_ms: f64,
    pub total_response_ms: u64,
    pub rate_limit_remaining: Option<u64>,
}

#[derive(Default)]
struct Counters {
    requests: AtomicU64,
    successes: AtomicU64,
    errors: AtomicU64,
    total_ms: AtomicU64,
}

/// HTTP client for `GET {base_url}/pokemon/{id}`.
///
/// Each attempt is paced and counted. Transient failures are retried per the
/// client's [`RetryConfig`]; fatal ones come back immediately.
pub struct PokeApiClient {
    http: HttpClient,
    base_url: String,
    retry: RetryConfig,
    counters: Counters,
}

impl PokeApiClient {
    /// Client with default timeout, pacing and retry settings.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self::with_http(base_url, HttpClient::new()?))
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let http = HttpClient::with_settings(config.request_timeout(), config.min_request_interval())?;
        let retry = RetryConfig::new()
            .with_max_attempts(config.upstream.max_attempts)
            .with_base_delay(Duration::from_millis(config.upstream.retry_base_delay_ms));
        Ok(Self::with_http(config.upstream.base_url.clone(), http).with_retry(retry))
    }

    pub fn with_http(base_url: impl Into<String>, http: HttpClient) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: RetryConfig::default(),
            counters: Counters::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn pokemon_url(&self, id: u32) -> String {
        format!("{}/pokemon/{}", self.base_url, id)
    }

    pub fn metrics_snapshot(&self) -> UpstreamMetrics {
        let total = self.counters.requests.load(Ordering::SeqCst);
        let ok = self.counters.successes.load(Ordering::SeqCst);
        let failed = self.counters.errors.load(Ordering::SeqCst);
        let total_ms = self.counters.total_ms.load(Ordering::SeqCst);

        let (success_rate, average_response_ms) = if total > 0 {
            (
                ok as f64 / total as f64 * 100.0,
                total_ms as f64 / total as f64,
            )
        } else {
            (0.0, 0.0)
        };

        UpstreamMetrics {
            total_requests: total,
            successful_requests: ok,
            failed_requests: failed,
            success_rate,
            average_response_ms,
            total_response_ms: total_ms,
            rate_limit_remaining: self.http.rate_limit_state().remaining,
        }
    }

    /// One attempt, counted in the metrics.
    async fn fetch_once(&self, id: u32) -> Result<NormalizedRecord> {
        let started = Instant::now();
        self.counters.requests.fetch_add(1, Ordering::SeqCst);

        let result = self.request(id).await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.counters.total_ms.fetch_add(elapsed_ms, Ordering::SeqCst);
        match &result {
            Ok(_) => self.counters.successes.fetch_add(1, Ordering::SeqCst),
            Err(_) => self.counters.errors.fetch_add(1, Ordering::SeqCst),
        };
        debug!("GET pokemon {} finished in {}ms", id, elapsed_ms);

        result
    }

    async fn request(&self, id: u32) -> Result<NormalizedRecord> {
        let url = self.pokemon_url(id);
        let response = self.http.get(&url).await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(DexError::NotFound { id });
        }
        if !status.is_success() {
            return Err(DexError::UpstreamStatus {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.bytes().await.map_err(|e| DexError::Decode {
            message: format!("reading body of {} failed: {}", url, e),
        })?;

        let payload: PokemonPayload =
            serde_json::from_slice(&body).map_err(|e| classify_parse_error(id, e))?;

        if payload.id != id {
            return Err(DexError::Malformed {
                id,
                message: format!("response carries id {}", payload.id),
            });
        }

        payload
            .normalize()
            .map_err(|message| DexError::Malformed { id, message })
    }
}

/// Broken JSON is treated as a transport hiccup; well-formed JSON with the
/// wrong shape is a permanent schema mismatch.
fn classify_parse_error(id: u32, err: serde_json::Error) -> DexError {
    match err.classify() {
        Category::Data => DexError::Malformed {
            id,
            message: err.to_string(),
        },
        Category::Syntax | Category::Eof | Category::Io => DexError::Decode {
            message: format!("pokemon {}: {}", id, err),
        },
    }
}

#[async_trait]
impl UpstreamSource for PokeApiClient {
    async fn fetch(&self, id: u32) -> Result<NormalizedRecord> {
        if id == 0 {
            return Err(DexError::validation("id", "must be a positive integer"));
        }

        let what = format!("fetch pokemon {}", id);
        let (result, stats) = retry_async(
            &self.retry,
            &what,
            || self.fetch_once(id),
            DexError::is_retryable,
            DexError::retry_after,
        )
        .await;

        if stats.attempts > 1 {
            debug!(
                "{} took {} attempts ({:?} backoff)",
                what, stats.attempts, stats.total_delay
            );
        }
        result
    }

    fn metrics(&self) -> Option<UpstreamMetrics> {
        Some(self.metrics_snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pokemon_url_trims_slash() {
        let client = PokeApiClient::new("https://pokeapi.co/api/v2/").unwrap();
        assert_eq!(
            client.pokemon_url(25),
            "https://pokeapi.co/api/v2/pokemon/25"
        );
    }

    #[test]
    fn test_parse_error_classification() {
        let eof = serde_json::from_slice::<PokemonPayload>(br#"{"id": 1, "na"#).unwrap_err();
        assert!(classify_parse_error(1, eof).is_retryable());

        let syntax = serde_json::from_slice::<PokemonPayload>(b"<html>502</html>").unwrap_err();
        assert!(classify_parse_error(1, syntax).is_retryable());

        let data = serde_json::from_slice::<PokemonPayload>(br#"{"id": 1}"#).unwrap_err();
        let err = classify_parse_error(1, data);
        assert!(matches!(err, DexError::Malformed { id: 1, .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_zero_id_is_rejected_without_request() {
        let client = PokeApiClient::new("http://127.0.0.1:9").unwrap();
        let err = client.fetch(0).await.unwrap_err();
        assert!(matches!(err, DexError::Validation { .. }));
        assert_eq!(client.metrics_snapshot().total_requests, 0);
    }
}
