//! Network plumbing shared by the upstream client and the cache layer.
//!
//! - HTTP client with request pacing and rate-limit tracking
//! - Retry with exponential backoff and jitter

mod client;
mod retry;

pub use client::{extract_domain, HttpClient, RateLimitState};
pub use retry::{retry_async, RetryConfig, RetryStats};
