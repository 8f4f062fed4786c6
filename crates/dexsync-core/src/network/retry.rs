//! Bounded retries with exponential backoff and jitter.

use crate::config::UpstreamDefaults;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: UpstreamDefaults::MAX_ATTEMPTS,
            base_delay: UpstreamDefaults::RETRY_BASE_DELAY,
            max_delay: UpstreamDefaults::RETRY_MAX_DELAY,
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `attempt` (0-indexed).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let multiplier = self.exponential_base.powi(attempt as i32);
        let capped_secs =
            (self.base_delay.as_secs_f64() * multiplier).min(self.max_delay.as_secs_f64());

        let final_secs = if self.jitter {
            // Scale by 0.5..1.5: same mean, never near zero.
            let factor = rand::rng().random_range(0.5..1.5);
            (capped_secs * factor).min(self.max_delay.as_secs_f64())
        } else {
            capped_secs
        };

        Duration::from_secs_f64(final_secs)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetryStats {
    pub attempts: u32,
    pub total_delay: Duration,
    pub success: bool,
    pub last_error: Option<String>,
}

/// Run `operation` until it succeeds, fails with an error `should_retry`
/// rejects, or the attempts run out.
///
/// `what` names the operation in log lines. An error may ask for a minimum
/// wait before the next attempt (a `Retry-After` header, say) through
/// `wait_hint`; the wait is then the larger of the backoff delay and the
/// hint, with the hint capped at `max_delay`.
pub async fn retry_async<F, Fut, T, E>(
    config: &RetryConfig,
    what: &str,
    mut operation: F,
    should_retry: impl Fn(&E) -> bool,
    wait_hint: impl Fn(&E) -> Option<Duration>,
) -> (Result<T, E>, RetryStats)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut stats = RetryStats::default();
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        stats.attempts = attempt + 1;

        let err = match operation().await {
            Ok(value) => {
                stats.success = true;
                if attempt > 0 {
                    debug!("{} succeeded after {} attempts", what, attempt + 1);
                }
                return (Ok(value), stats);
            }
            Err(e) => e,
        };

        stats.last_error = Some(err.to_string());

        if !should_retry(&err) {
            debug!("{} failed permanently: {}", what, err);
            return (Err(err), stats);
        }

        if attempt + 1 >= max_attempts {
            warn!(
                "{}: all {} attempts exhausted. Last error: {}",
                what, max_attempts, err
            );
            return (Err(err), stats);
        }

        let backoff = config.calculate_delay(attempt);
        let delay = match wait_hint(&err) {
            Some(hint) => backoff.max(hint.min(config.max_delay)),
            None => backoff,
        };
        stats.total_delay += delay;
        warn!(
            "{}: attempt {}/{} failed: {}. Retrying in {:?}",
            what,
            attempt + 1,
            max_attempts,
            err,
            delay
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_delay_calculation_no_jitter() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_millis(500))
            .with_jitter(false);

        assert_eq!(config.calculate_delay(0), Duration::from_millis(500));
        assert_eq!(config.calculate_delay(1), Duration::from_secs(1));
        assert_eq!(config.calculate_delay(2), Duration::from_secs(2));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_secs(4))
            .with_max_delay(Duration::from_secs(10))
            .with_jitter(false);

        assert_eq!(config.calculate_delay(3), Duration::from_secs(10));
    }

    #[test]
    fn test_delay_with_jitter_stays_in_band() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_secs(2))
            .with_jitter(true);

        for _ in 0..20 {
            let delay = config.calculate_delay(0);
            assert!(delay >= Duration::from_secs(1) && delay <= Duration::from_secs(3));
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let config = RetryConfig::new()
            .with_max_attempts(3)
            .with_base_delay(Duration::from_millis(5))
            .with_jitter(false);

        let counter = Arc::new(AtomicU32::new(0));
        let (result, stats) = retry_async(
            &config,
            "fetch pokemon 1",
            || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("503".to_string())
                    } else {
                        Ok(1)
                    }
                }
            },
            |_: &String| true,
            |_: &String| None,
        )
        .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(stats.attempts, 3);
        assert!(stats.success);
    }

    #[tokio::test]
    async fn test_exhausted() {
        let config = RetryConfig::new()
            .with_max_attempts(2)
            .with_base_delay(Duration::from_millis(5))
            .with_jitter(false);

        let (result, stats) = retry_async(
            &config,
            "fetch",
            || async { Err::<u32, _>("timeout".to_string()) },
            |_: &String| true,
            |_: &String| None,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(stats.attempts, 2);
        assert_eq!(stats.last_error.as_deref(), Some("timeout"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_hint_extends_backoff() {
        let config = RetryConfig::new()
            .with_max_attempts(2)
            .with_base_delay(Duration::from_millis(5))
            .with_max_delay(Duration::from_secs(10))
            .with_jitter(false);

        let started = tokio::time::Instant::now();
        let (result, stats) = retry_async(
            &config,
            "fetch",
            || async { Err::<u32, _>("429".to_string()) },
            |_: &String| true,
            |_: &String| Some(Duration::from_secs(2)),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(stats.total_delay, Duration::from_secs(2));
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_hint_is_capped_at_max_delay() {
        let config = RetryConfig::new()
            .with_max_attempts(2)
            .with_base_delay(Duration::from_millis(5))
            .with_max_delay(Duration::from_secs(3))
            .with_jitter(false);

        let (_, stats) = retry_async(
            &config,
            "fetch",
            || async { Err::<u32, _>("429".to_string()) },
            |_: &String| true,
            |_: &String| Some(Duration::from_secs(3600)),
        )
        .await;

        assert_eq!(stats.total_delay, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let config = RetryConfig::new().with_max_attempts(3);

        let (result, stats) = retry_async(
            &config,
            "fetch",
            || async { Err::<u32, _>("404".to_string()) },
            |e: &String| e != "404",
            |_: &String| None,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(stats.attempts, 1);
    }
}
