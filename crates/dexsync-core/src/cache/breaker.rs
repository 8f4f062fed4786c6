//! Trip switch that stops calling a cache backend after repeated failures.
//!
//! While tripped, the manager treats every cache call as a miss without
//! touching the store. Once the cooldown has passed on the injected clock a
//! few trial calls are let through; one success closes the breaker again and
//! one failure re-trips it.

use crate::clock::{add_duration, Clock};
use crate::config::CacheDefaults;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Backend calls go through.
    Closed,
    /// Backend calls are skipped until the cooldown ends.
    Tripped,
    /// Cooldown over; a limited number of calls test the backend.
    Trial,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive backend failures that trip the breaker.
    pub trip_after: u32,
    pub cooldown: Duration,
    /// Calls let through per trial window.
    pub trial_calls: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            trip_after: CacheDefaults::BREAKER_TRIP_AFTER,
            cooldown: CacheDefaults::BREAKER_COOLDOWN,
            trial_calls: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakerStats {
    pub backend: String,
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub total_successes: u64,
    pub tripped_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    total_failures: u64,
    total_successes: u64,
    tripped_at: Option<DateTime<Utc>>,
    trial_calls_used: u32,
}

/// Guards one cache backend. State changes happen under a single lock.
pub struct BackendBreaker {
    backend: String,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl BackendBreaker {
    pub fn new(backend: impl Into<String>, config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend: backend.into(),
            config,
            clock,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                total_failures: 0,
                total_successes: 0,
                tripped_at: None,
                trial_calls_used: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        self.end_cooldown(&mut inner);
        inner
    }

    fn end_cooldown(&self, inner: &mut Inner) {
        if inner.state != BreakerState::Tripped {
            return;
        }
        let Some(tripped_at) = inner.tripped_at else {
            return;
        };
        if self.clock.now() >= add_duration(tripped_at, self.config.cooldown) {
            inner.state = BreakerState::Trial;
            inner.trial_calls_used = 0;
            debug!("{} cache breaker cooled down, allowing trial calls", self.backend);
        }
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// Whether the next backend call should be made.
    pub fn allow_call(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Tripped => false,
            BreakerState::Trial => {
                inner.trial_calls_used += 1;
                inner.trial_calls_used <= self.config.trial_calls
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.total_successes += 1;
        inner.consecutive_failures = 0;
        if inner.state == BreakerState::Trial {
            inner.state = BreakerState::Closed;
            inner.tripped_at = None;
            info!("{} cache backend answering again, breaker closed", self.backend);
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.total_failures += 1;
        inner.consecutive_failures += 1;

        let trip = match inner.state {
            BreakerState::Closed => inner.consecutive_failures >= self.config.trip_after,
            BreakerState::Trial => true,
            BreakerState::Tripped => false,
        };
        if trip {
            inner.state = BreakerState::Tripped;
            inner.tripped_at = Some(self.clock.now());
            warn!(
                "{} cache backend failed {} times in a row, skipping it for {:?}",
                self.backend, inner.consecutive_failures, self.config.cooldown
            );
        }
    }

    pub fn stats(&self) -> BreakerStats {
        let inner = self.lock();
        BreakerStats {
            backend: self.backend.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            total_failures: inner.total_failures,
            total_successes: inner.total_successes,
            tripped_at: inner.tripped_at,
        }
    }
}
