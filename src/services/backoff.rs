// src/services/backoff.rs

//! Per-source retry and cool-down policy.
//!
//! Each source owns one [`BackoffPolicy`]. An invocation either fails fast
//! while the source is cooling down, or performs up to `max_retries` attempts
//! through a [`Fetch`] implementation:
//!
//! - transport failures (timeouts, refused connections) are retried after
//!   `retry_base_delay * 2^attempt`
//! - any non-2xx answer fails the invocation at once
//! - every failed invocation doubles the cool-down, capped at `max`
//! - a success resets the error count and the cool-down to `initial`

use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::models::BackoffConfig;
use crate::utils::http::{Fetch, FetchRequest};

/// Tunables for one policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSettings {
    pub initial: Duration,
    pub max: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self::from(&BackoffConfig::default())
    }
}

impl From<&BackoffConfig> for BackoffSettings {
    fn from(config: &BackoffConfig) -> Self {
        Self {
            initial: config.initial(),
            max: config.max(),
            max_retries: config.max_retries,
            retry_base_delay: config.retry_base_delay(),
        }
    }
}

/// Externally visible state of a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyState {
    /// No failure since the last success
    Ready,
    /// A failure happened less than `backoff` ago; invocations fail fast
    CoolingDown { remaining: Duration },
    /// The last invocation failed and the cool-down has elapsed
    Exhausted,
}

/// Snapshot of a source's health for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceHealth {
    pub last_error: Option<DateTime<Utc>>,
    pub error_count: u32,
    pub backoff: Duration,
    pub max_backoff: Duration,
    pub max_retries: u32,
    pub state: PolicyState,
}

#[derive(Debug)]
struct HealthState {
    last_error: Option<(Instant, DateTime<Utc>)>,
    error_count: u32,
    backoff: Duration,
}

/// Retry/backoff state machine for a single source.
#[derive(Debug)]
pub struct BackoffPolicy {
    source: String,
    settings: BackoffSettings,
    state: Mutex<HealthState>,
}

impl BackoffPolicy {
    pub fn new(source: impl Into<String>, settings: BackoffSettings) -> Self {
        let state = HealthState {
            last_error: None,
            error_count: 0,
            backoff: settings.initial,
        };
        Self {
            source: source.into(),
            settings,
            state: Mutex::new(state),
        }
    }

    pub fn settings(&self) -> &BackoffSettings {
        &self.settings
    }

    /// Run `request` through `fetcher` under this policy.
    pub async fn execute(&self, fetcher: &dyn Fetch, request: &FetchRequest) -> Result<String> {
        if let PolicyState::CoolingDown { .. } = self.state() {
            let backoff = self.with_state(|s| s.backoff);
            log::debug!(
                "{}: cooling down, skipping request ({}s backoff)",
                self.source,
                backoff.as_secs()
            );
            return Err(AppError::unavailable(format!(
                "Website is in backoff period. Retry in {} seconds.",
                backoff.as_secs()
            )));
        }

        let attempts = self.settings.max_retries.max(1);
        let mut attempt = 0;
        loop {
            match fetcher.fetch(request).await {
                Ok(body) => {
                    self.record_success();
                    return Ok(body);
                }
                Err(error) if error.is_transient() && attempt + 1 < attempts => {
                    let delay = self.retry_delay(attempt);
                    log::warn!(
                        "{}: attempt {}/{} failed ({}), retrying in {:?}",
                        self.source,
                        attempt + 1,
                        attempts,
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    self.record_failure();
                    return Err(Self::final_error(error));
                }
            }
        }
    }

    /// Delay before the attempt following `attempt` (0-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.settings
            .retry_base_delay
            .saturating_mul(1u32 << attempt.min(16))
    }

    /// Clear all failure history.
    pub fn record_success(&self) {
        self.with_state(|s| {
            if s.error_count > 0 {
                log::info!("{}: recovered after {} error(s)", self.source, s.error_count);
            }
            s.error_count = 0;
            s.backoff = self.settings.initial;
            s.last_error = None;
        });
    }

    /// Register a failed invocation and double the cool-down.
    pub fn record_failure(&self) {
        self.with_state(|s| {
            s.error_count += 1;
            s.backoff = s.backoff.saturating_mul(2).min(self.settings.max);
            s.last_error = Some((Instant::now(), Utc::now()));
            log::warn!(
                "{}: error #{}, backing off for {}s",
                self.source,
                s.error_count,
                s.backoff.as_secs()
            );
        });
    }

    /// Current externally visible state.
    pub fn state(&self) -> PolicyState {
        self.with_state(|s| match s.last_error {
            None => PolicyState::Ready,
            Some((at, _)) => {
                let elapsed = at.elapsed();
                if elapsed < s.backoff {
                    PolicyState::CoolingDown {
                        remaining: s.backoff - elapsed,
                    }
                } else {
                    PolicyState::Exhausted
                }
            }
        })
    }

    pub fn health(&self) -> SourceHealth {
        let state = self.state();
        self.with_state(|s| SourceHealth {
            last_error: s.last_error.map(|(_, at)| at),
            error_count: s.error_count,
            backoff: s.backoff,
            max_backoff: self.settings.max,
            max_retries: self.settings.max_retries,
            state,
        })
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut HealthState) -> T) -> T {
        // Counters stay consistent under poisoning; every write is a plain store.
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// Error surfaced once an invocation gives up.
    fn final_error(error: AppError) -> AppError {
        match error {
            AppError::Transport { timeout: true, .. } => AppError::Timeout,
            AppError::Transport { message, .. } => AppError::unavailable(message),
            other => other,
        }
    }
}
