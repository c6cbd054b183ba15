//! Exponential backoff with jitter, retrying only transient failures.

use std::time::Duration;

use tracing::debug;

use quarry_core::config::ResilienceConfig;
use quarry_core::errors::{DependencyError, QuarryError, QuarryResult};
use quarry_core::models::Dependency;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// Each delay is drawn from `[d * (1 - j), d * (1 + j)]`.
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&ResilienceConfig::default())
    }
}

impl From<&ResilienceConfig> for RetryPolicy {
    fn from(config: &ResilienceConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.backoff_multiplier.max(1.0),
            jitter_ratio: config.jitter_ratio.clamp(0.0, 1.0),
        }
    }
}

/// What a retried call ended with.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: QuarryResult<T>,
    pub attempts: u32,
    /// Transient failures absorbed along the way.
    pub transient_failures: u32,
}

impl RetryPolicy {
    /// Un-jittered delay before retry number `retry` (1-based).
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exp = self.multiplier.powi(retry.saturating_sub(1) as i32);
        let ms = self.initial_backoff.as_millis() as f64 * exp;
        let capped = ms.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Jittered delay before retry number `retry`, never above `max_backoff`.
    pub fn delay(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry).as_millis() as f64;
        let spread = 1.0 - self.jitter_ratio + 2.0 * self.jitter_ratio * fastrand::f64();
        let ms = (base * spread).min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(ms.max(0.0) as u64)
    }

    /// Run `op` until it succeeds, fails non-transiently, or attempts run
    /// out. Exhaustion becomes `DependencyError::RetriesExhausted`.
    pub fn execute<T, F>(&self, dependency: Dependency, mut op: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> QuarryResult<T>,
    {
        let mut transient_failures = 0;
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                        transient_failures,
                    }
                }
                Err(err) if err.is_transient() => {
                    transient_failures += 1;
                    if attempt >= self.max_attempts {
                        return RetryOutcome {
                            result: Err(exhausted(dependency, attempt, &err)),
                            attempts: attempt,
                            transient_failures,
                        };
                    }
                    let delay = self.delay(attempt);
                    debug!(
                        dependency = dependency.as_str(),
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient failure"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => {
                    return RetryOutcome {
                        result: Err(err),
                        attempts: attempt,
                        transient_failures,
                    }
                }
            }
        }
    }
}

fn exhausted(dependency: Dependency, attempts: u32, last: &QuarryError) -> QuarryError {
    let reason = match last {
        QuarryError::Dependency(DependencyError::Transient { reason, .. }) => reason.clone(),
        other => other.to_string(),
    };
    DependencyError::RetriesExhausted {
        dependency,
        attempts,
        reason,
    }
    .into()
}
