//! Per-dependency circuit breaker.
//!
//! ```text
//!   Closed ──(failure_threshold consecutive failures within window)──> Open
//!   Open ──(cooldown elapsed, next call)──> HalfOpen   (one trial admitted)
//!   HalfOpen ──(trial succeeds)──> Closed
//!   HalfOpen ──(trial fails)──> Open   (cooldown restarts)
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use quarry_core::config::ResilienceConfig;
use quarry_core::errors::DependencyError;
use quarry_core::models::Dependency;
use quarry_observability::events;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub failure_window: Duration,
    pub cooldown: Duration,
}

impl From<&ResilienceConfig> for BreakerConfig {
    fn from(config: &ResilienceConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            failure_window: Duration::from_millis(config.failure_window_ms),
            cooldown: Duration::from_millis(config.cooldown_ms),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerMetrics {
    /// Closed/HalfOpen → Open transitions.
    pub trips: u64,
    /// HalfOpen → Closed transitions.
    pub resets: u64,
    /// Calls rejected without being attempted.
    pub short_circuited: u64,
    pub trials: u64,
}

struct Inner {
    state: CircuitState,
    /// Timestamps of consecutive failures still inside the window.
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    metrics: BreakerMetrics,
}

pub struct CircuitBreaker {
    dependency: Dependency,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(dependency: Dependency, config: BreakerConfig) -> Self {
        Self {
            dependency,
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: VecDeque::new(),
                opened_at: None,
                trial_in_flight: false,
                metrics: BreakerMetrics::default(),
            }),
        }
    }

    pub fn dependency(&self) -> Dependency {
        self.dependency
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Failures currently counted towards the threshold.
    pub fn failure_count(&self) -> u32 {
        let mut inner = self.inner.lock();
        self.prune(&mut inner, Instant::now());
        inner.failures.len() as u32
    }

    pub fn metrics(&self) -> BreakerMetrics {
        self.inner.lock().metrics.clone()
    }

    /// Admit a call or reject it with `ServiceUnavailable`.
    ///
    /// After the cooldown the first caller becomes the single HalfOpen trial;
    /// everyone else is rejected until the trial settles.
    pub fn try_acquire(&self) -> Result<CallPermit<'_>, DependencyError> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(CallPermit::new(self, false)),
            CircuitState::Open => {
                let cooled = inner
                    .opened_at
                    .is_some_and(|t| t.elapsed() >= self.config.cooldown);
                if cooled {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    inner.metrics.trials += 1;
                    events::circuit_half_open(self.dependency.as_str());
                    Ok(CallPermit::new(self, true))
                } else {
                    inner.metrics.short_circuited += 1;
                    Err(self.unavailable())
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    inner.metrics.short_circuited += 1;
                    Err(self.unavailable())
                } else {
                    inner.trial_in_flight = true;
                    inner.metrics.trials += 1;
                    Ok(CallPermit::new(self, true))
                }
            }
        }
    }

    /// Force back to Closed with no failures counted.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let was = inner.state;
        inner.state = CircuitState::Closed;
        inner.failures.clear();
        inner.opened_at = None;
        inner.trial_in_flight = false;
        if was != CircuitState::Closed {
            events::circuit_closed(self.dependency.as_str());
        }
    }

    fn unavailable(&self) -> DependencyError {
        DependencyError::ServiceUnavailable {
            dependency: self.dependency,
        }
    }

    fn prune(&self, inner: &mut Inner, now: Instant) {
        while let Some(&first) = inner.failures.front() {
            if now.duration_since(first) > self.config.failure_window {
                inner.failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn on_success(&self, trial: bool) {
        let mut inner = self.inner.lock();
        inner.failures.clear();
        if trial && inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Closed;
            inner.trial_in_flight = false;
            inner.opened_at = None;
            inner.metrics.resets += 1;
            events::circuit_closed(self.dependency.as_str());
        }
    }

    fn on_failure(&self, trial: bool) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen if trial => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(now);
                inner.trial_in_flight = false;
                inner.metrics.trips += 1;
                let count = inner.failures.len() as u32 + 1;
                events::circuit_opened(self.dependency.as_str(), count);
            }
            CircuitState::Closed => {
                self.prune(&mut inner, now);
                inner.failures.push_back(now);
                let count = inner.failures.len() as u32;
                if count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                    inner.metrics.trips += 1;
                    events::circuit_opened(self.dependency.as_str(), count);
                }
            }
            // A call admitted before the trip finished late; already open.
            _ => {}
        }
    }

    fn on_neutral(&self, trial: bool) {
        if trial {
            self.inner.lock().trial_in_flight = false;
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("dependency", &self.dependency)
            .field("state", &self.state())
            .finish()
    }
}

/// Admission to call a dependency. Settle it with the outcome; dropping it
/// unsettled counts as a failure.
#[must_use]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> CallPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    /// Whether this is the HalfOpen trial call.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.trial);
    }

    /// The dependency answered but rejected the request; says nothing
    /// about its health.
    pub fn neutral(mut self) {
        self.settled = true;
        self.breaker.on_neutral(self.trial);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_failure(self.trial);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            Dependency::VectorStore,
            BreakerConfig {
                failure_threshold: threshold,
                failure_window: Duration::from_secs(60),
                cooldown: Duration::from_millis(cooldown_ms),
            },
        )
    }

    fn fail(b: &CircuitBreaker) {
        b.try_acquire().unwrap().failure();
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let b = breaker(3, 60_000);
        fail(&b);
        fail(&b);
        assert_eq!(b.state(), CircuitState::Closed);
        fail(&b);
        assert_eq!(b.state(), CircuitState::Open);
        assert!(b.try_acquire().is_err());
        assert_eq!(b.metrics().short_circuited, 1);
    }

    #[test]
    fn success_resets_the_consecutive_count() {
        let b = breaker(3, 60_000);
        fail(&b);
        fail(&b);
        b.try_acquire().unwrap().success();
        assert_eq!(b.failure_count(), 0);
        fail(&b);
        fail(&b);
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[test]
    fn failures_outside_window_do_not_count() {
        let b = CircuitBreaker::new(
            Dependency::Embedding,
            BreakerConfig {
                failure_threshold: 2,
                failure_window: Duration::from_millis(10),
                cooldown: Duration::from_secs(60),
            },
        );
        fail(&b);
        std::thread::sleep(Duration::from_millis(20));
        fail(&b);
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_admits_exactly_one_trial() {
        let b = breaker(1, 5);
        fail(&b);
        std::thread::sleep(Duration::from_millis(10));
        let trial = b.try_acquire().unwrap();
        assert!(trial.is_trial());
        assert_eq!(b.state(), CircuitState::HalfOpen);
        assert!(b.try_acquire().is_err());
        trial.success();
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.failure_count(), 0);
    }

    #[test]
    fn failed_trial_reopens_and_restarts_cooldown() {
        let b = breaker(1, 20);
        fail(&b);
        std::thread::sleep(Duration::from_millis(30));
        b.try_acquire().unwrap().failure();
        assert_eq!(b.state(), CircuitState::Open);
        assert!(b.try_acquire().is_err());
        assert_eq!(b.metrics().trips, 2);
    }

    #[test]
    fn dropped_permit_counts_as_failure() {
        let b = breaker(1, 60_000);
        drop(b.try_acquire().unwrap());
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[test]
    fn neutral_trial_frees_the_slot() {
        let b = breaker(1, 5);
        fail(&b);
        std::thread::sleep(Duration::from_millis(10));
        b.try_acquire().unwrap().neutral();
        assert_eq!(b.state(), CircuitState::HalfOpen);
        assert!(b.try_acquire().unwrap().is_trial());
    }
}
