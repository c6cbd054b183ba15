//! ResilienceWrapper: breaker admission plus retry around a dependency call.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::warn;

use quarry_core::config::ResilienceConfig;
use quarry_core::errors::{ErrorKind, QuarryResult};
use quarry_core::models::Dependency;

use crate::circuit_breaker::{BreakerConfig, CircuitBreaker, CircuitState};
use crate::retry::RetryPolicy;

/// Counters for one dependency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyStats {
    pub calls: u64,
    pub succeeded: u64,
    /// Calls rejected by an open circuit.
    pub short_circuited: u64,
    /// Calls that failed after retries were exhausted.
    pub exhausted: u64,
    /// Calls that failed with a non-retryable error.
    pub rejected: u64,
    pub retries: u64,
    /// Calls that hit at least one transient failure.
    pub transient_calls: u64,
    /// Of those, calls that still succeeded.
    pub transient_recovered: u64,
}

impl DependencyStats {
    /// Share of calls with transient failures that succeeded anyway.
    pub fn recovery_rate(&self) -> f64 {
        if self.transient_calls == 0 {
            1.0
        } else {
            self.transient_recovered as f64 / self.transient_calls as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResilienceStats {
    pub dependencies: BTreeMap<Dependency, DependencyStats>,
}

impl ResilienceStats {
    pub fn recovery_rate(&self) -> f64 {
        let (calls, recovered) = self
            .dependencies
            .values()
            .fold((0, 0), |(c, r), s| (c + s.transient_calls, r + s.transient_recovered));
        if calls == 0 {
            1.0
        } else {
            recovered as f64 / calls as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    calls: AtomicU64,
    succeeded: AtomicU64,
    short_circuited: AtomicU64,
    exhausted: AtomicU64,
    rejected: AtomicU64,
    retries: AtomicU64,
    transient_calls: AtomicU64,
    transient_recovered: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DependencyStats {
        DependencyStats {
            calls: self.calls.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            short_circuited: self.short_circuited.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            transient_calls: self.transient_calls.load(Ordering::Relaxed),
            transient_recovered: self.transient_recovered.load(Ordering::Relaxed),
        }
    }
}

struct Guarded {
    breaker: CircuitBreaker,
    counters: Counters,
}

/// One breaker and one set of counters per [`Dependency`], sharing a
/// retry policy. Shared by reference across threads.
pub struct ResilienceWrapper {
    retry: RetryPolicy,
    guarded: [Guarded; 4],
}

impl ResilienceWrapper {
    pub fn new(config: &ResilienceConfig) -> Self {
        Self::with_policies(RetryPolicy::from(config), BreakerConfig::from(config))
    }

    pub fn with_policies(retry: RetryPolicy, breaker: BreakerConfig) -> Self {
        let guarded = Dependency::ALL.map(|dep| Guarded {
            breaker: CircuitBreaker::new(dep, breaker),
            counters: Counters::default(),
        });
        Self { retry, guarded }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Call `op` under `dependency`'s breaker, retrying transient failures.
    ///
    /// Returns `ServiceUnavailable` without calling `op` when the circuit is
    /// open and `RetriesExhausted` when transient failures outlast the retry
    /// limit. Other errors pass through unchanged.
    pub fn call<T, F>(&self, dependency: Dependency, mut op: F) -> QuarryResult<T>
    where
        F: FnMut() -> QuarryResult<T>,
    {
        let guarded = self.guarded(dependency);
        let counters = &guarded.counters;
        counters.calls.fetch_add(1, Ordering::Relaxed);

        let permit = match guarded.breaker.try_acquire() {
            Ok(permit) => permit,
            Err(e) => {
                counters.short_circuited.fetch_add(1, Ordering::Relaxed);
                return Err(e.into());
            }
        };

        let outcome = self.retry.execute(dependency, |_| op());
        counters
            .retries
            .fetch_add(outcome.attempts.saturating_sub(1) as u64, Ordering::Relaxed);
        if outcome.transient_failures > 0 {
            counters.transient_calls.fetch_add(1, Ordering::Relaxed);
        }

        match &outcome.result {
            Ok(_) => {
                counters.succeeded.fetch_add(1, Ordering::Relaxed);
                if outcome.transient_failures > 0 {
                    counters.transient_recovered.fetch_add(1, Ordering::Relaxed);
                }
                permit.success();
            }
            Err(e) if e.kind() == ErrorKind::Unavailable => {
                counters.exhausted.fetch_add(1, Ordering::Relaxed);
                warn!(
                    dependency = dependency.as_str(),
                    attempts = outcome.attempts,
                    error = %e,
                    "dependency call failed after retries"
                );
                permit.failure();
            }
            Err(_) => {
                counters.rejected.fetch_add(1, Ordering::Relaxed);
                permit.neutral();
            }
        }
        outcome.result
    }

    pub fn breaker(&self, dependency: Dependency) -> &CircuitBreaker {
        &self.guarded(dependency).breaker
    }

    pub fn circuit_state(&self, dependency: Dependency) -> CircuitState {
        self.breaker(dependency).state()
    }

    pub fn circuit_states(&self) -> BTreeMap<Dependency, CircuitState> {
        self.guarded
            .iter()
            .map(|g| (g.breaker.dependency(), g.breaker.state()))
            .collect()
    }

    pub fn stats(&self) -> ResilienceStats {
        ResilienceStats {
            dependencies: self
                .guarded
                .iter()
                .map(|g| (g.breaker.dependency(), g.counters.snapshot()))
                .collect(),
        }
    }

    fn guarded(&self, dependency: Dependency) -> &Guarded {
        let slot = match dependency {
            Dependency::Embedding => 0,
            Dependency::VectorStore => 1,
            Dependency::LexicalIndex => 2,
            Dependency::Generation => 3,
        };
        &self.guarded[slot]
    }
}
