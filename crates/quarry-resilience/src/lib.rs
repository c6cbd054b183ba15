//! # quarry-resilience
//!
//! Every call to an external dependency goes through [`ResilienceWrapper::call`]:
//! the dependency's [`CircuitBreaker`] admits or short-circuits it, and
//! [`RetryPolicy`] retries transient failures with jittered exponential
//! backoff. One breaker signal is recorded per call, after retries.

pub mod circuit_breaker;
pub mod retry;
pub mod wrapper;

pub use circuit_breaker::{BreakerConfig, BreakerMetrics, CallPermit, CircuitBreaker, CircuitState};
pub use retry::{RetryOutcome, RetryPolicy};
pub use wrapper::{DependencyStats, ResilienceStats, ResilienceWrapper};
