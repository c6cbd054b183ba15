//! # quarry-observability
//!
//! Tracing subscriber setup, one structured event per notable state change,
//! span macros, and the degradation tracker used by the orchestrator.

pub mod degradation;
pub mod tracing_setup;

pub use degradation::{DegradationTracker, RecoveryStatus, TrackedDegradation};
pub use tracing_setup::{events, init_tracing, init_tracing_with_filter};
