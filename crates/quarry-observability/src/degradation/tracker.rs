//! Record every degradation event: component, failure mode, fallback used, timestamp, recovery status.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use quarry_core::models::DegradationEvent;
use serde::{Deserialize, Serialize};

/// Events retained before the oldest recovered ones are dropped.
const DEFAULT_MAX_EVENTS: usize = 1_024;

/// Recovery status of a degradation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryStatus {
    /// Still in degraded mode.
    Active,
    /// Recovered to normal operation.
    Recovered,
}

/// A tracked degradation event with recovery status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedDegradation {
    pub event: DegradationEvent,
    pub recovery_status: RecoveryStatus,
    pub recovered_at: Option<DateTime<Utc>>,
    /// Fallbacks served while this episode was active.
    pub occurrences: u64,
}

/// Tracks degradation episodes for health reporting.
///
/// Repeated failures of a component that is already degraded extend the
/// active episode instead of appending a new one.
#[derive(Debug, Clone)]
pub struct DegradationTracker {
    events: VecDeque<TrackedDegradation>,
    max_events: usize,
}

impl Default for DegradationTracker {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_EVENTS)
    }
}

impl DegradationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(max_events: usize) -> Self {
        Self {
            events: VecDeque::new(),
            max_events: max_events.max(1),
        }
    }

    /// Record a degradation. Returns true if this opened a new episode.
    pub fn record(&mut self, event: DegradationEvent) -> bool {
        if let Some(active) = self.events.iter_mut().rev().find(|t| {
            t.event.component == event.component && t.recovery_status == RecoveryStatus::Active
        }) {
            active.occurrences += 1;
            return false;
        }

        crate::tracing_setup::events::degradation_triggered(
            &event.component,
            &event.failure,
            &event.fallback_used,
        );
        self.events.push_back(TrackedDegradation {
            event,
            recovery_status: RecoveryStatus::Active,
            recovered_at: None,
            occurrences: 1,
        });
        self.enforce_capacity();
        true
    }

    /// Mark a component as recovered. Returns true if an episode was closed.
    pub fn mark_recovered(&mut self, component: &str) -> bool {
        let now = Utc::now();
        for tracked in self.events.iter_mut().rev() {
            if tracked.event.component == component
                && tracked.recovery_status == RecoveryStatus::Active
            {
                tracked.recovery_status = RecoveryStatus::Recovered;
                tracked.recovered_at = Some(now);
                crate::tracing_setup::events::degradation_recovered(component);
                return true;
            }
        }
        false
    }

    pub fn is_degraded(&self, component: &str) -> bool {
        self.events.iter().any(|t| {
            t.event.component == component && t.recovery_status == RecoveryStatus::Active
        })
    }

    pub fn events(&self) -> impl Iterator<Item = &TrackedDegradation> {
        self.events.iter()
    }

    /// Get active (unrecovered) degradations.
    pub fn active_degradations(&self) -> Vec<TrackedDegradation> {
        self.events
            .iter()
            .filter(|t| t.recovery_status == RecoveryStatus::Active)
            .cloned()
            .collect()
    }

    /// Count episodes opened in the last N seconds for a given component.
    pub fn count_recent(&self, component: &str, window_secs: i64) -> usize {
        let cutoff = Utc::now() - chrono::Duration::seconds(window_secs);
        self.events
            .iter()
            .filter(|t| t.event.component == component && t.event.timestamp > cutoff)
            .count()
    }

    /// Duration a component has been continuously degraded, or None if not degraded.
    pub fn degraded_duration(&self, component: &str) -> Option<chrono::Duration> {
        let earliest = self
            .events
            .iter()
            .filter(|t| {
                t.event.component == component && t.recovery_status == RecoveryStatus::Active
            })
            .map(|t| t.event.timestamp)
            .min()?;
        Some(Utc::now() - earliest)
    }

    // Drop the oldest recovered episodes first; active ones go only when
    // nothing else is left.
    fn enforce_capacity(&mut self) {
        while self.events.len() > self.max_events {
            let victim = self
                .events
                .iter()
                .position(|t| t.recovery_status == RecoveryStatus::Recovered)
                .unwrap_or(0);
            self.events.remove(victim);
        }
    }
}
