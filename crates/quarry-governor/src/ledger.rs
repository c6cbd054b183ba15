//! The single record of what is reserved and what is waiting.
//!
//! Plain data; `ResourceGovernor` wraps it in a mutex.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use quarry_core::config::GovernorConfig;
use quarry_core::errors::GovernorError;
use quarry_observability::events;

use crate::request::ResourceRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernorLimits {
    pub max_memory_mb: u64,
    pub max_cpu_percent: u32,
    pub max_concurrent: usize,
}

impl From<&GovernorConfig> for GovernorLimits {
    fn from(config: &GovernorConfig) -> Self {
        Self {
            max_memory_mb: config.max_memory_mb,
            max_cpu_percent: config.max_cpu_percent,
            max_concurrent: config.max_concurrent,
        }
    }
}

/// Point-in-time view of the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub limits: GovernorLimits,
    pub memory_in_use_mb: u64,
    pub cpu_in_use_percent: u32,
    pub active: usize,
    pub queued: usize,
    pub granted_total: u64,
    pub queued_total: u64,
    pub promoted_total: u64,
    pub rejected_total: u64,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Grant {
    pub memory_mb: u64,
    pub cpu_percent: u32,
}

#[derive(Debug)]
struct Waiting {
    request: ResourceRequest,
    seq: u64,
    effective_priority: u8,
    /// Start of the current promotion interval.
    since: Instant,
}

pub(crate) struct Ledger {
    limits: GovernorLimits,
    promotion_after: Duration,
    active: HashMap<String, Grant>,
    queue: Vec<Waiting>,
    /// Granted from the queue, not yet claimed by the waiting caller.
    ready: HashSet<String>,
    /// Dropped from the queue because new limits can never fit them.
    rejected: HashMap<String, GovernorError>,
    memory_in_use: u64,
    cpu_in_use: u32,
    next_seq: u64,
    granted_total: u64,
    queued_total: u64,
    promoted_total: u64,
    rejected_total: u64,
}

impl Ledger {
    pub fn new(limits: GovernorLimits, promotion_after: Duration) -> Self {
        Self {
            limits,
            promotion_after,
            active: HashMap::new(),
            queue: Vec::new(),
            ready: HashSet::new(),
            rejected: HashMap::new(),
            memory_in_use: 0,
            cpu_in_use: 0,
            next_seq: 0,
            granted_total: 0,
            queued_total: 0,
            promoted_total: 0,
            rejected_total: 0,
        }
    }

    /// Fails when the request could never be granted under current limits.
    pub fn check_ceiling(&self, request: &ResourceRequest) -> Result<(), GovernorError> {
        match ceiling_error(&self.limits, request) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn is_known(&self, operation_id: &str) -> bool {
        self.active.contains_key(operation_id)
            || self.queue.iter().any(|w| w.request.operation_id == operation_id)
    }

    /// Enqueue behind everything already waiting, then schedule.
    pub fn enqueue(&mut self, request: ResourceRequest, now: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Waiting {
            effective_priority: request.priority,
            request,
            seq,
            since: now,
        });
        self.schedule(now);
    }

    /// Promote long waiters, then grant from the head while it fits.
    ///
    /// Strict head-of-line: a head that does not fit blocks the rest.
    pub fn schedule(&mut self, now: Instant) {
        for w in &mut self.queue {
            if w.effective_priority > 0 && now.duration_since(w.since) >= self.promotion_after {
                w.effective_priority -= 1;
                w.since = now;
                self.promoted_total += 1;
                events::reservation_promoted(&w.request.operation_id, w.effective_priority);
            }
        }
        self.queue
            .sort_by_key(|w| (w.effective_priority, w.seq));

        while let Some(head) = self.queue.first() {
            if !self.fits(&head.request) {
                break;
            }
            let w = self.queue.remove(0);
            self.grant(&w.request);
            self.ready.insert(w.request.operation_id);
        }
    }

    fn fits(&self, request: &ResourceRequest) -> bool {
        self.memory_in_use + request.memory_mb <= self.limits.max_memory_mb
            && self.cpu_in_use + request.cpu_percent <= self.limits.max_cpu_percent
            && self.active.len() < self.limits.max_concurrent
    }

    fn grant(&mut self, request: &ResourceRequest) {
        self.memory_in_use += request.memory_mb;
        self.cpu_in_use += request.cpu_percent;
        self.active.insert(
            request.operation_id.clone(),
            Grant {
                memory_mb: request.memory_mb,
                cpu_percent: request.cpu_percent,
            },
        );
        self.granted_total += 1;
    }

    /// Claim a grant made from the queue.
    pub fn take_ready(&mut self, operation_id: &str) -> Option<Grant> {
        if self.ready.remove(operation_id) {
            self.active.get(operation_id).copied()
        } else {
            None
        }
    }

    pub fn take_rejected(&mut self, operation_id: &str) -> Option<GovernorError> {
        self.rejected.remove(operation_id)
    }

    pub fn queue_position(&self, operation_id: &str) -> Option<usize> {
        self.queue
            .iter()
            .position(|w| w.request.operation_id == operation_id)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn note_queued(&mut self, request: &ResourceRequest) {
        self.queued_total += 1;
        events::reservation_queued(&request.operation_id, request.priority, self.queue.len());
    }

    /// Free a grant or withdraw a queued request. Returns whether anything
    /// was found.
    pub fn release(&mut self, operation_id: &str, now: Instant) -> bool {
        self.ready.remove(operation_id);
        self.rejected.remove(operation_id);
        let found = if let Some(grant) = self.active.remove(operation_id) {
            self.memory_in_use = self.memory_in_use.saturating_sub(grant.memory_mb);
            self.cpu_in_use = self.cpu_in_use.saturating_sub(grant.cpu_percent);
            true
        } else if let Some(pos) = self.queue_position(operation_id) {
            self.queue.remove(pos);
            true
        } else {
            false
        };
        if found {
            self.schedule(now);
        }
        found
    }

    /// Replace limits. Active grants are kept even when now over the new
    /// limits; queued requests that can never fit are rejected.
    pub fn update_limits(&mut self, limits: GovernorLimits, now: Instant) {
        self.limits = limits;
        let mut kept = Vec::with_capacity(self.queue.len());
        for w in self.queue.drain(..) {
            match ceiling_error(&limits, &w.request) {
                Some(e) => {
                    self.rejected.insert(w.request.operation_id, e);
                    self.rejected_total += 1;
                }
                None => kept.push(w),
            }
        }
        self.queue = kept;
        self.schedule(now);
    }

    pub fn note_rejected(&mut self) {
        self.rejected_total += 1;
    }

    pub fn limits(&self) -> GovernorLimits {
        self.limits
    }

    pub fn promotion_after(&self) -> Duration {
        self.promotion_after
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            limits: self.limits,
            memory_in_use_mb: self.memory_in_use,
            cpu_in_use_percent: self.cpu_in_use,
            active: self.active.len(),
            queued: self.queue.len(),
            granted_total: self.granted_total,
            queued_total: self.queued_total,
            promoted_total: self.promoted_total,
            rejected_total: self.rejected_total,
        }
    }
}

fn ceiling_error(limits: &GovernorLimits, request: &ResourceRequest) -> Option<GovernorError> {
    if request.memory_mb > limits.max_memory_mb {
        return Some(GovernorError::ResourceLimitExceeded {
            resource: "memory_mb",
            requested: request.memory_mb,
            limit: limits.max_memory_mb,
        });
    }
    if request.cpu_percent > limits.max_cpu_percent {
        return Some(GovernorError::ResourceLimitExceeded {
            resource: "cpu_percent",
            requested: request.cpu_percent as u64,
            limit: limits.max_cpu_percent as u64,
        });
    }
    if limits.max_concurrent == 0 {
        return Some(GovernorError::ResourceLimitExceeded {
            resource: "concurrency",
            requested: 1,
            limit: 0,
        });
    }
    None
}
