//! Integration tests for the resource governor.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use proptest::prelude::*;

use quarry_core::config::GovernorConfig;
use quarry_core::errors::{ErrorKind, GovernorError, QuarryError};
use quarry_governor::{Admission, GovernorLimits, ResourceGovernor, ResourceRequest};

fn governor(memory_mb: u64, cpu: u32, slots: usize) -> ResourceGovernor {
    ResourceGovernor::new(&GovernorConfig {
        max_memory_mb: memory_mb,
        max_cpu_percent: cpu,
        max_concurrent: slots,
        promotion_after_ms: 60_000,
        admission_timeout_ms: 2_000,
    })
}

// ── Admission ─────────────────────────────────────────────────────────────

#[test]
fn request_over_configured_maximum_fails_immediately() {
    let gov = ResourceGovernor::new(&GovernorConfig {
        max_memory_mb: 8 * 1024,
        ..GovernorConfig::default()
    });
    let err = gov
        .acquire(ResourceRequest::new("huge", 10 * 1024, 1, 0))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    assert!(matches!(
        err,
        QuarryError::Governor(GovernorError::ResourceLimitExceeded { resource: "memory_mb", .. })
    ));
    let snap = gov.snapshot();
    assert_eq!(snap.queued, 0);
    assert_eq!(snap.rejected_total, 1);
}

#[test]
fn fitting_request_is_granted_and_released_on_drop() {
    let gov = governor(100, 100, 4);
    {
        let admission = gov.request(ResourceRequest::new("op", 40, 20, 1)).unwrap();
        assert!(admission.is_granted());
        let snap = gov.snapshot();
        assert_eq!(snap.memory_in_use_mb, 40);
        assert_eq!(snap.cpu_in_use_percent, 20);
        assert_eq!(snap.active, 1);
    }
    let snap = gov.snapshot();
    assert_eq!(snap.memory_in_use_mb, 0);
    assert_eq!(snap.active, 0);
}

#[test]
fn duplicate_operation_id_is_rejected() {
    let gov = governor(100, 100, 4);
    let _held = gov.acquire(ResourceRequest::new("op", 1, 1, 1)).unwrap();
    let err = gov.request(ResourceRequest::new("op", 1, 1, 1)).err().unwrap();
    assert!(matches!(
        err,
        QuarryError::Governor(GovernorError::DuplicateOperation { .. })
    ));
}

#[test]
fn queued_request_is_granted_after_release() {
    let gov = governor(100, 100, 1);
    let first = gov.acquire(ResourceRequest::new("first", 10, 10, 1)).unwrap();
    let Admission::Queued(mut ticket) = gov.request(ResourceRequest::new("second", 10, 10, 1)).unwrap()
    else {
        panic!("second request should queue behind the only slot");
    };
    assert_eq!(ticket.position(), 0);
    assert!(ticket.try_claim().is_none());

    first.release();
    let second = ticket.try_claim().expect("granted after release");
    assert_eq!(second.operation_id(), "second");
    assert_eq!(gov.snapshot().active, 1);
}

#[test]
fn dropping_a_ticket_withdraws_the_request() {
    let gov = governor(100, 100, 1);
    let _held = gov.acquire(ResourceRequest::new("held", 1, 1, 1)).unwrap();
    let admission = gov.request(ResourceRequest::new("waiting", 1, 1, 1)).unwrap();
    assert_eq!(gov.snapshot().queued, 1);
    drop(admission);
    assert_eq!(gov.snapshot().queued, 0);
}

#[test]
fn blocking_acquire_times_out_and_leaves_no_trace() {
    let gov = governor(100, 100, 1);
    let _held = gov.acquire(ResourceRequest::new("held", 1, 1, 1)).unwrap();
    let err = gov
        .acquire_timeout(ResourceRequest::new("late", 1, 1, 1), Duration::from_millis(30))
        .unwrap_err();
    assert!(matches!(
        err,
        QuarryError::Governor(GovernorError::AdmissionTimeout { .. })
    ));
    assert_eq!(gov.snapshot().queued, 0);
}

#[test]
fn higher_priority_waiter_is_served_first() {
    let gov = governor(100, 100, 1);
    let holder = gov.acquire(ResourceRequest::new("holder", 1, 1, 0)).unwrap();
    let Admission::Queued(mut low) = gov.request(ResourceRequest::new("low", 1, 1, 5)).unwrap() else {
        panic!("expected queue");
    };
    let Admission::Queued(mut high) = gov.request(ResourceRequest::new("high", 1, 1, 1)).unwrap() else {
        panic!("expected queue");
    };
    drop(holder);
    assert!(low.try_claim().is_none());
    let granted = high.try_claim().expect("high priority granted first");
    drop(granted);
    assert!(low.try_claim().is_some());
}

#[test]
fn starving_waiter_is_promoted() {
    let gov = ResourceGovernor::new(&GovernorConfig {
        max_memory_mb: 100,
        max_cpu_percent: 100,
        max_concurrent: 1,
        promotion_after_ms: 30,
        admission_timeout_ms: 1_000,
    });
    let holder = gov.acquire(ResourceRequest::new("holder", 1, 1, 0)).unwrap();
    let Admission::Queued(mut old) = gov.request(ResourceRequest::new("old", 1, 1, 4)).unwrap() else {
        panic!("expected queue");
    };
    thread::sleep(Duration::from_millis(60));
    let Admission::Queued(mut newer) = gov.request(ResourceRequest::new("newer", 1, 1, 3)).unwrap()
    else {
        panic!("expected queue");
    };
    drop(holder);
    assert!(newer.try_claim().is_none());
    assert!(old.try_claim().is_some());
    assert!(gov.snapshot().promoted_total >= 1);
}

#[test]
fn reservation_is_released_when_the_operation_panics() {
    let gov = governor(100, 100, 2);
    let result = catch_unwind(AssertUnwindSafe(|| {
        let _r = gov.acquire(ResourceRequest::new("doomed", 50, 50, 1)).unwrap();
        panic!("operation failed mid-flight");
    }));
    assert!(result.is_err());
    let snap = gov.snapshot();
    assert_eq!(snap.memory_in_use_mb, 0);
    assert_eq!(snap.active, 0);
}

#[test]
fn lowering_limits_fails_waiters_that_can_never_fit() {
    let gov = governor(100, 100, 1);
    let _held = gov.acquire(ResourceRequest::new("held", 10, 10, 1)).unwrap();
    let waiter = {
        let gov = gov.clone();
        thread::spawn(move || gov.acquire_timeout(ResourceRequest::new("big", 80, 10, 1), Duration::from_secs(5)))
    };
    while gov.snapshot().queued == 0 {
        thread::sleep(Duration::from_millis(1));
    }
    gov.update_limits(GovernorLimits {
        max_memory_mb: 50,
        max_cpu_percent: 100,
        max_concurrent: 1,
    });
    let err = waiter.join().unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
}

// ── Conservation under concurrency ────────────────────────────────────────

#[test]
fn concurrent_holders_never_exceed_limits() {
    let gov = governor(100, 100, 3);
    let peak_memory = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(16));
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let gov = gov.clone();
            let peak = Arc::clone(&peak_memory);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let _r = gov
                    .acquire(ResourceRequest::new(format!("op-{i}"), 30, 10, (i % 3) as u8))
                    .unwrap();
                let snap = gov.snapshot();
                assert!(snap.memory_in_use_mb <= 100);
                assert!(snap.active <= 3);
                peak.fetch_max(snap.memory_in_use_mb, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(2));
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    let snap = gov.snapshot();
    assert_eq!(snap.memory_in_use_mb, 0);
    assert_eq!(snap.active, 0);
    assert_eq!(snap.granted_total, 16);
    assert!(peak_memory.load(Ordering::SeqCst) <= 90);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn ledger_is_conserved_across_grant_and_release(
        ops in prop::collection::vec((1u64..60, 1u32..60, 0u8..4, any::<bool>()), 1..40),
    ) {
        let gov = governor(100, 100, 4);
        let mut held = Vec::new();
        let mut tickets = Vec::new();
        for (i, (mem, cpu, prio, release_one)) in ops.into_iter().enumerate() {
            match gov.request(ResourceRequest::new(format!("op-{i}"), mem, cpu, prio)).unwrap() {
                Admission::Granted(r) => held.push(r),
                Admission::Queued(t) => tickets.push(t),
            }
            if release_one && !held.is_empty() {
                held.remove(0);
            }
            tickets.retain_mut(|t| match t.try_claim() {
                Some(r) => {
                    held.push(r);
                    false
                }
                None => true,
            });
            let snap = gov.snapshot();
            let mem_sum: u64 = held.iter().map(|r| r.memory_mb()).sum();
            let cpu_sum: u32 = held.iter().map(|r| r.cpu_percent()).sum();
            prop_assert_eq!(snap.memory_in_use_mb, mem_sum);
            prop_assert_eq!(snap.cpu_in_use_percent, cpu_sum);
            prop_assert!(snap.memory_in_use_mb <= 100);
            prop_assert!(snap.cpu_in_use_percent <= 100);
            prop_assert!(snap.active <= 4);
        }
        drop(tickets);
        drop(held);
        let snap = gov.snapshot();
        prop_assert_eq!(snap.memory_in_use_mb, 0);
        prop_assert_eq!(snap.active, 0);
        prop_assert_eq!(snap.queued, 0);
    }
}
