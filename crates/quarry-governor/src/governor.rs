//! ResourceGovernor: thread-safe front of the ledger.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use quarry_core::config::GovernorConfig;
use quarry_core::errors::{GovernorError, QuarryResult};

use crate::ledger::{GovernorLimits, Ledger, LedgerSnapshot};
use crate::request::ResourceRequest;

struct Shared {
    ledger: Mutex<Ledger>,
    changed: Condvar,
}

impl Shared {
    fn release(&self, operation_id: &str) -> bool {
        let found = self.ledger.lock().release(operation_id, Instant::now());
        if found {
            self.changed.notify_all();
        }
        found
    }
}

/// Result of a non-blocking `request`.
pub enum Admission {
    Granted(Reservation),
    /// Waiting in the queue at the given position.
    Queued(Ticket),
}

impl Admission {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }
}

/// Cloning shares the same ledger.
#[derive(Clone)]
pub struct ResourceGovernor {
    shared: Arc<Shared>,
    default_timeout: Duration,
}

impl ResourceGovernor {
    pub fn new(config: &GovernorConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                ledger: Mutex::new(Ledger::new(
                    GovernorLimits::from(config),
                    Duration::from_millis(config.promotion_after_ms),
                )),
                changed: Condvar::new(),
            }),
            default_timeout: Duration::from_millis(config.admission_timeout_ms),
        }
    }

    /// Grant now if the request fits and nothing is ahead of it, otherwise
    /// queue it. Requests above the configured maximum fail immediately.
    pub fn request(&self, request: ResourceRequest) -> QuarryResult<Admission> {
        let mut ledger = self.shared.ledger.lock();
        if let Err(e) = ledger.check_ceiling(&request) {
            ledger.note_rejected();
            return Err(e.into());
        }
        if ledger.is_known(&request.operation_id) {
            return Err(GovernorError::DuplicateOperation {
                operation_id: request.operation_id,
            }
            .into());
        }

        let operation_id = request.operation_id.clone();
        ledger.enqueue(request.clone(), Instant::now());
        if let Some(grant) = ledger.take_ready(&operation_id) {
            drop(ledger);
            // Reordering may have granted others too.
            self.shared.changed.notify_all();
            return Ok(Admission::Granted(Reservation {
                shared: Arc::clone(&self.shared),
                operation_id,
                memory_mb: grant.memory_mb,
                cpu_percent: grant.cpu_percent,
                released: false,
            }));
        }

        ledger.note_queued(&request);
        let position = ledger.queue_position(&operation_id).unwrap_or(0);
        debug!(operation_id = %operation_id, position, "reservation queued");
        Ok(Admission::Queued(Ticket {
            shared: Arc::clone(&self.shared),
            operation_id,
            position,
            claimed: false,
        }))
    }

    /// Block until granted or `timeout` passes.
    pub fn acquire_timeout(
        &self,
        request: ResourceRequest,
        timeout: Duration,
    ) -> QuarryResult<Reservation> {
        match self.request(request)? {
            Admission::Granted(reservation) => Ok(reservation),
            Admission::Queued(ticket) => ticket.wait(timeout),
        }
    }

    /// Block with the configured admission timeout.
    pub fn acquire(&self, request: ResourceRequest) -> QuarryResult<Reservation> {
        self.acquire_timeout(request, self.default_timeout)
    }

    /// Free a reservation or withdraw a queued request by id.
    ///
    /// `Reservation` does this on drop; call directly only for ids whose
    /// handle was leaked on purpose.
    pub fn release(&self, operation_id: &str) -> bool {
        self.shared.release(operation_id)
    }

    pub fn update_limits(&self, limits: GovernorLimits) {
        self.shared
            .ledger
            .lock()
            .update_limits(limits, Instant::now());
        self.shared.changed.notify_all();
        debug!(
            max_memory_mb = limits.max_memory_mb,
            max_cpu_percent = limits.max_cpu_percent,
            max_concurrent = limits.max_concurrent,
            "governor limits updated"
        );
    }

    /// Change only the concurrency slot count.
    pub fn set_max_concurrent(&self, max_concurrent: usize) {
        let limits = GovernorLimits {
            max_concurrent,
            ..self.limits()
        };
        self.update_limits(limits);
    }

    pub fn limits(&self) -> GovernorLimits {
        self.shared.ledger.lock().limits()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.shared.ledger.lock().snapshot()
    }
}

/// A queued request. Dropping it withdraws the request.
pub struct Ticket {
    shared: Arc<Shared>,
    operation_id: String,
    position: usize,
    claimed: bool,
}

impl Ticket {
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    /// Queue position when the ticket was issued.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Claim the grant if it has been made.
    pub fn try_claim(&mut self) -> Option<Reservation> {
        let grant = self.shared.ledger.lock().take_ready(&self.operation_id)?;
        self.claimed = true;
        Some(Reservation {
            shared: Arc::clone(&self.shared),
            operation_id: self.operation_id.clone(),
            memory_mb: grant.memory_mb,
            cpu_percent: grant.cpu_percent,
            released: false,
        })
    }

    /// Wait for the grant. Promotion is re-evaluated while waiting.
    pub fn wait(mut self, timeout: Duration) -> QuarryResult<Reservation> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut ledger = self.shared.ledger.lock();
        loop {
            let now = Instant::now();
            ledger.schedule(now);
            if let Some(grant) = ledger.take_ready(&self.operation_id) {
                self.claimed = true;
                drop(ledger);
                self.shared.changed.notify_all();
                return Ok(Reservation {
                    shared: Arc::clone(&self.shared),
                    operation_id: self.operation_id.clone(),
                    memory_mb: grant.memory_mb,
                    cpu_percent: grant.cpu_percent,
                    released: false,
                });
            }
            if let Some(e) = ledger.take_rejected(&self.operation_id) {
                self.claimed = true;
                return Err(e.into());
            }
            if now >= deadline {
                drop(ledger);
                // Drop withdraws the request.
                return Err(GovernorError::AdmissionTimeout {
                    operation_id: self.operation_id.clone(),
                    waited_ms: started.elapsed().as_millis() as u64,
                }
                .into());
            }
            let step = ledger
                .promotion_after()
                .max(Duration::from_millis(1))
                .min(deadline - now);
            self.shared.changed.wait_for(&mut ledger, step);
        }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if !self.claimed {
            self.shared.release(&self.operation_id);
        }
    }
}

/// A granted claim. Released when dropped, on every exit path.
pub struct Reservation {
    shared: Arc<Shared>,
    operation_id: String,
    memory_mb: u64,
    cpu_percent: u32,
    released: bool,
}

impl Reservation {
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn memory_mb(&self) -> u64 {
        self.memory_mb
    }

    pub fn cpu_percent(&self) -> u32 {
        self.cpu_percent
    }

    /// Release now instead of at end of scope.
    pub fn release(mut self) {
        self.released = true;
        self.shared.release(&self.operation_id);
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.released {
            self.shared.release(&self.operation_id);
        }
    }
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("operation_id", &self.operation_id)
            .field("memory_mb", &self.memory_mb)
            .field("cpu_percent", &self.cpu_percent)
            .finish()
    }
}
