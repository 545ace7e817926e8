//! Retry eligibility tracking.
//!
//! A [`RetryTicket`] follows one retry-eligible fault through a small state
//! machine:
//!
//! ```text
//! Pending(0) -> Scheduled(n) --fire--> n+1 eligible?  yes -> Scheduled(n+1)
//!                                                     no  -> abandoned (removed)
//! ```
//!
//! On every fire the attempt counter is incremented and
//! [`should_retry`](crate::error::should_retry) is re-run against the original
//! fault. The coordinator only decides whether and when to re-check; it never
//! re-invokes the failing operation.

pub mod backoff;
pub mod scheduler;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{should_retry, ErrorId, Fault};

pub use backoff::Backoff;
pub use scheduler::{ManualScheduler, RetryCallback, RetryScheduler, TokioScheduler};

/// Where a ticket is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPhase {
    /// Created, no re-check armed yet.
    Pending,
    /// A re-check is armed.
    Scheduled,
}

/// Retry bookkeeping for one fault occurrence.
#[derive(Debug, Clone)]
pub struct RetryTicket {
    pub error_id: ErrorId,
    pub original: Arc<Fault>,
    /// Number of re-checks performed so far.
    pub attempt: u32,
    pub first_seen_at: DateTime<Utc>,
    pub phase: RetryPhase,
    /// Wait before the armed re-check, once scheduled.
    pub next_delay: Option<Duration>,
}

/// What happened when a re-check fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Still eligible; another re-check is armed after `delay`.
    Rescheduled { attempt: u32, delay: Duration },
    /// No longer eligible; the ticket was discarded.
    Abandoned { attempt: u32 },
    /// No ticket with that id exists.
    Missing,
}

/// Returned by [`RetryCoordinator::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created,
    /// A live ticket for the same id already exists and was left untouched.
    AlreadyActive,
}

struct Inner {
    tickets: Mutex<HashMap<ErrorId, RetryTicket>>,
    scheduler: Arc<dyn RetryScheduler>,
    max_attempts: u32,
    backoff: Backoff,
}

/// Owns every live [`RetryTicket`] of one handler.
///
/// Cloning is cheap; clones share the same tickets. Scheduled callbacks hold
/// only a weak reference, so dropping the last clone silently cancels
/// outstanding re-checks.
#[derive(Clone)]
pub struct RetryCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RetryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryCoordinator")
            .field("max_attempts", &self.inner.max_attempts)
            .field("backoff", &self.inner.backoff)
            .field("active", &self.len())
            .finish()
    }
}

impl RetryCoordinator {
    pub fn new(max_attempts: u32, backoff: Backoff, scheduler: Arc<dyn RetryScheduler>) -> Self {
        Self {
            inner: Arc::new(Inner {
                tickets: Mutex::new(HashMap::new()),
                scheduler,
                max_attempts,
                backoff,
            }),
        }
    }

    fn tickets(&self) -> std::sync::MutexGuard<'_, HashMap<ErrorId, RetryTicket>> {
        self.inner
            .tickets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Creates a ticket at attempt 0 and arms the first re-check after the
    /// base delay. The caller is responsible for checking eligibility first.
    pub fn register(&self, error_id: ErrorId, original: Fault, now: DateTime<Utc>) -> Registration {
        {
            let mut tickets = self.tickets();
            if tickets.contains_key(&error_id) {
                tracing::debug!(error_id = %error_id, "Retry ticket already active");
                return Registration::AlreadyActive;
            }
            tickets.insert(
                error_id.clone(),
                RetryTicket {
                    error_id: error_id.clone(),
                    original: Arc::new(original),
                    attempt: 0,
                    first_seen_at: now,
                    phase: RetryPhase::Pending,
                    next_delay: None,
                },
            );
        }

        self.arm(error_id, self.inner.backoff.delay_for(0));
        Registration::Created
    }

    fn arm(&self, error_id: ErrorId, delay: Duration) {
        if let Some(ticket) = self.tickets().get_mut(&error_id) {
            ticket.phase = RetryPhase::Scheduled;
            ticket.next_delay = Some(delay);
        }

        tracing::debug!(
            error_id = %error_id,
            delay_ms = delay.as_millis() as u64,
            "Retry re-check scheduled"
        );

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner.scheduler.schedule(
            delay,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    RetryCoordinator { inner }.fire(&error_id);
                }
            }),
        );
    }

    /// Advances the ticket for `error_id` by one re-check.
    pub(crate) fn fire(&self, error_id: &ErrorId) -> RetryOutcome {
        let attempt = {
            let mut tickets = self.tickets();
            let Some(ticket) = tickets.get_mut(error_id) else {
                return RetryOutcome::Missing;
            };
            ticket.attempt += 1;
            let attempt = ticket.attempt;

            if !should_retry(&ticket.original, attempt, self.inner.max_attempts) {
                tickets.remove(error_id);
                tracing::debug!(error_id = %error_id, attempt, "Retry ticket abandoned");
                return RetryOutcome::Abandoned { attempt };
            }
            attempt
        };

        let delay = self.inner.backoff.delay_for(attempt);
        self.arm(error_id.clone(), delay);
        RetryOutcome::Rescheduled { attempt, delay }
    }

    /// Snapshot of live tickets, oldest first.
    pub fn active(&self) -> Vec<RetryTicket> {
        let mut tickets: Vec<_> = self.tickets().values().cloned().collect();
        tickets.sort_by(|a, b| {
            a.first_seen_at
                .cmp(&b.first_seen_at)
                .then_with(|| a.error_id.cmp(&b.error_id))
        });
        tickets
    }

    pub fn get(&self, error_id: &ErrorId) -> Option<RetryTicket> {
        self.tickets().get(error_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.tickets().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets().is_empty()
    }

    pub fn max_attempts(&self) -> u32 {
        self.inner.max_attempts
    }

    pub fn backoff(&self) -> Backoff {
        self.inner.backoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use serde_json::json;

    fn coordinator(max_attempts: u32) -> (RetryCoordinator, Arc<ManualScheduler>) {
        let scheduler = Arc::new(ManualScheduler::new());
        let coordinator = RetryCoordinator::new(
            max_attempts,
            Backoff::new(Duration::from_millis(1000)),
            scheduler.clone(),
        );
        (coordinator, scheduler)
    }

    fn network_fault() -> (ErrorId, Fault) {
        let error = AppError::network("down");
        (error.id().clone(), Fault::from(error))
    }

    #[test]
    fn test_register_creates_ticket_at_attempt_zero() {
        let (coordinator, scheduler) = coordinator(3);
        let (id, fault) = network_fault();

        assert_eq!(coordinator.register(id.clone(), fault, Utc::now()), Registration::Created);

        let ticket = coordinator.get(&id).unwrap();
        assert_eq!(ticket.attempt, 0);
        assert_eq!(ticket.phase, RetryPhase::Scheduled);
        assert_eq!(ticket.next_delay, Some(Duration::from_millis(1000)));
        assert_eq!(scheduler.pending_delays(), vec![Duration::from_millis(1000)]);
    }

    #[test]
    fn test_ticket_removed_after_max_attempts() {
        let (coordinator, scheduler) = coordinator(3);
        let (id, fault) = network_fault();
        coordinator.register(id.clone(), fault, Utc::now());

        let delays = scheduler.run_until_idle();

        assert_eq!(
            delays,
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(1000),
                Duration::from_millis(2000),
            ]
        );
        assert!(coordinator.get(&id).is_none());
        assert!(coordinator.is_empty());
    }

    #[test]
    fn test_fire_outcomes() {
        let (coordinator, _scheduler) = coordinator(2);
        let (id, fault) = network_fault();
        coordinator.register(id.clone(), fault, Utc::now());

        assert_eq!(
            coordinator.fire(&id),
            RetryOutcome::Rescheduled {
                attempt: 1,
                delay: Duration::from_millis(1000)
            }
        );
        assert_eq!(coordinator.fire(&id), RetryOutcome::Abandoned { attempt: 2 });
        assert_eq!(coordinator.fire(&id), RetryOutcome::Missing);
    }

    #[test]
    fn test_existing_ticket_is_kept() {
        let (coordinator, scheduler) = coordinator(3);
        let (id, fault) = network_fault();
        coordinator.register(id.clone(), fault.clone(), Utc::now());
        coordinator.fire(&id);

        assert_eq!(
            coordinator.register(id.clone(), fault, Utc::now()),
            Registration::AlreadyActive
        );
        assert_eq!(coordinator.get(&id).unwrap().attempt, 1);
        assert_eq!(coordinator.len(), 1);
        assert_eq!(scheduler.pending(), 2);
    }

    #[test]
    fn test_status_fault_follows_same_machine() {
        let (coordinator, scheduler) = coordinator(1);
        let fault = Fault::from(json!({"status": 502}));
        let id = ErrorId::from_string("err_1_abc");
        coordinator.register(id.clone(), fault, Utc::now());

        scheduler.run_until_idle();
        assert!(coordinator.get(&id).is_none());
    }

    #[test]
    fn test_dropped_coordinator_cancels_callbacks() {
        let (coordinator, scheduler) = coordinator(3);
        let (id, fault) = network_fault();
        coordinator.register(id, fault, Utc::now());
        drop(coordinator);

        assert_eq!(scheduler.run_until_idle().len(), 1);
    }
}
