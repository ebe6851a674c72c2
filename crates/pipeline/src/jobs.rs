//! Per-slot job bookkeeping.
//!
//! Each shot slot owns at most one job at a time. A job is `Pending` from
//! [`JobController::start_job`] until the first terminal event arrives;
//! every later terminal event for the same ticket is ignored.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use storyreel_core::types::SlotKey;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;

/// Identifies one started job. Tickets are never reused.
pub type JobTicket = u64;

/// Terminal events of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobTerminal {
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug)]
struct SlotJob {
    ticket: JobTicket,
    job_id: Option<String>,
    /// Fired when the job is cancelled so its waiter can return early.
    cancel: CancellationToken,
}

/// Result of starting a job on a slot.
#[derive(Debug)]
pub struct StartedJob {
    pub ticket: JobTicket,
    /// Fired when a cancel wins the race for this job.
    pub cancelled: CancellationToken,
    /// Backend id of the job this one replaced, if it had one.
    pub superseded: Option<String>,
}

/// Snapshot of a slot's in-flight job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveJob {
    pub ticket: JobTicket,
    pub job_id: String,
}

#[derive(Debug, Default)]
pub struct JobController {
    slots: Mutex<HashMap<SlotKey, SlotJob>>,
    next_ticket: AtomicU64,
}

impl JobController {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<SlotKey, SlotJob>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new job on `slot`, replacing whatever was there.
    ///
    /// The replaced job's waiter is released and its backend id returned
    /// so the caller can ask the backend to stop it.
    pub fn start_job(&self, slot: &SlotKey) -> StartedJob {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed) + 1;
        let cancelled = CancellationToken::new();
        let previous = self.slots().insert(
            slot.clone(),
            SlotJob {
                ticket,
                job_id: None,
                cancel: cancelled.clone(),
            },
        );

        let superseded = previous.and_then(|old| {
            old.cancel.cancel();
            tracing::debug!(%slot, old_ticket = old.ticket, ticket, "Job superseded");
            old.job_id
        });
        StartedJob {
            ticket,
            cancelled,
            superseded,
        }
    }

    /// Record the backend id for a pending job.
    ///
    /// Returns `false` if `ticket` is no longer the slot's current job.
    pub fn register_job_id(&self, slot: &SlotKey, ticket: JobTicket, job_id: &str) -> bool {
        match self.slots().get_mut(slot) {
            Some(job) if job.ticket == ticket => {
                job.job_id = Some(job_id.to_string());
                true
            }
            _ => {
                tracing::debug!(%slot, ticket, job_id, "Ignoring job id from stale ticket");
                false
            }
        }
    }

    /// The slot's pending job, if it has a backend id yet.
    pub fn active_job(&self, slot: &SlotKey) -> Result<ActiveJob, PipelineError> {
        self.slots()
            .get(slot)
            .and_then(|job| {
                job.job_id.as_ref().map(|id| ActiveJob {
                    ticket: job.ticket,
                    job_id: id.clone(),
                })
            })
            .ok_or_else(|| PipelineError::NoActiveJob(slot.clone()))
    }

    /// Whether any job is pending on `slot`.
    pub fn has_pending(&self, slot: &SlotKey) -> bool {
        self.slots().contains_key(slot)
    }

    /// Slots with a pending job, in no particular order.
    pub fn pending_slots(&self) -> Vec<SlotKey> {
        self.slots().keys().cloned().collect()
    }

    pub fn is_pending(&self, slot: &SlotKey, ticket: JobTicket) -> bool {
        self.slots().get(slot).is_some_and(|job| job.ticket == ticket)
    }

    /// Apply a terminal event. Only the first one for a ticket wins.
    ///
    /// A winning `Cancelled` also fires the job's cancellation token.
    pub fn finish(&self, slot: &SlotKey, ticket: JobTicket, terminal: JobTerminal) -> bool {
        let mut slots = self.slots();
        match slots.get(slot) {
            Some(job) if job.ticket == ticket => {
                if let Some(job) = slots.remove(slot) {
                    if terminal == JobTerminal::Cancelled {
                        job.cancel.cancel();
                    }
                }
                tracing::debug!(%slot, ticket, ?terminal, "Job finished");
                true
            }
            _ => {
                tracing::debug!(%slot, ticket, ?terminal, "Ignoring late terminal event");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use storyreel_core::types::{GenerationKind, ShotNumber};

    use super::*;

    fn slot(shot: u32) -> SlotKey {
        SlotKey::new(1, &ShotNumber::from(shot), GenerationKind::Video)
    }

    // -- registration --

    #[test]
    fn cancel_without_job_id_is_no_active_job() {
        let jobs = JobController::new();
        assert_matches!(jobs.active_job(&slot(1)), Err(PipelineError::NoActiveJob(_)));

        jobs.start_job(&slot(1));
        assert_matches!(jobs.active_job(&slot(1)), Err(PipelineError::NoActiveJob(_)));
    }

    #[test]
    fn registered_id_is_active() {
        let jobs = JobController::new();
        let started = jobs.start_job(&slot(1));
        assert!(jobs.register_job_id(&slot(1), started.ticket, "job-1"));
        let active = jobs.active_job(&slot(1)).unwrap();
        assert_eq!(active.job_id, "job-1");
        assert_eq!(active.ticket, started.ticket);
    }

    #[test]
    fn pending_slots_drop_out_when_finished() {
        let jobs = JobController::new();
        let first = jobs.start_job(&slot(1));
        jobs.start_job(&slot(2));

        let mut pending = jobs.pending_slots();
        pending.sort_by_key(|s| s.to_string());
        assert_eq!(pending, vec![slot(1), slot(2)]);

        jobs.finish(&slot(1), first.ticket, JobTerminal::Completed);
        assert_eq!(jobs.pending_slots(), vec![slot(2)]);
    }

    #[test]
    fn restarting_a_slot_returns_old_id_and_releases_old_waiter() {
        let jobs = JobController::new();
        let first = jobs.start_job(&slot(1));
        jobs.register_job_id(&slot(1), first.ticket, "job-1");

        let second = jobs.start_job(&slot(1));
        assert_eq!(second.superseded.as_deref(), Some("job-1"));
        assert!(first.cancelled.is_cancelled());
        assert!(second.ticket > first.ticket);
        assert!(!jobs.register_job_id(&slot(1), first.ticket, "job-late"));
        assert_matches!(jobs.active_job(&slot(1)), Err(PipelineError::NoActiveJob(_)));
    }

    #[test]
    fn slots_are_independent() {
        let jobs = JobController::new();
        let a = jobs.start_job(&slot(1));
        let b = jobs.start_job(&slot(2));
        jobs.register_job_id(&slot(1), a.ticket, "a");
        jobs.register_job_id(&slot(2), b.ticket, "b");
        assert!(jobs.finish(&slot(1), a.ticket, JobTerminal::Completed));
        assert_eq!(jobs.active_job(&slot(2)).unwrap().job_id, "b");
    }

    // -- terminal events --

    #[test]
    fn first_terminal_event_wins() {
        let jobs = JobController::new();
        let started = jobs.start_job(&slot(1));
        assert!(jobs.finish(&slot(1), started.ticket, JobTerminal::Cancelled));
        assert!(started.cancelled.is_cancelled());
        assert!(!jobs.finish(&slot(1), started.ticket, JobTerminal::Completed));
        assert!(!jobs.is_pending(&slot(1), started.ticket));
    }

    #[test]
    fn completion_does_not_fire_cancel_token() {
        let jobs = JobController::new();
        let started = jobs.start_job(&slot(1));
        assert!(jobs.finish(&slot(1), started.ticket, JobTerminal::Completed));
        assert!(!started.cancelled.is_cancelled());
        assert!(!jobs.finish(&slot(1), started.ticket, JobTerminal::Cancelled));
    }

    #[test]
    fn stale_ticket_cannot_finish_new_job() {
        let jobs = JobController::new();
        let old = jobs.start_job(&slot(1));
        let new = jobs.start_job(&slot(1));
        assert!(!jobs.finish(&slot(1), old.ticket, JobTerminal::Failed));
        assert!(jobs.is_pending(&slot(1), new.ticket));
    }
}
