//! Job dispatching.
//!
//! Dispatch requests only set a flag. The passes themselves run when the
//! current operation is done (see [`JobController::pump`]), so any number of
//! triggers inside one operation collapse into a single follow-up pass and a
//! pass never runs inside another.

use tracing::{debug, error, info, trace};

use super::builder::JobTicket;
use super::core::JobController;
use super::events::{ControllerEvent, JobStatus};
use super::job::{JobOutcome, JobRunKey};
use super::lifecycle::FinishReason;

/// Reported for jobs known to fail before they run.
pub(crate) const AUTO_FAIL_REASON: &str = "auto-fail job";

impl JobController {
    /// Pauses or resumes dispatching.
    ///
    /// While paused no job is started and dispatch requests are dropped.
    /// Resuming requests a pass.
    pub fn set_dispatch_paused(&mut self, paused: bool) {
        if self.dispatch_paused == paused {
            return;
        }

        self.dispatch_paused = paused;
        info!(paused, "Dispatch paused state changed");

        if !paused && !self.shutting_down {
            self.request_dispatch();
            self.events.emit(ControllerEvent::ActiveJobsCountChanged {
                count: self.index.live_count(),
            });
        }

        self.pump();
    }

    /// Asks for a dispatch pass. Repeated requests before the pass runs
    /// collapse into one.
    pub(crate) fn request_dispatch(&mut self) {
        if self.shutting_down || self.dispatch_paused || self.dispatch_queued {
            return;
        }
        trace!("Dispatch pass requested");
        self.dispatch_queued = true;
    }

    /// Runs requested dispatch passes until none is left.
    pub(crate) fn pump(&mut self) {
        if self.dispatching {
            return;
        }
        while self.dispatch_queued {
            self.run_dispatch_pass();
        }
    }

    /// Starts ranked pending jobs until the budget is used up.
    ///
    /// The pass stops at the first job that does not fit: critical and
    /// escalated jobs rank ahead of regular ones, so nothing behind it could
    /// start either. Auto-fail jobs never take a slot and are resolved on the
    /// spot.
    pub(crate) fn run_dispatch_pass(&mut self) {
        self.dispatch_queued = false;
        if self.dispatching {
            self.dispatch_queued = true;
            return;
        }
        if self.dispatch_paused || self.shutting_down {
            return;
        }

        self.dispatching = true;
        let mut started = 0usize;

        while let Some(run_key) = self.ranker.next_pending(&self.index) {
            let Some(record) = self.index.get(run_key) else {
                self.ranker.remove(run_key);
                continue;
            };

            if record.is_auto_fail() {
                self.auto_fail_job(run_key);
                continue;
            }

            let limit = self
                .config
                .slots
                .limit_for(record.is_critical_or_escalated());
            let in_flight = self.index.in_flight_count();
            if in_flight >= limit || self.dispatch_paused {
                trace!(in_flight, limit, "No free job slot");
                break;
            }

            self.start_job(run_key);
            started += 1;
        }

        self.dispatching = false;

        if started > 0 {
            debug!(
                started,
                in_flight = self.index.in_flight_count(),
                pending = self.index.pending_count(),
                "Dispatch pass finished"
            );
        }
    }

    /// Hands a pending job to the builder.
    fn start_job(&mut self, run_key: JobRunKey) {
        self.ranker.remove(run_key);

        if let Err(err) = self.index.mark_processing(run_key) {
            error!(run_key = %run_key, error = %err, "Cannot start job");
            if let Some(record) = self.index.take(run_key) {
                let outcome = JobOutcome::Failed(err.to_string());
                self.finish_job(record, outcome, FinishReason::Normal);
            }
            return;
        }

        let Some(record) = self.index.get(run_key) else {
            return;
        };
        let key = record.key().clone();
        let ticket = JobTicket {
            key: key.clone(),
            run_key,
            fingerprint: record.fingerprint(),
            source_uuid: record.source_uuid(),
        };

        debug!(
            job = %key,
            run_key = %run_key,
            critical = record.is_critical(),
            escalation = record.escalation(),
            waited_ms = record.queue_time().as_millis() as u64,
            "Starting job"
        );

        self.events.emit(ControllerEvent::JobStatusChanged {
            key: key.clone(),
            status: JobStatus::InProgress,
        });
        self.builder.start(ticket, self.completion_tx.clone());
        self.events.emit(ControllerEvent::JobStarted {
            source: key.source().to_string(),
            platform: key.platform().to_string(),
        });
    }

    /// Resolves an auto-fail job as failed without using a slot.
    fn auto_fail_job(&mut self, run_key: JobRunKey) {
        if let Some(record) = self.index.take(run_key) {
            debug!(job = %record.key(), run_key = %run_key, "Auto-failing job");
            self.finish_job(
                record,
                JobOutcome::Failed(AUTO_FAIL_REASON.to_string()),
                FinishReason::Normal,
            );
        } else {
            self.ranker.remove(run_key);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::controller::events::{ControllerEvent, JobStatus};
    use crate::controller::job::{JobDetails, JobKey, JobState};
    use crate::controller::test_support::harness;

    fn key(source: &str) -> JobKey {
        JobKey::new(source, "pc", "texture")
    }

    #[test]
    fn test_regular_jobs_use_half_the_budget() {
        let mut h = harness(4, false);
        for source in ["a", "b", "c"] {
            h.controller.submit(JobDetails::new(key(source), 1));
        }
        assert_eq!(h.builder.started().len(), 2);
        assert_eq!(h.controller.index().pending_count(), 1);
    }

    #[test]
    fn test_always_use_max() {
        let mut h = harness(4, true);
        for source in ["a", "b", "c", "d", "e"] {
            h.controller.submit(JobDetails::new(key(source), 1));
        }
        assert_eq!(h.builder.started().len(), 4);
    }

    #[test]
    fn test_critical_jobs_use_full_budget() {
        let mut h = harness(4, false);
        for source in ["a", "b"] {
            h.controller.submit(JobDetails::new(key(source), 1));
        }
        for source in ["c", "d", "e"] {
            h.controller
                .submit(JobDetails::new(key(source), 1).critical(true));
        }

        assert_eq!(h.builder.started().len(), 4);
        assert_eq!(h.controller.in_flight_count(), 4);
    }

    #[test]
    fn test_escalated_job_uses_reserved_slot() {
        let mut h = harness(4, false);
        for source in ["a", "b", "c"] {
            h.controller.submit(JobDetails::new(key(source), 1));
        }
        assert_eq!(h.builder.started().len(), 2);

        assert_eq!(h.controller.escalate_by_search_term("pc", "c"), 1);
        assert_eq!(h.builder.started().len(), 3);
        assert_eq!(h.builder.started()[2].key, key("c"));
    }

    #[test]
    fn test_waits_for_free_slot() {
        // Two regular jobs in flight with a regular limit of 2.
        let mut h = harness(4, false);
        h.controller.submit(JobDetails::new(key("x"), 1));
        h.controller.submit(JobDetails::new(key("y"), 1));

        let a = JobDetails::new(JobKey::new("foo.fbx", "pc", "texture"), 5);
        h.controller.submit(a);
        assert!(h
            .controller
            .index()
            .exists(&JobKey::new("foo.fbx", "pc", "texture"), JobState::Pending));

        let first = h.builder.started_run_keys()[0];
        h.complete(first);
        assert!(h
            .controller
            .index()
            .exists(&JobKey::new("foo.fbx", "pc", "texture"), JobState::Processing));
    }

    #[test]
    fn test_auto_fail_bypasses_slots() {
        let mut h = harness(2, false);
        h.controller.submit(JobDetails::new(key("a"), 1));
        assert_eq!(h.controller.in_flight_count(), 1);
        h.events();

        h.controller
            .submit(JobDetails::new(key("auto"), 1).auto_fail(true));

        let events = h.events();
        assert!(events.contains(&ControllerEvent::FileFailed { key: key("auto") }));
        assert!(!events.contains(&ControllerEvent::JobStatusChanged {
            key: key("auto"),
            status: JobStatus::InProgress
        }));
        assert_eq!(h.controller.in_flight_count(), 1);
        assert_eq!(h.builder.started().len(), 1);
        assert!(h.controller.index().exists(&key("auto"), JobState::Failed));
    }

    #[test]
    fn test_start_emits_in_progress_and_started() {
        let mut h = harness(2, false);
        h.controller.submit(JobDetails::new(key("a"), 1));

        let events = h.events();
        let in_progress = events.iter().position(|e| {
            *e == ControllerEvent::JobStatusChanged {
                key: key("a"),
                status: JobStatus::InProgress,
            }
        });
        let started = events.iter().position(|e| {
            *e == ControllerEvent::JobStarted {
                source: "a".to_string(),
                platform: "pc".to_string(),
            }
        });
        assert!(in_progress.is_some());
        assert!(started > in_progress);
    }

    #[test]
    fn test_pause_blocks_dispatch() {
        let mut h = harness(4, false);
        h.controller.set_dispatch_paused(true);
        h.controller.submit(JobDetails::new(key("a"), 1));
        assert!(h.builder.started().is_empty());
        assert!(!h.controller.is_idle());

        h.events();
        h.controller.set_dispatch_paused(false);
        assert_eq!(h.builder.started().len(), 1);
        assert!(h
            .events()
            .iter()
            .any(|e| matches!(e, ControllerEvent::ActiveJobsCountChanged { .. })));
    }

    #[test]
    fn test_no_active_count_events_while_paused() {
        let mut h = harness(4, false);
        h.controller.set_dispatch_paused(true);
        h.events();

        h.controller.submit(JobDetails::new(key("a"), 1));
        assert!(!h
            .events()
            .iter()
            .any(|e| matches!(e, ControllerEvent::ActiveJobsCountChanged { .. })));
    }

    #[test]
    fn test_requests_coalesce() {
        let mut h = harness(4, false);
        h.controller.set_dispatch_paused(true);
        h.controller.set_dispatch_paused(false);

        h.controller.request_dispatch();
        h.controller.request_dispatch();
        assert!(h.controller.dispatch_queued);

        h.controller.pump();
        assert!(!h.controller.dispatch_queued);
    }

    #[test]
    fn test_reentrant_pass_is_requeued() {
        let mut h = harness(4, false);
        h.controller.dispatching = true;
        h.controller.run_dispatch_pass();
        assert!(h.controller.dispatch_queued);

        // pump refuses to spin while a pass is marked running.
        h.controller.pump();
        assert!(h.controller.dispatch_queued);

        h.controller.dispatching = false;
        h.controller.pump();
        assert!(!h.controller.dispatch_queued);
    }

    #[test]
    fn test_idle_fires_only_when_drained() {
        let mut h = harness(2, false);
        h.controller.submit(JobDetails::new(key("a"), 1));
        h.controller.submit(JobDetails::new(key("b"), 1));
        h.events();

        let first = h.builder.started_run_keys()[0];
        h.complete(first);
        assert!(!h.events().contains(&ControllerEvent::BecameIdle));

        let second = h.builder.started_run_keys()[1];
        h.complete(second);
        assert!(h.events().contains(&ControllerEvent::BecameIdle));
        assert!(h.controller.is_idle());
    }
}
