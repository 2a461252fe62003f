//! Job lifecycle management.
//!
//! Completion bookkeeping, cancellation, removal by source, catalog
//! acknowledgement and shutdown. Every job that was accepted is finished
//! through [`JobController::finish_job`] exactly once, which is what gives
//! observers exactly one terminal notification per submission.

use tracing::{debug, info, warn};

use super::builder::JobCompletion;
use super::core::JobController;
use super::events::{ControllerEvent, JobStatus};
use super::job::{JobKey, JobOutcome, JobRecord, JobRunKey, JobState};

/// Why a job is being finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FinishReason {
    /// Regular completion, failure or cancellation.
    Normal,
    /// A pending job replaced by a newer submission of the same key. The
    /// replacement carries on for compile groups, and idle is not announced
    /// in between.
    Superseded,
}

impl JobController {
    // =========================================================================
    // Completion
    // =========================================================================

    /// Processes a completion reported by the builder.
    ///
    /// Completions for run keys that are not in flight are ignored.
    pub fn handle_completion(&mut self, completion: JobCompletion) {
        let JobCompletion { run_key, outcome } = completion;

        if !self.index.is_in_flight(run_key) {
            warn!(run_key = %run_key, "Ignoring completion for a job that is not in flight");
            return;
        }

        if let Some(record) = self.index.take(run_key) {
            debug!(
                job = %record.key(),
                run_key = %run_key,
                outcome = %outcome.state(),
                "Job finished"
            );
            self.finish_job(record, outcome, FinishReason::Normal);
        }

        self.pump();
    }

    /// Final bookkeeping for a job already taken out of the index.
    pub(crate) fn finish_job(
        &mut self,
        record: JobRecord,
        outcome: JobOutcome,
        reason: FinishReason,
    ) {
        self.ranker.remove(record.run_key());

        let key = record.key().clone();
        let platform = key.platform().to_string();

        if let Some(count) = self.jobs_per_platform.get_mut(&platform) {
            if *count > 0 {
                *count -= 1;
                let count = *count;
                self.events.emit(ControllerEvent::JobsInQueuePerPlatform {
                    platform: platform.clone(),
                    count,
                });
            }
        }

        if record.is_critical() {
            if let Some(count) = self.critical_per_platform.get_mut(&platform.to_lowercase()) {
                *count = count.saturating_sub(1);
            }
        }

        let state = outcome.state();
        match outcome {
            JobOutcome::Cancelled => {
                self.events
                    .emit(ControllerEvent::FileCancelled { key: key.clone() });
            }
            JobOutcome::Failed(message) => {
                warn!(job = %key, reason = %message, "Job failed");
                self.events
                    .emit(ControllerEvent::FileFailed { key: key.clone() });
                self.events.emit(ControllerEvent::JobStatusChanged {
                    key: key.clone(),
                    status: JobStatus::Failed,
                });
            }
            JobOutcome::Completed(response) => {
                self.events.emit(ControllerEvent::FileCompiled {
                    key: key.clone(),
                    response,
                });
                self.events.emit(ControllerEvent::JobStatusChanged {
                    key: key.clone(),
                    status: JobStatus::Completed,
                });
            }
        }

        let hold = self.config.hold_slots_until_cataloged && state == JobState::Completed;
        self.index.mark_completed(record, state, hold);

        // A cancelled run whose key lives on in a newer job does not decide
        // any compile group.
        let notify_groups = reason == FinishReason::Normal
            && !(state == JobState::Cancelled && self.index.is_active(&key));
        if notify_groups {
            for (request_id, status) in self
                .groups
                .on_job_complete(&key, state == JobState::Completed)
            {
                self.events
                    .emit(ControllerEvent::CompileGroupFinished { request_id, status });
            }
        }

        if !self.dispatch_paused {
            self.events.emit(ControllerEvent::ActiveJobsCountChanged {
                count: self.index.live_count(),
            });
        }

        if !self.shutting_down {
            self.request_dispatch();
            if reason == FinishReason::Normal {
                self.announce_if_idle();
            }
        }
    }

    pub(crate) fn announce_if_idle(&self) {
        if self.is_idle() {
            debug!("No pending or in-flight jobs remain");
            self.events.emit(ControllerEvent::BecameIdle);
        }
    }

    // =========================================================================
    // Cancellation
    // =========================================================================

    /// Cancels one job.
    ///
    /// A pending job is finished immediately. A processing job is asked to
    /// stop and finishes when its builder reports back. Returns false if the
    /// run key is not pending or processing.
    pub fn cancel_job(&mut self, run_key: JobRunKey) -> bool {
        let cancelled = match self.index.get(run_key).map(|r| r.state()) {
            Some(JobState::Pending) => {
                self.cancel_pending(run_key, FinishReason::Normal);
                true
            }
            Some(JobState::Processing) => {
                self.cancel_processing(run_key);
                true
            }
            _ => false,
        };

        self.pump();
        cancelled
    }

    /// Cancels a pending job and finishes it synchronously.
    pub(crate) fn cancel_pending(&mut self, run_key: JobRunKey, reason: FinishReason) {
        self.index.mark_cancelled(run_key);
        if let Some(record) = self.index.take(run_key) {
            self.finish_job(record, JobOutcome::Cancelled, reason);
        }
        self.commands.cancel(run_key);
    }

    /// Marks a processing job cancelled and asks the builder to stop it.
    ///
    /// The job keeps its slot and is finished by its own completion.
    pub(crate) fn cancel_processing(&mut self, run_key: JobRunKey) {
        self.index.mark_cancelled(run_key);
        self.commands.cancel(run_key);
    }

    /// Removes every pending job of a source asset, on all platforms.
    ///
    /// Removed jobs are finished as cancelled. Jobs already processing are
    /// left to finish on their own. Returns the number of removed jobs.
    pub fn remove_jobs_by_source(&mut self, source: &str) -> usize {
        let removed = self.index.erase_by_source(source);
        let count = removed.len();

        for record in removed {
            self.finish_job(record, JobOutcome::Cancelled, FinishReason::Normal);
        }

        if count > 0 {
            debug!(source, removed = count, "Removed pending jobs for source");
        }

        self.pump();
        count
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// Acknowledges that the products of a completed job reached the catalog,
    /// releasing its slot when slots are held until cataloged.
    pub fn on_added_to_catalog(&mut self, key: &JobKey) {
        let released = self.index.mark_cataloged(key);
        if released {
            debug!(job = %key, "Released catalog hold");
        }

        self.request_dispatch();
        self.pump();

        if released && !self.shutting_down {
            self.announce_if_idle();
        }
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Starts or continues shutting down.
    ///
    /// The first call cancels every pending job. Every call broadcasts cancel
    /// to running jobs. Returns true (and emits
    /// [`ControllerEvent::ReadyToQuit`]) once nothing is in flight; call again
    /// after further completions until it does.
    pub fn quit_requested(&mut self) -> bool {
        if !self.shutting_down {
            info!(
                pending = self.index.pending_count(),
                in_flight = self.index.in_flight_count(),
                "Job controller shutting down"
            );
            self.shutting_down = true;
            self.dispatch_queued = false;

            for run_key in self.index.pending_run_keys() {
                self.cancel_pending(run_key, FinishReason::Normal);
            }

            let released = self.index.clear_catalog_holds();
            if released > 0 {
                debug!(released, "Released catalog holds for shutdown");
            }
        }

        self.commands.cancel_all();

        let in_flight = self.index.in_flight_count();
        if in_flight == 0 {
            info!("All jobs drained, ready to quit");
            self.events.emit(ControllerEvent::ReadyToQuit);
            true
        } else {
            debug!(in_flight, "Waiting for in-flight jobs to drain");
            false
        }
    }
}
