//! Job submission and supersession.
//!
//! A new submission is compared with the job already active for the same
//! key, if any:
//!
//! | existing   | condition                                   | action                                   |
//! |------------|---------------------------------------------|------------------------------------------|
//! | pending    | missing-source-dependency flag changed      | cancel and finish it, queue the new one  |
//! | pending    | otherwise                                   | drop the new one as redundant            |
//! | processing | fingerprint changed                         | cancel it (finishes on its own callback) |
//! | processing | same fingerprint, has dependencies          | cancel it (finishes on its own callback) |
//! | processing | same fingerprint, no dependencies           | drop the new one as redundant            |
//!
//! Only the pending job is considered when both exist. A dropped submission
//! is still answered with a cancel on the job-command channel and a
//! `FileCancelled` event so the originator can account for it.

use tracing::{debug, error};

use super::core::JobController;
use super::events::{ControllerEvent, JobStatus};
use super::job::{JobDetails, JobRecord, JobState};
use super::lifecycle::FinishReason;

/// What happened to a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitDisposition {
    /// A new pending job was created.
    Queued,
    /// An equivalent job is already queued or running; nothing was created.
    Redundant,
}

impl JobController {
    /// Submits a job.
    pub fn submit(&mut self, details: JobDetails) -> SubmitDisposition {
        let disposition = self.submit_inner(details);
        self.pump();
        disposition
    }

    fn submit_inner(&mut self, details: JobDetails) -> SubmitDisposition {
        let key = details.key.clone();

        if let Some(existing) = self.index.find_by_state(&key, JobState::Pending) {
            if existing.has_missing_source_dependency() != details.missing_source_dependency {
                let run_key = existing.run_key();
                debug!(
                    job = %key,
                    run_key = %run_key,
                    "Cancelling pending job, missing source dependency status changed"
                );
                self.cancel_pending(run_key, FinishReason::Superseded);
            } else {
                debug!(job = %key, "Job is already queued and has not started, ignoring");
                self.reject_redundant(&details);
                return SubmitDisposition::Redundant;
            }
        } else if let Some(existing) = self.index.find_by_state(&key, JobState::Processing) {
            let run_key = existing.run_key();
            if existing.fingerprint() != details.fingerprint {
                debug!(
                    job = %key,
                    run_key = %run_key,
                    old_fingerprint = existing.fingerprint(),
                    new_fingerprint = details.fingerprint,
                    "Cancelling in-flight job, fingerprint changed"
                );
                self.cancel_processing(run_key);
            } else if !existing.dependencies().is_empty() {
                debug!(
                    job = %key,
                    run_key = %run_key,
                    "Cancelling in-flight job with dependencies, replacing with re-queued job"
                );
                self.cancel_processing(run_key);
            } else {
                debug!(
                    job = %key,
                    fingerprint = details.fingerprint,
                    "Job is already in progress with the same fingerprint, ignoring"
                );
                self.reject_redundant(&details);
                return SubmitDisposition::Redundant;
            }
        }

        self.enqueue(details)
    }

    fn enqueue(&mut self, details: JobDetails) -> SubmitDisposition {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let record = JobRecord::pending(details, sequence);
        let key = record.key().clone();
        let run_key = record.run_key();
        let critical = record.is_critical();

        if let Err(err) = self.index.insert(record) {
            error!(job = %key, run_key = %run_key, error = %err, "Failed to index job");
            self.events.emit(ControllerEvent::FileCancelled { key });
            return SubmitDisposition::Redundant;
        }
        if let Some(record) = self.index.get(run_key) {
            self.ranker.push(record);
        }

        let platform = key.platform().to_string();
        if critical {
            *self
                .critical_per_platform
                .entry(platform.to_lowercase())
                .or_insert(0) += 1;
        }
        let count = self.jobs_per_platform.entry(platform.clone()).or_insert(0);
        *count += 1;
        let count = *count;

        debug!(job = %key, run_key = %run_key, critical, "Job queued");

        self.events
            .emit(ControllerEvent::JobsInQueuePerPlatform { platform, count });
        self.events.emit(ControllerEvent::JobStatusChanged {
            key,
            status: JobStatus::Queued,
        });
        if !self.dispatch_paused {
            self.events.emit(ControllerEvent::ActiveJobsCountChanged {
                count: self.index.live_count(),
            });
        }

        self.request_dispatch();
        SubmitDisposition::Queued
    }

    fn reject_redundant(&mut self, details: &JobDetails) {
        self.commands.cancel(details.run_key);
        self.events.emit(ControllerEvent::FileCancelled {
            key: details.key.clone(),
        });
    }
}
