//! Job controller core - main struct and queries.
//!
//! This module contains the [`JobController`] struct. Operations are
//! implemented in separate modules:
//! - `submission`: submission and supersession
//! - `dispatch`: dispatch requests and dispatch passes
//! - `lifecycle`: completion bookkeeping, cancellation, shutdown
//! - `escalation`: escalation by search and compile groups

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::builder::{Builder, CompletionReceiver, CompletionSender, JobCommands};
use super::config::ControllerConfig;
use super::events::{EventSink, NullEventSink};
use super::groups::CompileGroupTracker;
use super::index::JobIndex;
use super::job::{JobKey, JobState};
use super::ranker::QueueRanker;

// =============================================================================
// Job Controller
// =============================================================================

/// The single dispatch authority.
///
/// Owns the job index, the ranker and the compile groups. All mutation goes
/// through `&mut self`, so callers must serialise access; the
/// [`ControllerService`](super::service::ControllerService) does that with
/// a mailbox.
///
/// Every public operation finishes by running the dispatch passes it
/// requested. Requests made while a pass is running are coalesced into one
/// follow-up pass.
pub struct JobController {
    pub(crate) config: ControllerConfig,

    pub(crate) index: JobIndex,

    pub(crate) ranker: QueueRanker,

    pub(crate) groups: CompileGroupTracker,

    /// Starts jobs.
    pub(crate) builder: Arc<dyn Builder>,

    /// Job-command channel for cancellation.
    pub(crate) commands: Arc<dyn JobCommands>,

    /// Event sink for observers.
    pub(crate) events: Arc<dyn EventSink>,

    /// Handed to the builder with every started job.
    pub(crate) completion_tx: CompletionSender,

    /// Unfinished jobs per platform, keyed as submitted.
    pub(crate) jobs_per_platform: HashMap<String, usize>,

    /// Unfinished critical jobs per platform, keyed lower-case.
    pub(crate) critical_per_platform: HashMap<String, usize>,

    /// A dispatch pass is running.
    pub(crate) dispatching: bool,

    /// A dispatch pass has been requested and not run yet.
    pub(crate) dispatch_queued: bool,

    pub(crate) dispatch_paused: bool,

    pub(crate) shutting_down: bool,

    /// Submission counter for FIFO ordering.
    pub(crate) next_sequence: u64,
}

impl JobController {
    /// Creates a controller and the receiver on which builders report
    /// completions.
    ///
    /// Pass every received [`JobCompletion`](super::builder::JobCompletion)
    /// to [`handle_completion`](Self::handle_completion).
    pub fn new(
        config: ControllerConfig,
        builder: Arc<dyn Builder>,
        commands: Arc<dyn JobCommands>,
    ) -> (Self, CompletionReceiver) {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        let controller = Self {
            index: JobIndex::new(config.completed_history),
            ranker: QueueRanker::new(),
            groups: CompileGroupTracker::new(),
            builder,
            commands,
            events: Arc::new(NullEventSink),
            completion_tx,
            jobs_per_platform: HashMap::new(),
            critical_per_platform: HashMap::new(),
            dispatching: false,
            dispatch_queued: false,
            dispatch_paused: false,
            shutting_down: false,
            next_sequence: 0,
            config,
        };

        (controller, completion_rx)
    }

    /// Replaces the event sink.
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Unfinished jobs (pending or processing) for a platform.
    ///
    /// The argument is lower-cased before lookup while the counter is keyed
    /// by the platform exactly as submitted.
    pub fn pending_count(&self, platform: &str) -> usize {
        self.jobs_per_platform
            .get(&platform.to_lowercase())
            .copied()
            .unwrap_or(0)
    }

    /// Unfinished critical jobs for a platform, compared case-insensitively.
    pub fn pending_critical_count(&self, platform: &str) -> usize {
        self.critical_per_platform
            .get(&platform.to_lowercase())
            .copied()
            .unwrap_or(0)
    }

    /// True when no pending job could be started and nothing is in flight.
    pub fn is_idle(&self) -> bool {
        self.ranker.next_pending(&self.index).is_none() && self.index.in_flight_count() == 0
    }

    /// Jobs occupying a slot, including catalog holds.
    pub fn in_flight_count(&self) -> usize {
        self.index.in_flight_count()
    }

    pub fn is_dispatch_paused(&self) -> bool {
        self.dispatch_paused
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    /// Read-only access to the job index.
    pub fn index(&self) -> &JobIndex {
        &self.index
    }

    /// Snapshot of the controller state.
    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            pending: self.index.pending_count(),
            in_flight: self.index.in_flight_count(),
            live: self.index.live_count(),
            compile_groups: self.groups.len(),
            max_jobs: self.config.slots.max_jobs(),
            regular_limit: self.config.slots.regular_limit(),
            idle: self.is_idle(),
            paused: self.dispatch_paused,
            shutting_down: self.shutting_down,
            recent: self
                .index
                .recent_completed()
                .map(|r| FinishedJob {
                    key: r.key().clone(),
                    state: r.state(),
                    processing_time: r.processing_time(),
                })
                .collect(),
        }
    }
}

impl std::fmt::Debug for JobController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobController")
            .field("slots", &self.config.slots)
            .field("pending", &self.index.pending_count())
            .field("in_flight", &self.index.in_flight_count())
            .field("dispatch_paused", &self.dispatch_paused)
            .field("shutting_down", &self.shutting_down)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Status Snapshot
// =============================================================================

/// Point-in-time view of the controller.
#[derive(Debug, Clone)]
pub struct ControllerStatus {
    pub pending: usize,
    pub in_flight: usize,
    pub live: usize,
    pub compile_groups: usize,
    pub max_jobs: usize,
    pub regular_limit: usize,
    pub idle: bool,
    pub paused: bool,
    pub shutting_down: bool,
    /// Most recently finished jobs, oldest first.
    pub recent: Vec<FinishedJob>,
}

/// Summary of a finished job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedJob {
    pub key: JobKey,
    pub state: JobState,
    pub processing_time: Option<Duration>,
}
