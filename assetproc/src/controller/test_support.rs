//! Shared fixtures for controller unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::builder::{Builder, CompletionReceiver, CompletionSender, JobCommands, JobCompletion, JobTicket};
use super::config::ControllerConfig;
use super::core::JobController;
use super::events::{ControllerEvent, EventSink, RecordingEventSink};
use super::job::{JobOutcome, JobResponse, JobRunKey};
use super::slots::JobSlots;

/// Builder that only records what it was asked to do.
#[derive(Debug, Default)]
pub(crate) struct RecordingBuilder {
    started: Mutex<Vec<JobTicket>>,
    cancelled: Mutex<Vec<JobRunKey>>,
    cancel_all_calls: AtomicUsize,
}

impl RecordingBuilder {
    pub(crate) fn started(&self) -> Vec<JobTicket> {
        self.started.lock().unwrap().clone()
    }

    pub(crate) fn started_run_keys(&self) -> Vec<JobRunKey> {
        self.started().into_iter().map(|t| t.run_key).collect()
    }

    pub(crate) fn cancelled(&self) -> Vec<JobRunKey> {
        self.cancelled.lock().unwrap().clone()
    }

    pub(crate) fn cancel_all_calls(&self) -> usize {
        self.cancel_all_calls.load(Ordering::SeqCst)
    }
}

impl Builder for RecordingBuilder {
    fn start(&self, ticket: JobTicket, _completion: CompletionSender) {
        self.started.lock().unwrap().push(ticket);
    }
}

impl JobCommands for RecordingBuilder {
    fn cancel(&self, run_key: JobRunKey) {
        self.cancelled.lock().unwrap().push(run_key);
    }

    fn cancel_all(&self) {
        self.cancel_all_calls.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) struct Harness {
    pub(crate) controller: JobController,
    pub(crate) builder: Arc<RecordingBuilder>,
    pub(crate) events: Arc<RecordingEventSink>,
    #[allow(dead_code)]
    pub(crate) completions: CompletionReceiver,
}

impl Harness {
    /// Reports a successful build.
    pub(crate) fn complete(&mut self, run_key: JobRunKey) {
        self.finish(run_key, JobOutcome::Completed(JobResponse::default()));
    }

    pub(crate) fn fail(&mut self, run_key: JobRunKey) {
        self.finish(run_key, JobOutcome::Failed("build failed".to_string()));
    }

    pub(crate) fn finish(&mut self, run_key: JobRunKey, outcome: JobOutcome) {
        self.controller
            .handle_completion(JobCompletion { run_key, outcome });
    }

    pub(crate) fn events(&self) -> Vec<ControllerEvent> {
        self.events.drain()
    }
}

/// Controller with a fixed budget, a recording builder and recorded events.
pub(crate) fn harness(max_jobs: usize, always_use_max: bool) -> Harness {
    harness_with(ControllerConfig::with_slots(JobSlots::new(
        max_jobs,
        always_use_max,
    )))
}

pub(crate) fn harness_with(config: ControllerConfig) -> Harness {
    let builder = Arc::new(RecordingBuilder::default());
    let events = Arc::new(RecordingEventSink::default());
    let (controller, completions) = JobController::new(
        config,
        Arc::clone(&builder) as Arc<dyn Builder>,
        Arc::clone(&builder) as Arc<dyn JobCommands>,
    );
    let controller = controller.with_event_sink(Arc::clone(&events) as Arc<dyn EventSink>);

    Harness {
        controller,
        builder,
        events,
        completions,
    }
}
