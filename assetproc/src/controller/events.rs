//! Controller events for observers.
//!
//! The controller never presents anything itself. Every state change is
//! pushed as a [`ControllerEvent`] into an [`EventSink`]; UIs, network
//! responders and logs decide what to do with them. Emitting must never
//! block the dispatch authority.
//!
//! # Example
//!
//! ```
//! use assetproc::controller::{ControllerEvent, EventSink};
//!
//! struct PrintingSink;
//!
//! impl EventSink for PrintingSink {
//!     fn emit(&self, event: ControllerEvent) {
//!         println!("{}", event.event_type());
//!     }
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::job::{JobKey, JobResponse};

// =============================================================================
// Status Types
// =============================================================================

/// Job status as reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "Queued"),
            JobStatus::InProgress => write!(f, "InProgress"),
            JobStatus::Completed => write!(f, "Completed"),
            JobStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Status of a compile group as reported to the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetStatus {
    /// Nothing matched the request.
    Unknown,
    /// Matches found; the group is being tracked.
    Queued,
    /// Every member completed successfully.
    Compiled,
    /// A member failed or was cancelled.
    Failed,
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetStatus::Unknown => write!(f, "Unknown"),
            AssetStatus::Queued => write!(f, "Queued"),
            AssetStatus::Compiled => write!(f, "Compiled"),
            AssetStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Opaque token identifying a compile group request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request-{}", self.0)
    }
}

// =============================================================================
// Controller Events
// =============================================================================

/// Events emitted by the job controller.
#[derive(Clone, Debug, PartialEq)]
pub enum ControllerEvent {
    // -------------------------------------------------------------------------
    // Job Events
    // -------------------------------------------------------------------------
    /// A job changed status.
    JobStatusChanged { key: JobKey, status: JobStatus },

    /// A job was handed to the builder.
    JobStarted { source: String, platform: String },

    /// A job completed successfully.
    FileCompiled { key: JobKey, response: JobResponse },

    /// A job failed, including auto-fail jobs.
    FileFailed { key: JobKey },

    /// A job was cancelled or a submission was dropped as redundant.
    FileCancelled { key: JobKey },

    // -------------------------------------------------------------------------
    // Queue Events
    // -------------------------------------------------------------------------
    /// Number of unfinished jobs for a platform changed.
    JobsInQueuePerPlatform { platform: String, count: usize },

    /// Number of live jobs changed. Not emitted while dispatch is paused.
    ActiveJobsCountChanged { count: usize },

    /// Nothing is pending and nothing is in flight.
    BecameIdle,

    // -------------------------------------------------------------------------
    // Compile Group Events
    // -------------------------------------------------------------------------
    /// Response to a compile group request.
    CompileGroupCreated {
        request_id: RequestId,
        status: AssetStatus,
    },

    /// A tracked compile group finished.
    CompileGroupFinished {
        request_id: RequestId,
        status: AssetStatus,
    },

    // -------------------------------------------------------------------------
    // Shutdown
    // -------------------------------------------------------------------------
    /// Every in-flight job has drained after a quit request.
    ReadyToQuit,
}

impl ControllerEvent {
    /// Returns the job key associated with this event, if any.
    pub fn job_key(&self) -> Option<&JobKey> {
        match self {
            Self::JobStatusChanged { key, .. }
            | Self::FileCompiled { key, .. }
            | Self::FileFailed { key }
            | Self::FileCancelled { key } => Some(key),
            Self::JobStarted { .. }
            | Self::JobsInQueuePerPlatform { .. }
            | Self::ActiveJobsCountChanged { .. }
            | Self::BecameIdle
            | Self::CompileGroupCreated { .. }
            | Self::CompileGroupFinished { .. }
            | Self::ReadyToQuit => None,
        }
    }

    /// Returns true for the terminal notification of a job.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::FileCompiled { .. } | Self::FileFailed { .. } | Self::FileCancelled { .. }
        )
    }

    /// Returns a short name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::JobStatusChanged { .. } => "job_status_changed",
            Self::JobStarted { .. } => "job_started",
            Self::FileCompiled { .. } => "file_compiled",
            Self::FileFailed { .. } => "file_failed",
            Self::FileCancelled { .. } => "file_cancelled",
            Self::JobsInQueuePerPlatform { .. } => "jobs_in_queue_per_platform",
            Self::ActiveJobsCountChanged { .. } => "active_jobs_count_changed",
            Self::BecameIdle => "became_idle",
            Self::CompileGroupCreated { .. } => "compile_group_created",
            Self::CompileGroupFinished { .. } => "compile_group_finished",
            Self::ReadyToQuit => "ready_to_quit",
        }
    }
}

// =============================================================================
// Event Sink Trait
// =============================================================================

/// Sink for controller events.
///
/// Implementations must be fast and non-blocking. They are called from the
/// dispatch authority while it holds the job index.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ControllerEvent);
}

// =============================================================================
// Built-in Sink Implementations
// =============================================================================

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: ControllerEvent) {}
}

/// Sink that logs events using the `tracing` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: ControllerEvent) {
        match &event {
            ControllerEvent::JobStatusChanged { key, status } => {
                tracing::debug!(job = %key, status = %status, "Job status changed");
            }
            ControllerEvent::JobStarted { source, platform } => {
                tracing::debug!(source = %source, platform = %platform, "Job started");
            }
            ControllerEvent::FileCompiled { key, response } => {
                tracing::info!(
                    job = %key,
                    products = response.products.len(),
                    "File compiled"
                );
            }
            ControllerEvent::FileFailed { key } => {
                tracing::warn!(job = %key, "File failed");
            }
            ControllerEvent::FileCancelled { key } => {
                tracing::debug!(job = %key, "File cancelled");
            }
            ControllerEvent::JobsInQueuePerPlatform { platform, count } => {
                tracing::trace!(platform = %platform, count, "Jobs in queue");
            }
            ControllerEvent::ActiveJobsCountChanged { count } => {
                tracing::trace!(count, "Active jobs count changed");
            }
            ControllerEvent::BecameIdle => {
                tracing::info!("Job controller idle");
            }
            ControllerEvent::CompileGroupCreated { request_id, status } => {
                tracing::debug!(request = %request_id, status = %status, "Compile group created");
            }
            ControllerEvent::CompileGroupFinished { request_id, status } => {
                tracing::debug!(request = %request_id, status = %status, "Compile group finished");
            }
            ControllerEvent::ReadyToQuit => {
                tracing::info!("Job controller ready to quit");
            }
        }
    }
}

/// Sink that forwards events into an unbounded channel.
///
/// Sending never blocks; events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<ControllerEvent>,
}

impl ChannelEventSink {
    /// Creates a sink and the receiver its events arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ControllerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: ControllerEvent) {
        let _ = self.tx.send(event);
    }
}

/// Sink that forwards events to multiple sinks.
pub struct MultiplexEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl MultiplexEventSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    pub fn add_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }
}

impl EventSink for MultiplexEventSink {
    fn emit(&self, event: ControllerEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

impl fmt::Debug for MultiplexEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiplexEventSink")
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

/// Sink that records every event, for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingEventSink {
    events: std::sync::Mutex<Vec<ControllerEvent>>,
}

#[cfg(test)]
impl RecordingEventSink {
    /// Returns and clears the recorded events.
    pub(crate) fn drain(&self) -> Vec<ControllerEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

#[cfg(test)]
impl EventSink for RecordingEventSink {
    fn emit(&self, event: ControllerEvent) {
        self.events.lock().unwrap().push(event);
    }
}
