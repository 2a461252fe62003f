//! Asset processing job controller.
//!
//! Decides which asset build jobs run, when, and in what order, under a
//! bounded concurrency budget. The controller never builds anything itself:
//! it hands jobs to a [`Builder`] and does the bookkeeping when they report
//! back.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ControllerService                        │
//! │  Mailbox for handles, completion channel from the builder   │
//! ├─────────────────────────────────────────────────────────────┤
//! │                      JobController                           │
//! │  Submission, dispatch passes, completion, cancel, shutdown  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │ JobIndex    │  │ QueueRanker │  │ CompileGroupTracker │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Core Concepts
//!
//! - **Job key**: `(source, platform, job key)`. At most one pending and one
//!   processing job exist per key; resubmissions supersede or are dropped.
//!
//! - **Budget**: critical and escalated jobs may use every slot, regular jobs
//!   only half of them unless configured otherwise.
//!
//! - **Ranking**: critical first, then escalation, then submission order.
//!   Searches raise escalation of matching jobs.
//!
//! - **Compile groups**: a request waiting for a set of jobs, answered once
//!   all of them compiled or as soon as one failed.
//!
//! # Example
//!
//! ```ignore
//! use assetproc::controller::{
//!     ControllerConfig, ControllerService, JobDetails, JobKey, JobOutcome, TokioBuilder,
//! };
//!
//! let builder = Arc::new(TokioBuilder::new(|ticket, cancel| async move {
//!     // ... run the build, watching `cancel` ...
//!     JobOutcome::Completed(Default::default())
//! }));
//! let (service, handle) = ControllerService::new(
//!     ControllerConfig::default(),
//!     builder.clone(),
//!     builder,
//! );
//! tokio::spawn(service.run(shutdown_token));
//!
//! handle.submit(JobDetails::new(JobKey::new("hero.fbx", "pc", "mesh"), 42)).await?;
//! ```

mod builder;
mod config;
mod core;
mod dispatch;
mod error;
mod escalation;
mod events;
mod groups;
mod index;
mod job;
mod lifecycle;
mod ranker;
mod search;
mod service;
mod slots;
mod submission;

#[cfg(test)]
pub(crate) mod test_support;

// Job model
pub use job::{
    JobDetails, JobKey, JobOutcome, JobRecord, JobResponse, JobRunKey, JobState,
    DEFAULT_ESCALATION, STATUS_REQUEST_ESCALATION, SYNC_REQUEST_ESCALATION,
};

// Index, ranking and search
pub use index::{JobIndex, DEFAULT_COMPLETED_HISTORY};
pub use ranker::QueueRanker;
pub use search::{normalize_search_term, SearchMode, SearchResults};

// Budget
pub use slots::{auto_max_jobs, JobSlots, FALLBACK_CPU_COUNT, MIN_MAX_JOBS};

// Compile groups and escalation
pub use escalation::CompileTarget;
pub use groups::CompileGroupTracker;

// Events
pub use events::{
    AssetStatus, ChannelEventSink, ControllerEvent, EventSink, JobStatus, MultiplexEventSink,
    NullEventSink, RequestId, TracingEventSink,
};

// Builder boundary
pub use builder::{
    BuildFuture, BuildOperation, Builder, CompletionReceiver, CompletionSender, JobCommands,
    JobCompletion, JobTicket, TokioBuilder,
};

// Controller
pub use config::{
    ControllerConfig, DEFAULT_COMMAND_CHANNEL_CAPACITY, DEFAULT_SHUTDOWN_MAX_POLLS,
    DEFAULT_SHUTDOWN_POLL_INTERVAL,
};
pub use self::core::{ControllerStatus, FinishedJob, JobController};
pub use error::{ControllerError, IndexError};
pub use service::{ControllerHandle, ControllerService};
pub use submission::SubmitDisposition;
