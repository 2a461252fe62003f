//! Boundary to the external builder.
//!
//! The controller never compiles anything. It hands a [`JobTicket`] to a
//! [`Builder`], which must eventually send exactly one [`JobCompletion`] for
//! that run key back on the completion channel. Cancellation goes through a
//! separate [`JobCommands`] channel and is advisory: a cancelled job still
//! reports back, possibly with a result other than `Cancelled` if it finished
//! first.
//!
//! [`TokioBuilder`] is the stock implementation. It spawns every job as a
//! tokio task running a [`BuildOperation`] and keeps one
//! [`CancellationToken`] per running job.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use uuid::Uuid;

use super::job::{JobKey, JobOutcome, JobRunKey};

/// Sender half of the completion channel.
pub type CompletionSender = mpsc::UnboundedSender<JobCompletion>;

/// Receiver half of the completion channel.
pub type CompletionReceiver = mpsc::UnboundedReceiver<JobCompletion>;

/// Boxed future returned by a [`BuildOperation`].
pub type BuildFuture = Pin<Box<dyn Future<Output = JobOutcome> + Send + 'static>>;

// =============================================================================
// Ticket / Completion
// =============================================================================

/// What the builder gets to know about a job it should run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTicket {
    pub key: JobKey,
    pub run_key: JobRunKey,
    pub fingerprint: u64,
    pub source_uuid: Option<Uuid>,
}

/// Report sent back by the builder when a job finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCompletion {
    pub run_key: JobRunKey,
    pub outcome: JobOutcome,
}

// =============================================================================
// Traits
// =============================================================================

/// Starts jobs.
pub trait Builder: Send + Sync {
    /// Begins executing a job without blocking.
    ///
    /// Must send exactly one completion for `ticket.run_key` on `completion`.
    fn start(&self, ticket: JobTicket, completion: CompletionSender);
}

/// Job-command channel.
pub trait JobCommands: Send + Sync {
    /// Asks one job to stop. Unknown run keys are ignored.
    fn cancel(&self, run_key: JobRunKey);

    /// Asks every running job to stop.
    fn cancel_all(&self);
}

/// The actual work of a job, as run by [`TokioBuilder`].
///
/// Implementations should watch `cancel` and return
/// [`JobOutcome::Cancelled`] promptly once it fires. Closures of the shape
/// `Fn(JobTicket, CancellationToken) -> impl Future<Output = JobOutcome>`
/// implement this trait.
pub trait BuildOperation: Send + Sync + 'static {
    fn build(&self, ticket: JobTicket, cancel: CancellationToken) -> BuildFuture;
}

impl<F, Fut> BuildOperation for F
where
    F: Fn(JobTicket, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JobOutcome> + Send + 'static,
{
    fn build(&self, ticket: JobTicket, cancel: CancellationToken) -> BuildFuture {
        Box::pin(self(ticket, cancel))
    }
}

// =============================================================================
// Tokio Builder
// =============================================================================

/// Builder that runs each job as a tokio task.
///
/// Implements both [`Builder`] and [`JobCommands`]; share one instance
/// (behind an `Arc`) for both roles. Must be used from within a tokio
/// runtime.
pub struct TokioBuilder<O> {
    operation: Arc<O>,
    running: Arc<DashMap<JobRunKey, CancellationToken>>,
}

impl<O: BuildOperation> TokioBuilder<O> {
    pub fn new(operation: O) -> Self {
        Self {
            operation: Arc::new(operation),
            running: Arc::new(DashMap::new()),
        }
    }

    /// Number of jobs whose task has not finished yet.
    pub fn running_count(&self) -> usize {
        self.running.len()
    }
}

impl<O> Clone for TokioBuilder<O> {
    fn clone(&self) -> Self {
        Self {
            operation: Arc::clone(&self.operation),
            running: Arc::clone(&self.running),
        }
    }
}

impl<O: BuildOperation> Builder for TokioBuilder<O> {
    fn start(&self, ticket: JobTicket, completion: CompletionSender) {
        let run_key = ticket.run_key;
        let token = CancellationToken::new();
        self.running.insert(run_key, token.clone());

        let operation = Arc::clone(&self.operation);
        let running = Arc::clone(&self.running);

        trace!(job = %ticket.key, run_key = %run_key, "Spawning build task");

        tokio::spawn(async move {
            let build = operation.build(ticket, token.clone());

            let outcome = tokio::select! {
                biased;

                outcome = build => outcome,

                _ = token.cancelled() => JobOutcome::Cancelled,
            };

            running.remove(&run_key);

            if completion.send(JobCompletion { run_key, outcome }).is_err() {
                debug!(run_key = %run_key, "Completion receiver dropped");
            }
        });
    }
}

impl<O: BuildOperation> JobCommands for TokioBuilder<O> {
    fn cancel(&self, run_key: JobRunKey) {
        if let Some(token) = self.running.get(&run_key) {
            debug!(run_key = %run_key, "Cancelling build");
            token.cancel();
        }
    }

    fn cancel_all(&self) {
        debug!(running = self.running.len(), "Cancelling all builds");
        for entry in self.running.iter() {
            entry.value().cancel();
        }
    }
}

impl<O> std::fmt::Debug for TokioBuilder<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioBuilder")
            .field("running", &self.running.len())
            .finish_non_exhaustive()
    }
}
