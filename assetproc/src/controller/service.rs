//! Asynchronous controller service.
//!
//! The [`ControllerService`] owns a [`JobController`] and is its only caller.
//! Operations arrive as commands from any number of [`ControllerHandle`]s;
//! completions arrive from the builder. Both are consumed by one task, so
//! the controller needs no locking.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   Command    ┌───────────────────┐   JobTicket   ┌─────────┐
//! │ ControllerHandle │────────────► │                   │─────────────► │         │
//! └──────────────────┘              │ ControllerService │               │ Builder │
//! ┌──────────────────┐   Command    │  (JobController)  │ JobCompletion │         │
//! │ ControllerHandle │────────────► │                   │ ◄─────────────│         │
//! └──────────────────┘              └─────────┬─────────┘               └─────────┘
//!                                             │
//!                                             ▼ ControllerEvent
//!                                        EventSink
//! ```
//!
//! # Shutdown
//!
//! When the shutdown token fires, or every handle is dropped, the service
//! stops accepting commands, cancels all pending jobs, asks the builder to
//! stop everything and then waits for in-flight jobs in bounded, logged
//! polls. Completions are still consumed while it waits.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::builder::{Builder, CompletionReceiver, JobCommands};
use super::config::ControllerConfig;
use super::core::{ControllerStatus, JobController};
use super::error::ControllerError;
use super::escalation::CompileTarget;
use super::events::{AssetStatus, EventSink, RequestId};
use super::job::{JobDetails, JobKey, JobRunKey};
use super::submission::SubmitDisposition;

// =============================================================================
// Commands
// =============================================================================

/// Messages from handles to the service.
enum Command {
    Submit {
        details: JobDetails,
        reply: oneshot::Sender<SubmitDisposition>,
    },
    CancelJob {
        run_key: JobRunKey,
        reply: oneshot::Sender<bool>,
    },
    RemoveJobsBySource {
        source: String,
        reply: oneshot::Sender<usize>,
    },
    AddedToCatalog {
        key: JobKey,
    },
    SetDispatchPaused {
        paused: bool,
    },
    EscalateBySearchTerm {
        platform: String,
        term: String,
        reply: oneshot::Sender<usize>,
    },
    EscalateBySourceUuid {
        platform: String,
        uuid: Uuid,
        reply: oneshot::Sender<usize>,
    },
    RequestCompileGroup {
        request_id: RequestId,
        platform: String,
        target: CompileTarget,
        is_status_request: bool,
        reply: oneshot::Sender<AssetStatus>,
    },
    PendingCount {
        platform: String,
        reply: oneshot::Sender<usize>,
    },
    PendingCriticalCount {
        platform: String,
        reply: oneshot::Sender<usize>,
    },
    IsIdle {
        reply: oneshot::Sender<bool>,
    },
    Status {
        reply: oneshot::Sender<ControllerStatus>,
    },
}

// =============================================================================
// Handle
// =============================================================================

/// Cloneable front end of a running [`ControllerService`].
///
/// Every method fails with [`ControllerError::ChannelClosed`] once the
/// service has stopped.
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<Command>,
}

impl ControllerHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ControllerError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).await?;
        Ok(rx.await?)
    }

    /// Submits a job.
    pub async fn submit(&self, details: JobDetails) -> Result<SubmitDisposition, ControllerError> {
        self.request(|reply| Command::Submit { details, reply })
            .await
    }

    /// Cancels one job. Returns false if the run key is not active.
    pub async fn cancel_job(&self, run_key: JobRunKey) -> Result<bool, ControllerError> {
        self.request(|reply| Command::CancelJob { run_key, reply })
            .await
    }

    /// Cancels the pending jobs of a source. Returns how many were removed.
    pub async fn remove_jobs_by_source(
        &self,
        source: impl Into<String>,
    ) -> Result<usize, ControllerError> {
        let source = source.into();
        self.request(|reply| Command::RemoveJobsBySource { source, reply })
            .await
    }

    /// Reports that the products of a job were added to the catalog.
    pub async fn added_to_catalog(&self, key: JobKey) -> Result<(), ControllerError> {
        self.tx.send(Command::AddedToCatalog { key }).await?;
        Ok(())
    }

    pub async fn set_dispatch_paused(&self, paused: bool) -> Result<(), ControllerError> {
        self.tx.send(Command::SetDispatchPaused { paused }).await?;
        Ok(())
    }

    /// Escalates matching jobs. Returns the number of matches.
    pub async fn escalate_by_search_term(
        &self,
        platform: impl Into<String>,
        term: impl Into<String>,
    ) -> Result<usize, ControllerError> {
        let platform = platform.into();
        let term = term.into();
        self.request(|reply| Command::EscalateBySearchTerm {
            platform,
            term,
            reply,
        })
        .await
    }

    /// Escalates the jobs of one source asset. Returns the number of matches.
    pub async fn escalate_by_source_uuid(
        &self,
        platform: impl Into<String>,
        uuid: Uuid,
    ) -> Result<usize, ControllerError> {
        let platform = platform.into();
        self.request(|reply| Command::EscalateBySourceUuid {
            platform,
            uuid,
            reply,
        })
        .await
    }

    /// Creates a compile group. The result is also announced as a
    /// `CompileGroupCreated` event, and completion as `CompileGroupFinished`.
    pub async fn request_compile_group(
        &self,
        request_id: RequestId,
        platform: impl Into<String>,
        target: CompileTarget,
        is_status_request: bool,
    ) -> Result<AssetStatus, ControllerError> {
        let platform = platform.into();
        self.request(|reply| Command::RequestCompileGroup {
            request_id,
            platform,
            target,
            is_status_request,
            reply,
        })
        .await
    }

    pub async fn pending_count(&self, platform: impl Into<String>) -> Result<usize, ControllerError> {
        let platform = platform.into();
        self.request(|reply| Command::PendingCount { platform, reply })
            .await
    }

    pub async fn pending_critical_count(
        &self,
        platform: impl Into<String>,
    ) -> Result<usize, ControllerError> {
        let platform = platform.into();
        self.request(|reply| Command::PendingCriticalCount { platform, reply })
            .await
    }

    pub async fn is_idle(&self) -> Result<bool, ControllerError> {
        self.request(|reply| Command::IsIdle { reply }).await
    }

    pub async fn status(&self) -> Result<ControllerStatus, ControllerError> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// True once the service has stopped accepting commands.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl std::fmt::Debug for ControllerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}

// =============================================================================
// Service
// =============================================================================

/// Runs a [`JobController`] as a tokio task.
pub struct ControllerService {
    controller: JobController,
    completions: CompletionReceiver,
    commands: mpsc::Receiver<Command>,
}

impl ControllerService {
    /// Creates the service and its first handle.
    pub fn new(
        config: ControllerConfig,
        builder: Arc<dyn Builder>,
        commands: Arc<dyn JobCommands>,
    ) -> (Self, ControllerHandle) {
        let capacity = config.command_channel_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let (controller, completions) = JobController::new(config, builder, commands);

        let service = Self {
            controller,
            completions,
            commands: rx,
        };
        (service, ControllerHandle { tx })
    }

    /// Replaces the event sink of the wrapped controller.
    pub fn with_event_sink(self, events: Arc<dyn EventSink>) -> Self {
        Self {
            controller: self.controller.with_event_sink(events),
            ..self
        }
    }

    pub fn controller(&self) -> &JobController {
        &self.controller
    }

    /// Runs until `shutdown` fires or every handle is dropped, then drains.
    ///
    /// Returns [`ControllerError::ShutdownTimeout`] if in-flight jobs do not
    /// finish within the configured number of drain polls.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), ControllerError> {
        info!(
            max_jobs = self.controller.config().slots.max_jobs(),
            regular_limit = self.controller.config().slots.regular_limit(),
            "Job controller started"
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Job controller shutdown requested");
                    break;
                }

                Some(completion) = self.completions.recv() => {
                    self.controller.handle_completion(completion);
                }

                command = self.commands.recv() => {
                    let Some(command) = command else {
                        info!("All controller handles dropped, shutting down");
                        break;
                    };
                    self.handle_command(command);
                }
            }
        }

        self.commands.close();
        self.drain().await
    }

    fn handle_command(&mut self, command: Command) {
        let controller = &mut self.controller;

        // Callers may have given up on a reply; that is not our concern.
        match command {
            Command::Submit { details, reply } => {
                let _ = reply.send(controller.submit(details));
            }
            Command::CancelJob { run_key, reply } => {
                let _ = reply.send(controller.cancel_job(run_key));
            }
            Command::RemoveJobsBySource { source, reply } => {
                let _ = reply.send(controller.remove_jobs_by_source(&source));
            }
            Command::AddedToCatalog { key } => {
                controller.on_added_to_catalog(&key);
            }
            Command::SetDispatchPaused { paused } => {
                controller.set_dispatch_paused(paused);
            }
            Command::EscalateBySearchTerm {
                platform,
                term,
                reply,
            } => {
                let _ = reply.send(controller.escalate_by_search_term(&platform, &term));
            }
            Command::EscalateBySourceUuid {
                platform,
                uuid,
                reply,
            } => {
                let _ = reply.send(controller.escalate_by_source_uuid(&platform, uuid));
            }
            Command::RequestCompileGroup {
                request_id,
                platform,
                target,
                is_status_request,
                reply,
            } => {
                let status = controller.request_compile_group(
                    request_id,
                    &platform,
                    target,
                    is_status_request,
                );
                let _ = reply.send(status);
            }
            Command::PendingCount { platform, reply } => {
                let _ = reply.send(controller.pending_count(&platform));
            }
            Command::PendingCriticalCount { platform, reply } => {
                let _ = reply.send(controller.pending_critical_count(&platform));
            }
            Command::IsIdle { reply } => {
                let _ = reply.send(controller.is_idle());
            }
            Command::Status { reply } => {
                let _ = reply.send(controller.status());
            }
        }
    }

    /// Cancels everything and waits for in-flight jobs to report back.
    async fn drain(&mut self) -> Result<(), ControllerError> {
        let interval = self.controller.config().shutdown_poll_interval;
        let max_polls = self.controller.config().shutdown_max_polls;
        let mut polls = 0u32;

        while !self.controller.quit_requested() {
            let in_flight = self.controller.in_flight_count();
            if polls >= max_polls {
                warn!(polls, in_flight, "Jobs still in flight, giving up on shutdown drain");
                return Err(ControllerError::ShutdownTimeout { polls, in_flight });
            }
            polls += 1;
            debug!(poll = polls, in_flight, "Waiting for in-flight jobs to finish");

            if let Ok(Some(completion)) =
                tokio::time::timeout(interval, self.completions.recv()).await
            {
                self.controller.handle_completion(completion);
            }
        }

        info!(polls, "Job controller stopped");
        Ok(())
    }
}

impl std::fmt::Debug for ControllerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerService")
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::events::{ControllerEvent, RecordingEventSink};
    use crate::controller::slots::JobSlots;
    use crate::controller::test_support::RecordingBuilder;
    use std::time::Duration;

    fn service_with_recorder(
        config: ControllerConfig,
    ) -> (
        ControllerService,
        ControllerHandle,
        Arc<RecordingBuilder>,
        Arc<RecordingEventSink>,
    ) {
        let builder = Arc::new(RecordingBuilder::default());
        let events = Arc::new(RecordingEventSink::default());
        let (service, handle) = ControllerService::new(
            config,
            Arc::clone(&builder) as Arc<dyn Builder>,
            Arc::clone(&builder) as Arc<dyn JobCommands>,
        );
        let service = service.with_event_sink(Arc::clone(&events) as Arc<dyn EventSink>);
        (service, handle, builder, events)
    }

    #[tokio::test]
    async fn test_handle_round_trip() {
        let config = ControllerConfig::with_slots(JobSlots::new(4, false));
        let (service, handle, builder, _events) = service_with_recorder(config);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(service.run(shutdown.clone()));

        handle.set_dispatch_paused(true).await.unwrap();
        let key = JobKey::new("a.png", "pc", "tex");
        let disposition = handle.submit(JobDetails::new(key, 1)).await.unwrap();
        assert_eq!(disposition, SubmitDisposition::Queued);
        assert_eq!(handle.pending_count("pc").await.unwrap(), 1);
        assert!(!handle.is_idle().await.unwrap());
        assert_eq!(handle.remove_jobs_by_source("a.png").await.unwrap(), 1);
        assert!(handle.is_idle().await.unwrap());
        assert!(builder.started().is_empty());

        shutdown.cancel();
        task.await.unwrap().unwrap();
        assert!(handle.is_closed());
        assert!(matches!(
            handle.is_idle().await,
            Err(ControllerError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_stops_when_handles_dropped() {
        let config = ControllerConfig::with_slots(JobSlots::new(2, false));
        let (service, handle, _builder, events) = service_with_recorder(config);
        drop(handle);

        service.run(CancellationToken::new()).await.unwrap();
        assert!(events.drain().contains(&ControllerEvent::ReadyToQuit));
    }

    #[tokio::test]
    async fn test_shutdown_times_out_when_jobs_never_report() {
        let config = ControllerConfig {
            shutdown_poll_interval: Duration::from_millis(1),
            shutdown_max_polls: 3,
            ..ControllerConfig::with_slots(JobSlots::new(2, false))
        };
        let (service, handle, builder, _events) = service_with_recorder(config);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(service.run(shutdown.clone()));

        handle
            .submit(JobDetails::new(JobKey::new("a.png", "pc", "tex"), 1))
            .await
            .unwrap();
        assert_eq!(builder.started().len(), 1);

        shutdown.cancel();
        let result = task.await.unwrap();
        assert!(matches!(
            result,
            Err(ControllerError::ShutdownTimeout {
                polls: 3,
                in_flight: 1
            })
        ));
        // Cancel is broadcast on every poll.
        assert!(builder.cancel_all_calls() >= 3);
    }
}
