//! Integration tests for the job controller service.
//!
//! These tests drive a real [`ControllerService`] with a [`TokioBuilder`]
//! through its handle and observe the emitted events:
//! - Submission → dispatch → completion
//! - Failures, supersession and compile groups
//! - Catalog holds and shutdown drain
//!
//! Run with: `cargo test --test controller_integration`

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use assetproc::controller::{
    AssetStatus, ChannelEventSink, CompileTarget, ControllerConfig, ControllerError,
    ControllerEvent, ControllerHandle, ControllerService, JobDetails, JobKey, JobOutcome,
    JobResponse, JobSlots, JobStatus, JobTicket, RequestId, SubmitDisposition, TokioBuilder,
};

// ============================================================================
// Test Helpers
// ============================================================================

/// Fingerprint that makes the build wait until it is cancelled.
const BLOCKING_FINGERPRINT: u64 = 1;

/// Source name prefix that makes the build fail.
const FAILING_PREFIX: &str = "broken";

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

async fn build(ticket: JobTicket, cancel: CancellationToken) -> JobOutcome {
    if ticket.fingerprint == BLOCKING_FINGERPRINT {
        cancel.cancelled().await;
        return JobOutcome::Cancelled;
    }

    tokio::time::sleep(Duration::from_millis(5)).await;
    if ticket.key.source().starts_with(FAILING_PREFIX) {
        JobOutcome::Failed("synthetic failure".to_string())
    } else {
        JobOutcome::Completed(JobResponse::with_products([format!(
            "{}.{}",
            ticket.key.source(),
            ticket.key.platform()
        )]))
    }
}

struct Running {
    handle: ControllerHandle,
    events: UnboundedReceiver<ControllerEvent>,
    shutdown: CancellationToken,
    task: JoinHandle<Result<(), ControllerError>>,
}

impl Running {
    /// Waits for the first event matching `pred`, skipping others.
    async fn wait_for(&mut self, pred: impl Fn(&ControllerEvent) -> bool) -> ControllerEvent {
        tokio::time::timeout(EVENT_TIMEOUT, async {
            loop {
                let event = self.events.recv().await.expect("event channel closed");
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    async fn stop(self) -> (Result<(), ControllerError>, Vec<ControllerEvent>) {
        let Running {
            mut events,
            shutdown,
            task,
            ..
        } = self;
        shutdown.cancel();
        let result = task.await.expect("service task panicked");

        let mut rest = Vec::new();
        while let Ok(event) = events.try_recv() {
            rest.push(event);
        }
        (result, rest)
    }
}

fn start(config: ControllerConfig) -> Running {
    let builder = Arc::new(TokioBuilder::new(build));
    let (sink, events) = ChannelEventSink::new();
    let (service, handle) = ControllerService::new(config, builder.clone(), builder);
    let service = service.with_event_sink(Arc::new(sink));

    let shutdown = CancellationToken::new();
    let task = tokio::spawn(service.run(shutdown.clone()));

    Running {
        handle,
        events,
        shutdown,
        task,
    }
}

fn config(max_jobs: usize) -> ControllerConfig {
    ControllerConfig::with_slots(JobSlots::new(max_jobs, false))
}

fn key(source: &str) -> JobKey {
    JobKey::new(source, "pc", "texture")
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_jobs_complete_end_to_end() {
    let mut running = start(config(4));

    for source in ["a.png", "b.png", "c.png"] {
        let disposition = running
            .handle
            .submit(JobDetails::new(key(source), 7))
            .await
            .unwrap();
        assert_eq!(disposition, SubmitDisposition::Queued);
    }

    for _ in 0..3 {
        running
            .wait_for(|e| matches!(e, ControllerEvent::FileCompiled { .. }))
            .await;
    }

    assert!(running.handle.is_idle().await.unwrap());
    let status = running.handle.status().await.unwrap();
    assert_eq!(status.recent.len(), 3);
    assert_eq!(status.in_flight, 0);
    assert_eq!(running.handle.pending_count("pc").await.unwrap(), 0);

    let (result, _) = running.stop().await;
    result.unwrap();
}

#[tokio::test]
async fn test_compiled_response_carries_products() {
    let mut running = start(config(2));
    running
        .handle
        .submit(JobDetails::new(key("hero.png"), 3))
        .await
        .unwrap();

    let event = running
        .wait_for(|e| matches!(e, ControllerEvent::FileCompiled { .. }))
        .await;
    let ControllerEvent::FileCompiled { key: done, response } = event else {
        unreachable!();
    };
    assert_eq!(done, key("hero.png"));
    assert_eq!(response.products, vec!["hero.png.pc".to_string()]);

    running.stop().await.0.unwrap();
}

#[tokio::test]
async fn test_failed_build_is_reported() {
    let mut running = start(config(2));
    running
        .handle
        .submit(JobDetails::new(key("broken.png"), 3))
        .await
        .unwrap();

    running
        .wait_for(|e| *e == ControllerEvent::FileFailed { key: key("broken.png") })
        .await;
    running
        .wait_for(|e| {
            *e == ControllerEvent::JobStatusChanged {
                key: key("broken.png"),
                status: JobStatus::Failed,
            }
        })
        .await;

    running.stop().await.0.unwrap();
}

#[tokio::test]
async fn test_new_fingerprint_supersedes_running_build() {
    let mut running = start(config(2));

    running
        .handle
        .submit(JobDetails::new(key("level.fbx"), BLOCKING_FINGERPRINT))
        .await
        .unwrap();
    running
        .wait_for(|e| matches!(e, ControllerEvent::JobStarted { .. }))
        .await;

    let disposition = running
        .handle
        .submit(JobDetails::new(key("level.fbx"), 2))
        .await
        .unwrap();
    assert_eq!(disposition, SubmitDisposition::Queued);

    running
        .wait_for(|e| *e == ControllerEvent::FileCancelled { key: key("level.fbx") })
        .await;
    running
        .wait_for(|e| matches!(e, ControllerEvent::FileCompiled { key: k, .. } if *k == key("level.fbx")))
        .await;

    running.stop().await.0.unwrap();
}

#[tokio::test]
async fn test_compile_group_finishes_after_members() {
    let mut running = start(config(4));
    running.handle.set_dispatch_paused(true).await.unwrap();

    running
        .handle
        .submit(JobDetails::new(key("rock.png"), 5))
        .await
        .unwrap();
    running
        .handle
        .submit(JobDetails::new(JobKey::new("rock.png", "pc", "mesh"), 5))
        .await
        .unwrap();

    let status = running
        .handle
        .request_compile_group(RequestId(1), "pc", CompileTarget::path("rock.png"), false)
        .await
        .unwrap();
    assert_eq!(status, AssetStatus::Queued);

    running.handle.set_dispatch_paused(false).await.unwrap();
    running
        .wait_for(|e| {
            *e == ControllerEvent::CompileGroupFinished {
                request_id: RequestId(1),
                status: AssetStatus::Compiled,
            }
        })
        .await;

    running.stop().await.0.unwrap();
}

#[tokio::test]
async fn test_compile_group_for_unknown_asset() {
    let running = start(config(2));
    let status = running
        .handle
        .request_compile_group(
            RequestId(9),
            "pc",
            CompileTarget::SourceUuid(uuid::Uuid::new_v4()),
            true,
        )
        .await
        .unwrap();
    assert_eq!(status, AssetStatus::Unknown);
    assert_eq!(running.handle.status().await.unwrap().compile_groups, 0);

    running.stop().await.0.unwrap();
}

#[tokio::test]
async fn test_catalog_hold_keeps_slot_until_acknowledged() {
    let mut running = start(ControllerConfig {
        hold_slots_until_cataloged: true,
        ..config(2)
    });

    running
        .handle
        .submit(JobDetails::new(key("tree.png"), 4))
        .await
        .unwrap();
    running
        .wait_for(|e| matches!(e, ControllerEvent::FileCompiled { .. }))
        .await;

    let status = running.handle.status().await.unwrap();
    assert_eq!(status.in_flight, 1);
    assert!(!running.handle.is_idle().await.unwrap());

    running.handle.added_to_catalog(key("tree.png")).await.unwrap();
    running
        .wait_for(|e| *e == ControllerEvent::BecameIdle)
        .await;
    assert_eq!(running.handle.status().await.unwrap().in_flight, 0);

    running.stop().await.0.unwrap();
}

#[tokio::test]
async fn test_shutdown_cancels_running_and_pending_jobs() {
    let mut running = start(config(2));

    running
        .handle
        .submit(JobDetails::new(key("slow.png"), BLOCKING_FINGERPRINT))
        .await
        .unwrap();
    running
        .wait_for(|e| matches!(e, ControllerEvent::JobStarted { .. }))
        .await;
    // Regular limit is 1, so this one stays pending.
    running
        .handle
        .submit(JobDetails::new(key("waiting.png"), 3))
        .await
        .unwrap();

    let handle = running.handle.clone();
    let (result, events) = running.stop().await;
    result.unwrap();

    assert!(events.contains(&ControllerEvent::FileCancelled { key: key("slow.png") }));
    assert!(events.contains(&ControllerEvent::FileCancelled {
        key: key("waiting.png")
    }));
    assert_eq!(events.last(), Some(&ControllerEvent::ReadyToQuit));
    assert!(matches!(
        handle.status().await,
        Err(ControllerError::ChannelClosed)
    ));
}

#[tokio::test]
async fn test_escalation_through_handle() {
    let running = start(config(2));
    running.handle.set_dispatch_paused(true).await.unwrap();
    running
        .handle
        .submit(JobDetails::new(key("textures/wall.png"), 3))
        .await
        .unwrap();

    // A trailing stem suffix on the search term is ignored as a last resort.
    let matched = running
        .handle
        .escalate_by_search_term("pc", "@assets@/textures/wall_albedo.png")
        .await
        .unwrap();
    assert_eq!(matched, 1);
    assert_eq!(
        running
            .handle
            .escalate_by_search_term("mac", "wall.png")
            .await
            .unwrap(),
        0
    );

    running.stop().await.0.unwrap();
}
