//! Simulate command: drive the job controller with a synthetic workload.
//!
//! Submits a batch of fake build jobs, lets the controller schedule them on
//! the configured slot budget and streams the resulting events to stdout.
//! Useful for checking how `jobs.*` settings behave on a given machine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use assetproc::config::ConfigFile;
use assetproc::controller::{
    ChannelEventSink, CompileTarget, ControllerConfig, ControllerEvent, ControllerService,
    EventSink, JobDetails, JobKey, JobOutcome, JobResponse, JobTicket, MultiplexEventSink,
    RequestId, TokioBuilder, TracingEventSink,
};
use assetproc::logging::init_from_settings;
use assetproc::system::detect_cpu_cores;

use crate::error::CliError;

/// Arguments for the simulate command.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Number of jobs to submit
    #[arg(long, default_value_t = 24)]
    pub jobs: usize,

    /// Target platforms, comma separated
    #[arg(long, value_delimiter = ',', default_value = "pc")]
    pub platforms: Vec<String>,

    /// Base build duration in milliseconds
    #[arg(long, default_value_t = 40)]
    pub duration_ms: u64,

    /// Fail every Nth job (0 disables failures)
    #[arg(long, default_value_t = 0)]
    pub fail_every: u64,

    /// Mark every Nth job critical (0 disables)
    #[arg(long, default_value_t = 0)]
    pub critical_every: u64,

    /// Override jobs.max_jobs from the configuration file
    #[arg(long)]
    pub max_jobs: Option<usize>,

    /// Escalate jobs matching this search term before dispatch starts
    #[arg(long)]
    pub escalate: Option<String>,

    /// Request a compile group for this search term and report when it finishes
    #[arg(long)]
    pub group: Option<String>,
}

// ============================================================================
// Synthetic workload
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Workload {
    base: Duration,
    fail_every: u64,
}

impl Workload {
    /// Sleeps for a fingerprint-dependent time unless cancelled first.
    async fn build(self, ticket: JobTicket, cancel: CancellationToken) -> JobOutcome {
        let duration = self.base * (1 + (ticket.fingerprint % 4) as u32);

        tokio::select! {
            _ = cancel.cancelled() => JobOutcome::Cancelled,
            _ = tokio::time::sleep(duration) => {
                if self.fail_every > 0 && ticket.fingerprint % self.fail_every == 0 {
                    JobOutcome::Failed(format!("synthetic failure after {:?}", duration))
                } else {
                    JobOutcome::Completed(JobResponse::with_products([format!(
                        "{}.{}",
                        ticket.key.source(),
                        ticket.key.platform()
                    )]))
                }
            }
        }
    }
}

fn job_details(index: usize, platforms: &[String], critical_every: u64) -> JobDetails {
    let fingerprint = index as u64 + 1;
    let platform = &platforms[index % platforms.len()];
    let key = JobKey::new(format!("assets/item_{:03}.png", index), platform, "texture");

    JobDetails::new(key, fingerprint)
        .critical(critical_every > 0 && fingerprint % critical_every == 0)
}

// ============================================================================
// Summary
// ============================================================================

#[derive(Debug, Default)]
struct Summary {
    compiled: usize,
    failed: usize,
    cancelled: usize,
    peak_active: usize,
}

impl Summary {
    fn record(&mut self, event: &ControllerEvent) {
        match event {
            ControllerEvent::FileCompiled { .. } => self.compiled += 1,
            ControllerEvent::FileFailed { .. } => self.failed += 1,
            ControllerEvent::FileCancelled { .. } => self.cancelled += 1,
            ControllerEvent::ActiveJobsCountChanged { count } => {
                self.peak_active = self.peak_active.max(*count)
            }
            _ => {}
        }
    }

    fn finished(&self) -> usize {
        self.compiled + self.failed + self.cancelled
    }
}

fn print_event(elapsed: Duration, event: &ControllerEvent) {
    let millis = elapsed.as_millis();
    match event {
        ControllerEvent::JobStarted { source, platform } => {
            println!("[{:>6}ms] started    {} ({})", millis, source, platform)
        }
        ControllerEvent::FileCompiled { key, response } => println!(
            "[{:>6}ms] compiled   {} -> {}",
            millis,
            key,
            response.products.join(", ")
        ),
        ControllerEvent::FileFailed { key } => println!("[{:>6}ms] failed     {}", millis, key),
        ControllerEvent::FileCancelled { key } => {
            println!("[{:>6}ms] cancelled  {}", millis, key)
        }
        ControllerEvent::CompileGroupCreated { request_id, status }
        | ControllerEvent::CompileGroupFinished { request_id, status } => println!(
            "[{:>6}ms] {:<10} {} {}",
            millis,
            event.event_type(),
            request_id,
            status
        ),
        ControllerEvent::BecameIdle => println!("[{:>6}ms] idle", millis),
        _ => {}
    }
}

// ============================================================================
// Command
// ============================================================================

/// Run the simulate command.
pub fn run(args: SimulateArgs) -> Result<(), CliError> {
    if args.platforms.iter().all(|p| p.trim().is_empty()) {
        return Err(CliError::Config("at least one platform is required".to_string()));
    }

    let mut config = ConfigFile::load()?;
    let _logging_guard = init_from_settings(&config.logging).map_err(CliError::LoggingInit)?;

    if let Some(max_jobs) = args.max_jobs {
        config.jobs.max_jobs = max_jobs;
    }
    let controller_config =
        ControllerConfig::from_settings(&config.jobs, &config.controller, detect_cpu_cores());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    runtime.block_on(simulate(args, controller_config))
}

async fn simulate(args: SimulateArgs, config: ControllerConfig) -> Result<(), CliError> {
    let platforms: Vec<String> = args
        .platforms
        .iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();

    let workload = Workload {
        base: Duration::from_millis(args.duration_ms),
        fail_every: args.fail_every,
    };
    let builder = Arc::new(TokioBuilder::new(
        move |ticket: JobTicket, cancel: CancellationToken| workload.build(ticket, cancel),
    ));

    let (channel, mut events) = ChannelEventSink::new();
    let sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(channel), Arc::new(TracingEventSink)];
    let sink = MultiplexEventSink::new(sinks);
    let (service, handle) = ControllerService::new(config, builder.clone(), builder);
    let service = service.with_event_sink(Arc::new(sink));

    let shutdown = CancellationToken::new();
    let task = tokio::spawn(service.run(shutdown.clone()));

    // Queue everything before the first dispatch so ranking is visible.
    handle.set_dispatch_paused(true).await?;
    for index in 0..args.jobs {
        handle
            .submit(job_details(index, &platforms, args.critical_every))
            .await?;
    }
    info!(jobs = args.jobs, platforms = ?platforms, "Submitted synthetic jobs");

    if let Some(term) = &args.escalate {
        for platform in &platforms {
            let matched = handle.escalate_by_search_term(platform, term).await?;
            println!("Escalated {} job(s) matching '{}' on {}", matched, term, platform);
        }
    }

    if let Some(term) = &args.group {
        let status = handle
            .request_compile_group(RequestId(1), &platforms[0], CompileTarget::path(term), false)
            .await?;
        println!("Compile group for '{}': {}", term, status);
    }

    let started = Instant::now();
    handle.set_dispatch_paused(false).await?;

    let mut summary = Summary::default();
    while summary.finished() < args.jobs {
        let Some(event) = events.recv().await else {
            break;
        };
        summary.record(&event);
        print_event(started.elapsed(), &event);
    }

    let status = handle.status().await?;
    shutdown.cancel();
    match task.await {
        Ok(result) => result?,
        Err(e) => return Err(CliError::Task(e)),
    }

    let processing: Vec<Duration> = status
        .recent
        .iter()
        .filter_map(|job| job.processing_time)
        .collect();
    let average = if processing.is_empty() {
        Duration::ZERO
    } else {
        processing.iter().sum::<Duration>() / processing.len() as u32
    };

    println!();
    println!("Simulation Summary");
    println!("==================");
    println!("  Elapsed:        {:?}", started.elapsed());
    println!(
        "  Max jobs:       {} ({} regular)",
        status.max_jobs, status.regular_limit
    );
    println!("  Peak active:    {}", summary.peak_active);
    println!("  Compiled:       {}", summary.compiled);
    println!("  Failed:         {}", summary.failed);
    println!("  Cancelled:      {}", summary.cancelled);
    println!("  Avg build time: {:?}", average);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_details_rotate_platforms() {
        let platforms = vec!["pc".to_string(), "mac".to_string()];
        assert_eq!(job_details(0, &platforms, 0).key.platform(), "pc");
        assert_eq!(job_details(1, &platforms, 0).key.platform(), "mac");
        assert_eq!(job_details(2, &platforms, 0).key.platform(), "pc");
    }

    #[test]
    fn test_critical_every_nth_job() {
        let platforms = vec!["pc".to_string()];
        assert!(!job_details(0, &platforms, 2).is_critical);
        assert!(job_details(1, &platforms, 2).is_critical);
        assert!(!job_details(1, &platforms, 0).is_critical);
    }

    #[test]
    fn test_summary_counts_terminal_events() {
        let key = JobKey::new("a.png", "pc", "texture");
        let mut summary = Summary::default();
        summary.record(&ControllerEvent::FileFailed { key: key.clone() });
        summary.record(&ControllerEvent::FileCancelled { key });
        summary.record(&ControllerEvent::ActiveJobsCountChanged { count: 3 });
        summary.record(&ControllerEvent::ActiveJobsCountChanged { count: 1 });

        assert_eq!(summary.finished(), 2);
        assert_eq!(summary.peak_active, 3);
    }

    #[tokio::test]
    async fn test_workload_honours_cancellation() {
        let workload = Workload {
            base: Duration::from_secs(60),
            fail_every: 0,
        };
        let ticket = job_ticket(3);
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(workload.build(ticket, cancel).await, JobOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_workload_fails_every_nth() {
        let workload = Workload {
            base: Duration::from_millis(1),
            fail_every: 3,
        };
        let outcome = workload.build(job_ticket(3), CancellationToken::new()).await;
        assert!(matches!(outcome, JobOutcome::Failed(_)));

        let outcome = workload.build(job_ticket(4), CancellationToken::new()).await;
        assert!(matches!(outcome, JobOutcome::Completed(_)));
    }

    fn job_ticket(fingerprint: u64) -> JobTicket {
        JobTicket {
            key: JobKey::new("a.png", "pc", "texture"),
            run_key: assetproc::controller::JobRunKey::new(fingerprint),
            fingerprint,
            source_uuid: None,
        }
    }
}
