//! Job identity, submission details and the per-job record.
//!
//! A job is one build of one source asset for one target platform. Its
//! identity is the [`JobKey`] triple `(source, platform, job key)`; every
//! submission additionally carries a unique [`JobRunKey`] so that two
//! submissions of the same logical job can be told apart while one of them
//! is still running.
//!
//! # Example
//!
//! ```
//! use assetproc::controller::{JobDetails, JobKey};
//!
//! let key = JobKey::new("textures/rock.png", "pc", "Texture Compile");
//! let details = JobDetails::new(key, 0x5eed)
//!     .critical(true)
//!     .with_escalation(10);
//!
//! assert!(details.is_critical);
//! assert_eq!(details.escalation, 10);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use uuid::Uuid;

// =============================================================================
// Escalation Constants
// =============================================================================

/// Escalation of a freshly submitted job.
///
/// A job counts as escalated (and may use the full job budget) only when its
/// escalation is strictly greater than this value.
pub const DEFAULT_ESCALATION: i32 = 0;

/// Escalation applied to jobs matched by a status request or an explicit
/// escalation by search term / source UUID.
pub const STATUS_REQUEST_ESCALATION: i32 = 150;

/// Escalation applied to jobs matched by a blocking compile request.
pub const SYNC_REQUEST_ESCALATION: i32 = 200;

/// Global counter for generating run keys.
static RUN_KEY_COUNTER: AtomicU64 = AtomicU64::new(1);

// =============================================================================
// Job Key
// =============================================================================

/// Identity of a logical unit of work: one job descriptor of one source asset
/// on one platform.
///
/// At most one pending and one processing job may exist per key at any time.
#[derive(Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct JobKey {
    source: String,
    platform: String,
    job_key: String,
}

impl JobKey {
    /// Creates a key from the source reference, platform identifier and job
    /// descriptor.
    pub fn new(
        source: impl Into<String>,
        platform: impl Into<String>,
        job_key: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            platform: platform.into(),
            job_key: job_key.into(),
        }
    }

    /// Source asset reference (relative path).
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Target platform identifier as given at submission.
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Job descriptor string.
    pub fn job_key(&self) -> &str {
        &self.job_key
    }
}

impl fmt::Debug for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobKey({})", self)
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.source, self.platform, self.job_key)
    }
}

// =============================================================================
// Run Key
// =============================================================================

/// Unique key of a single submission, used to address the job on the
/// external job-command channel.
#[derive(Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct JobRunKey(u64);

impl JobRunKey {
    /// Wraps an externally assigned run key.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Allocates the next process-wide unique run key.
    pub fn next() -> Self {
        Self(RUN_KEY_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for JobRunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobRunKey({})", self.0)
    }
}

impl fmt::Display for JobRunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Job Details (submission request)
// =============================================================================

/// Everything the controller needs to know about a job at submission time.
#[derive(Clone, Debug)]
pub struct JobDetails {
    /// Logical identity of the job.
    pub key: JobKey,

    /// Unique key of this submission.
    pub run_key: JobRunKey,

    /// Hash of the computed job inputs.
    pub fingerprint: u64,

    /// UUID of the source asset, when known.
    pub source_uuid: Option<Uuid>,

    /// Critical jobs are exempt from the halved regular budget.
    pub is_critical: bool,

    /// Initial escalation.
    pub escalation: i32,

    /// Known-failing job, resolved without using a worker slot.
    pub is_auto_fail: bool,

    /// Other jobs this job must run after.
    pub dependencies: Vec<JobKey>,

    /// Whether the source has a dependency that could not be resolved.
    pub missing_source_dependency: bool,
}

impl JobDetails {
    /// Creates details for a regular, non-escalated job with a fresh run key.
    pub fn new(key: JobKey, fingerprint: u64) -> Self {
        Self {
            key,
            run_key: JobRunKey::next(),
            fingerprint,
            source_uuid: None,
            is_critical: false,
            escalation: DEFAULT_ESCALATION,
            is_auto_fail: false,
            dependencies: Vec::new(),
            missing_source_dependency: false,
        }
    }

    /// Uses an externally assigned run key.
    pub fn with_run_key(mut self, run_key: JobRunKey) -> Self {
        self.run_key = run_key;
        self
    }

    /// Sets the source asset UUID.
    pub fn with_source_uuid(mut self, uuid: Uuid) -> Self {
        self.source_uuid = Some(uuid);
        self
    }

    /// Marks the job as critical.
    pub fn critical(mut self, critical: bool) -> Self {
        self.is_critical = critical;
        self
    }

    /// Sets the initial escalation.
    pub fn with_escalation(mut self, escalation: i32) -> Self {
        self.escalation = escalation;
        self
    }

    /// Marks the job as known-failing.
    pub fn auto_fail(mut self, auto_fail: bool) -> Self {
        self.is_auto_fail = auto_fail;
        self
    }

    /// Adds a job this job must run after.
    pub fn with_dependency(mut self, key: JobKey) -> Self {
        self.dependencies.push(key);
        self
    }

    /// Sets the missing source dependency flag.
    pub fn with_missing_source_dependency(mut self, missing: bool) -> Self {
        self.missing_source_dependency = missing;
        self
    }
}

// =============================================================================
// Job State / Outcome
// =============================================================================

/// Lifecycle state of a job record.
///
/// `Pending -> Processing -> {Completed | Failed | Cancelled}`. A pending job
/// may also go straight to `Cancelled` (superseded or removed) or `Failed`
/// (auto-fail). Terminal states never change again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    /// Returns true for `Completed`, `Failed` and `Cancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true for `Pending` and `Processing`.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Products reported by a successful build.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JobResponse {
    /// Relative paths of the produced assets.
    pub products: Vec<String>,
}

impl JobResponse {
    /// Creates a response with the given products.
    pub fn with_products<I, S>(products: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            products: products.into_iter().map(Into::into).collect(),
        }
    }
}

/// Result reported by the external builder when a job finishes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    Completed(JobResponse),
    Failed(String),
    Cancelled,
}

impl JobOutcome {
    /// The terminal state this outcome resolves a job to.
    pub fn state(&self) -> JobState {
        match self {
            Self::Completed(_) => JobState::Completed,
            Self::Failed(_) => JobState::Failed,
            Self::Cancelled => JobState::Cancelled,
        }
    }
}

// =============================================================================
// Job Record
// =============================================================================

/// A submitted job as owned by the [`JobIndex`](super::index::JobIndex).
#[derive(Clone, Debug)]
pub struct JobRecord {
    details: JobDetails,
    state: JobState,
    sequence: u64,
    submitted_at: Instant,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
}

impl JobRecord {
    /// Creates a pending record. `sequence` orders jobs of equal priority.
    pub fn pending(details: JobDetails, sequence: u64) -> Self {
        Self {
            details,
            state: JobState::Pending,
            sequence,
            submitted_at: Instant::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn key(&self) -> &JobKey {
        &self.details.key
    }

    pub fn run_key(&self) -> JobRunKey {
        self.details.run_key
    }

    pub fn details(&self) -> &JobDetails {
        &self.details
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn fingerprint(&self) -> u64 {
        self.details.fingerprint
    }

    pub fn source_uuid(&self) -> Option<Uuid> {
        self.details.source_uuid
    }

    pub fn is_critical(&self) -> bool {
        self.details.is_critical
    }

    pub fn escalation(&self) -> i32 {
        self.details.escalation
    }

    pub fn is_auto_fail(&self) -> bool {
        self.details.is_auto_fail
    }

    pub fn dependencies(&self) -> &[JobKey] {
        &self.details.dependencies
    }

    pub fn has_missing_source_dependency(&self) -> bool {
        self.details.missing_source_dependency
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Critical jobs and jobs escalated above the default use the escalated
    /// budget.
    pub fn is_critical_or_escalated(&self) -> bool {
        self.details.is_critical || self.details.escalation > DEFAULT_ESCALATION
    }

    /// Time spent waiting in the queue, up to now or to the start.
    pub fn queue_time(&self) -> Duration {
        match self.started_at {
            Some(started) => started.duration_since(self.submitted_at),
            None => self.submitted_at.elapsed(),
        }
    }

    /// Time spent processing, if the job was started and has finished.
    pub fn processing_time(&self) -> Option<Duration> {
        match (self.started_at, self.finished_at) {
            (Some(started), Some(finished)) => Some(finished.duration_since(started)),
            _ => None,
        }
    }

    pub(crate) fn set_escalation(&mut self, escalation: i32) {
        self.details.escalation = escalation;
    }

    pub(crate) fn set_state(&mut self, state: JobState) {
        match state {
            JobState::Processing => self.started_at = Some(Instant::now()),
            s if s.is_terminal() && self.finished_at.is_none() => {
                self.finished_at = Some(Instant::now())
            }
            _ => {}
        }
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_key_display() {
        let key = JobKey::new("foo.fbx", "pc", "texture");
        assert_eq!(format!("{}", key), "[foo.fbx, pc, texture]");
        assert_eq!(key.source(), "foo.fbx");
        assert_eq!(key.platform(), "pc");
        assert_eq!(key.job_key(), "texture");
    }

    #[test]
    fn test_job_key_equality_is_case_sensitive() {
        let a = JobKey::new("foo.fbx", "pc", "texture");
        let b = JobKey::new("foo.fbx", "PC", "texture");
        assert_ne!(a, b);
    }

    #[test]
    fn test_run_keys_are_unique() {
        let a = JobRunKey::next();
        let b = JobRunKey::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
    }

    #[test]
    fn test_details_defaults() {
        let details = JobDetails::new(JobKey::new("a.png", "pc", "tex"), 5);
        assert!(!details.is_critical);
        assert!(!details.is_auto_fail);
        assert_eq!(details.escalation, DEFAULT_ESCALATION);
        assert!(details.dependencies.is_empty());
        assert!(details.source_uuid.is_none());
    }

    #[test]
    fn test_critical_or_escalated() {
        let key = JobKey::new("a.png", "pc", "tex");
        let regular = JobRecord::pending(JobDetails::new(key.clone(), 1), 0);
        let critical = JobRecord::pending(JobDetails::new(key.clone(), 1).critical(true), 1);
        let escalated = JobRecord::pending(JobDetails::new(key, 1).with_escalation(1), 2);

        assert!(!regular.is_critical_or_escalated());
        assert!(critical.is_critical_or_escalated());
        assert!(escalated.is_critical_or_escalated());
    }

    #[test]
    fn test_state_transitions_record_timestamps() {
        let mut record = JobRecord::pending(JobDetails::new(JobKey::new("a", "pc", "j"), 1), 0);
        assert!(record.processing_time().is_none());

        record.set_state(JobState::Processing);
        record.set_state(JobState::Completed);

        assert!(record.state().is_terminal());
        assert!(record.processing_time().is_some());
    }

    #[test]
    fn test_outcome_state() {
        assert_eq!(
            JobOutcome::Completed(JobResponse::default()).state(),
            JobState::Completed
        );
        assert_eq!(JobOutcome::Failed("boom".into()).state(), JobState::Failed);
        assert_eq!(JobOutcome::Cancelled.state(), JobState::Cancelled);
    }
}
