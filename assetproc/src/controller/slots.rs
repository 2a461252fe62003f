//! Job slot budget.
//!
//! The controller runs at most `max` jobs at once. Regular jobs only get half
//! of that (at least one) unless `always_use_max` is set; the remaining slots
//! are kept free for critical and escalated work so on-demand requests are
//! not starved by background processing.
//!
//! ```text
//! max = 8, always_use_max = false
//!
//!   regular   [#][#][#][#][ ][ ][ ][ ]   limit 4
//!   escalated [#][#][#][#][#][#][#][#]   limit 8
//! ```

use tracing::info;

/// Lowest accepted job budget.
pub const MIN_MAX_JOBS: usize = 2;

/// CPU count assumed when the platform does not report a usable value.
pub const FALLBACK_CPU_COUNT: usize = 4;

/// Resolved concurrency budget.
///
/// Computed once at startup and read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSlots {
    max_jobs: usize,
    always_use_max: bool,
}

impl JobSlots {
    /// Creates a budget with an explicit maximum, clamped to [`MIN_MAX_JOBS`].
    pub fn new(max_jobs: usize, always_use_max: bool) -> Self {
        Self {
            max_jobs: max_jobs.max(MIN_MAX_JOBS),
            always_use_max,
        }
    }

    /// Resolves the budget from configuration.
    ///
    /// A configured maximum of 0 or 1 means "auto": the maximum is derived
    /// from `cpu_count` via [`auto_max_jobs`].
    pub fn resolve(configured_max: usize, always_use_max: bool, cpu_count: usize) -> Self {
        let max_jobs = if configured_max <= 1 {
            let auto = auto_max_jobs(cpu_count);
            info!(
                cpu_count,
                max_jobs = auto,
                "Auto-configured job budget from available CPU cores"
            );
            auto
        } else {
            configured_max
        };

        let slots = Self::new(max_jobs, always_use_max);
        info!(
            max_jobs = slots.max_jobs,
            regular = slots.regular_limit(),
            escalated = slots.escalated_limit(),
            always_use_max,
            "Job slots resolved"
        );
        slots
    }

    /// Maximum number of jobs in flight.
    pub fn max_jobs(&self) -> usize {
        self.max_jobs
    }

    /// Whether regular jobs may use the whole budget.
    pub fn always_use_max(&self) -> bool {
        self.always_use_max
    }

    /// Limit for jobs that are neither critical nor escalated.
    pub fn regular_limit(&self) -> usize {
        if self.always_use_max {
            self.max_jobs
        } else {
            (self.max_jobs / 2).max(1)
        }
    }

    /// Limit for critical or escalated jobs.
    pub fn escalated_limit(&self) -> usize {
        self.max_jobs
    }

    /// Picks the limit that applies to a job.
    pub fn limit_for(&self, critical_or_escalated: bool) -> usize {
        if critical_or_escalated {
            self.escalated_limit()
        } else {
            self.regular_limit()
        }
    }
}

impl Default for JobSlots {
    fn default() -> Self {
        Self::new(auto_max_jobs(FALLBACK_CPU_COUNT), false)
    }
}

/// Hand-tuned job count for a number of logical CPU cores.
///
/// Low core counts get fixed values; larger machines leave two cores free.
/// The result is never below [`MIN_MAX_JOBS`].
pub fn auto_max_jobs(cpu_count: usize) -> usize {
    let cpus = if cpu_count <= 1 {
        FALLBACK_CPU_COUNT
    } else {
        cpu_count
    };

    let jobs = match cpus {
        0..=4 => 3,
        5..=6 => 5,
        n => n - 2,
    };

    jobs.max(MIN_MAX_JOBS)
}
