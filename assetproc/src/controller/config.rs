//! Controller configuration.
//!
//! This module contains the [`ControllerConfig`] struct and the defaults the
//! controller falls back to when no configuration file is present.

use std::time::Duration;

use super::index::DEFAULT_COMPLETED_HISTORY;
use super::slots::JobSlots;
use crate::config::{ControllerSettings, JobsSettings};

// =============================================================================
// Configuration Constants
// =============================================================================

/// Default command channel capacity of the controller service.
pub const DEFAULT_COMMAND_CHANNEL_CAPACITY: usize = 256;

/// Default delay between shutdown drain polls.
pub const DEFAULT_SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Default number of shutdown drain polls before giving up (30 seconds at
/// the default interval).
pub const DEFAULT_SHUTDOWN_MAX_POLLS: u32 = 3000;

// =============================================================================
// Controller Configuration
// =============================================================================

/// Configuration for the job controller.
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Resolved concurrency budget.
    pub slots: JobSlots,

    /// Keep a slot occupied by a completed job until the catalog
    /// acknowledges it.
    pub hold_slots_until_cataloged: bool,

    /// Number of finished jobs kept for inspection.
    pub completed_history: usize,

    /// Command channel capacity of the service.
    pub command_channel_capacity: usize,

    /// Delay between shutdown drain polls.
    pub shutdown_poll_interval: Duration,

    /// Shutdown drain polls before the service gives up.
    pub shutdown_max_polls: u32,
}

impl ControllerConfig {
    /// Creates a configuration with an explicit budget and defaults for
    /// everything else.
    pub fn with_slots(slots: JobSlots) -> Self {
        Self {
            slots,
            ..Self::default()
        }
    }

    /// Builds the configuration from settings, auto-detecting the budget
    /// from `cpu_count` when `max_jobs` is 0 or 1.
    pub fn from_settings(
        jobs: &JobsSettings,
        controller: &ControllerSettings,
        cpu_count: usize,
    ) -> Self {
        Self {
            slots: JobSlots::resolve(jobs.max_jobs, jobs.always_use_max_jobs, cpu_count),
            hold_slots_until_cataloged: jobs.hold_slots_until_cataloged,
            completed_history: jobs.completed_history,
            command_channel_capacity: controller.command_channel_capacity,
            shutdown_poll_interval: controller.shutdown_poll_interval,
            shutdown_max_polls: controller.shutdown_max_polls,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            slots: JobSlots::default(),
            hold_slots_until_cataloged: false,
            completed_history: DEFAULT_COMPLETED_HISTORY,
            command_channel_capacity: DEFAULT_COMMAND_CHANNEL_CAPACITY,
            shutdown_poll_interval: DEFAULT_SHUTDOWN_POLL_INTERVAL,
            shutdown_max_polls: DEFAULT_SHUTDOWN_MAX_POLLS,
        }
    }
}
