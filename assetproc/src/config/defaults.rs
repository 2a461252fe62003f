//! Default values and constants for all configuration settings.
//!
//! Contains all `DEFAULT_*` constants and the `Default` implementations of
//! the settings structs.

use std::time::Duration;

use super::settings::*;
use crate::controller::{
    DEFAULT_COMMAND_CHANNEL_CAPACITY, DEFAULT_COMPLETED_HISTORY, DEFAULT_SHUTDOWN_MAX_POLLS,
    DEFAULT_SHUTDOWN_POLL_INTERVAL,
};

// =============================================================================
// Jobs
// =============================================================================

/// Default max jobs: 0 means auto-detect from the CPU count.
pub const DEFAULT_MAX_JOBS: usize = 0;

pub const DEFAULT_ALWAYS_USE_MAX_JOBS: bool = false;

pub const DEFAULT_HOLD_SLOTS_UNTIL_CATALOGED: bool = false;

// =============================================================================
// Controller
// =============================================================================

/// Default shutdown poll interval in milliseconds, as written to config.ini.
pub const DEFAULT_SHUTDOWN_POLL_INTERVAL_MS: u64 = DEFAULT_SHUTDOWN_POLL_INTERVAL.as_millis() as u64;

// =============================================================================
// Logging
// =============================================================================

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "assetproc.log";

// =============================================================================
// Default implementations
// =============================================================================

impl Default for JobsSettings {
    fn default() -> Self {
        Self {
            max_jobs: DEFAULT_MAX_JOBS,
            always_use_max_jobs: DEFAULT_ALWAYS_USE_MAX_JOBS,
            hold_slots_until_cataloged: DEFAULT_HOLD_SLOTS_UNTIL_CATALOGED,
            completed_history: DEFAULT_COMPLETED_HISTORY,
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            command_channel_capacity: DEFAULT_COMMAND_CHANNEL_CAPACITY,
            shutdown_poll_interval: Duration::from_millis(DEFAULT_SHUTDOWN_POLL_INTERVAL_MS),
            shutdown_max_polls: DEFAULT_SHUTDOWN_MAX_POLLS,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: super::file::config_directory().join("logs"),
            file: DEFAULT_LOG_FILE.to_string(),
        }
    }
}
