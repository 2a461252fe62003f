//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing or serialization logic.

use std::path::PathBuf;
use std::time::Duration;

/// Complete application configuration loaded from config.ini.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    /// Job budget and bookkeeping
    pub jobs: JobsSettings,
    /// Controller service plumbing
    pub controller: ControllerSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// Job budget configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobsSettings {
    /// Maximum concurrent jobs. 0 (or 1) means auto-detect from CPU count.
    pub max_jobs: usize,
    /// Let regular jobs use the whole budget instead of half of it.
    pub always_use_max_jobs: bool,
    /// Completed jobs keep their slot until the catalog acknowledges them.
    pub hold_slots_until_cataloged: bool,
    /// Number of finished jobs kept for inspection.
    pub completed_history: usize,
}

/// Controller service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Capacity of the command channel between handles and the service.
    pub command_channel_capacity: usize,
    /// Delay between shutdown drain polls.
    pub shutdown_poll_interval: Duration,
    /// Shutdown drain polls before giving up.
    pub shutdown_max_polls: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Log directory
    pub directory: PathBuf,
    /// Log file name within the directory
    pub file: String,
}
