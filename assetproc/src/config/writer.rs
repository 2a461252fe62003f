//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! This module contains the `to_config_string()` function that produces
//! the commented INI representation written to `config.ini`.

use std::path::Path;

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    format!(
        r#"[jobs]
; Maximum number of concurrent build jobs (default: 0 = auto)
; Auto-detection: 3 on up to 4 cores, 5 on up to 6 cores, otherwise cores - 2.
; Values below 2 are raised to 2.
max_jobs = {}
; Let regular jobs use every slot (default: false)
; When false, regular jobs get half of the slots and the rest is kept free for
; critical and escalated jobs.
always_use_max_jobs = {}
; Completed jobs keep their slot until their products are in the catalog (default: false)
hold_slots_until_cataloged = {}
; Number of finished jobs kept for status queries (default: 256)
completed_history = {}

[controller]
; Queued commands between callers and the controller (default: 256)
command_channel_capacity = {}
; Delay between shutdown checks for in-flight jobs, in milliseconds (default: 10)
shutdown_poll_interval_ms = {}
; Shutdown checks before giving up on in-flight jobs (default: 3000)
shutdown_max_polls = {}

[logging]
; Log directory (default: ~/.assetproc/logs)
directory = {}
; Log file name (default: assetproc.log)
file = {}
"#,
        config.jobs.max_jobs,
        config.jobs.always_use_max_jobs,
        config.jobs.hold_slots_until_cataloged,
        config.jobs.completed_history,
        config.controller.command_channel_capacity,
        config.controller.shutdown_poll_interval.as_millis(),
        config.controller.shutdown_max_polls,
        path_to_string(&config.logging.directory),
        config.logging.file,
    )
}

/// Convert path to string, collapsing the home directory to ~.
pub(super) fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}
