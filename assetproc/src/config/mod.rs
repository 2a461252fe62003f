//! Configuration file support.
//!
//! Settings are read from `~/.assetproc/config.ini`. A missing file means
//! defaults; an invalid value is an error naming the offending key.
//!
//! # Example
//!
//! ```no_run
//! use assetproc::config::{ConfigFile, ConfigKey};
//!
//! let mut config = ConfigFile::load()?;
//! ConfigKey::JobsMaxJobs.set(&mut config, "6")?;
//! config.save()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod defaults;
mod file;
mod keys;
mod parser;
mod settings;
mod writer;

pub use defaults::{
    DEFAULT_ALWAYS_USE_MAX_JOBS, DEFAULT_HOLD_SLOTS_UNTIL_CATALOGED, DEFAULT_LOG_FILE,
    DEFAULT_MAX_JOBS, DEFAULT_SHUTDOWN_POLL_INTERVAL_MS,
};
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use keys::{ConfigKey, ConfigKeyError};
pub use settings::{ConfigFile, ControllerSettings, JobsSettings, LoggingSettings};
