//! Configuration key access and validation.
//!
//! This module provides a type-safe interface for getting and setting
//! configuration values by key name, with validation via the Specification Pattern.

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use super::parser::expand_tilde;
use super::settings::ConfigFile;
use super::writer::path_to_string;

/// Errors that can occur when getting or setting configuration values.
#[derive(Debug, Error)]
pub enum ConfigKeyError {
    /// Unknown configuration key.
    #[error("Unknown configuration key '{0}'")]
    UnknownKey(String),

    /// Validation failed for the value.
    #[error("Invalid value for {key}: {reason}")]
    ValidationFailed { key: String, reason: String },
}

/// Supported configuration keys.
///
/// Each key maps to a specific field in [`ConfigFile`] and knows how to
/// get and set its value with proper validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    // Jobs settings
    JobsMaxJobs,
    JobsAlwaysUseMaxJobs,
    JobsHoldSlotsUntilCataloged,
    JobsCompletedHistory,

    // Controller settings
    ControllerCommandChannelCapacity,
    ControllerShutdownPollIntervalMs,
    ControllerShutdownMaxPolls,

    // Logging settings
    LoggingDirectory,
    LoggingFile,
}

impl FromStr for ConfigKey {
    type Err = ConfigKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        ConfigKey::all()
            .iter()
            .copied()
            .find(|key| key.name() == lower)
            .ok_or_else(|| ConfigKeyError::UnknownKey(s.to_string()))
    }
}

impl ConfigKey {
    /// Get the canonical key name (e.g., "jobs.max_jobs").
    pub fn name(&self) -> &'static str {
        match self {
            ConfigKey::JobsMaxJobs => "jobs.max_jobs",
            ConfigKey::JobsAlwaysUseMaxJobs => "jobs.always_use_max_jobs",
            ConfigKey::JobsHoldSlotsUntilCataloged => "jobs.hold_slots_until_cataloged",
            ConfigKey::JobsCompletedHistory => "jobs.completed_history",
            ConfigKey::ControllerCommandChannelCapacity => "controller.command_channel_capacity",
            ConfigKey::ControllerShutdownPollIntervalMs => "controller.shutdown_poll_interval_ms",
            ConfigKey::ControllerShutdownMaxPolls => "controller.shutdown_max_polls",
            ConfigKey::LoggingDirectory => "logging.directory",
            ConfigKey::LoggingFile => "logging.file",
        }
    }

    /// Get the section name (e.g., "jobs").
    pub fn section(&self) -> &'static str {
        self.name().split('.').next().unwrap_or("")
    }

    /// Get the key name within the section (e.g., "max_jobs").
    pub fn key_name(&self) -> &'static str {
        self.name().split('.').nth(1).unwrap_or(self.name())
    }

    /// Get the value from a config file as a string.
    pub fn get(&self, config: &ConfigFile) -> String {
        match self {
            ConfigKey::JobsMaxJobs => config.jobs.max_jobs.to_string(),
            ConfigKey::JobsAlwaysUseMaxJobs => config.jobs.always_use_max_jobs.to_string(),
            ConfigKey::JobsHoldSlotsUntilCataloged => {
                config.jobs.hold_slots_until_cataloged.to_string()
            }
            ConfigKey::JobsCompletedHistory => config.jobs.completed_history.to_string(),
            ConfigKey::ControllerCommandChannelCapacity => {
                config.controller.command_channel_capacity.to_string()
            }
            ConfigKey::ControllerShutdownPollIntervalMs => config
                .controller
                .shutdown_poll_interval
                .as_millis()
                .to_string(),
            ConfigKey::ControllerShutdownMaxPolls => {
                config.controller.shutdown_max_polls.to_string()
            }
            ConfigKey::LoggingDirectory => path_to_string(&config.logging.directory),
            ConfigKey::LoggingFile => config.logging.file.clone(),
        }
    }

    /// Set the value in a config file.
    ///
    /// Validates the value according to the key's specification before setting.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigKeyError> {
        self.validate(value)?;
        let value = value.trim();

        match self {
            ConfigKey::JobsMaxJobs => config.jobs.max_jobs = self.parse(value)?,
            ConfigKey::JobsAlwaysUseMaxJobs => config.jobs.always_use_max_jobs = is_true(value),
            ConfigKey::JobsHoldSlotsUntilCataloged => {
                config.jobs.hold_slots_until_cataloged = is_true(value)
            }
            ConfigKey::JobsCompletedHistory => config.jobs.completed_history = self.parse(value)?,
            ConfigKey::ControllerCommandChannelCapacity => {
                config.controller.command_channel_capacity = self.parse(value)?
            }
            ConfigKey::ControllerShutdownPollIntervalMs => {
                config.controller.shutdown_poll_interval = Duration::from_millis(self.parse(value)?)
            }
            ConfigKey::ControllerShutdownMaxPolls => {
                config.controller.shutdown_max_polls = self.parse(value)?
            }
            ConfigKey::LoggingDirectory => config.logging.directory = expand_tilde(value),
            ConfigKey::LoggingFile => config.logging.file = value.to_string(),
        }
        Ok(())
    }

    fn parse<T: FromStr>(&self, value: &str) -> Result<T, ConfigKeyError> {
        value.parse().map_err(|_| ConfigKeyError::ValidationFailed {
            key: self.name().to_string(),
            reason: "value out of range".to_string(),
        })
    }

    /// Validate a value according to this key's specification.
    pub fn validate(&self, value: &str) -> Result<(), ConfigKeyError> {
        self.specification()
            .is_satisfied_by(value.trim())
            .map_err(|reason| ConfigKeyError::ValidationFailed {
                key: self.name().to_string(),
                reason,
            })
    }

    /// Get the validation specification for this key.
    fn specification(&self) -> Box<dyn ValueSpecification> {
        match self {
            ConfigKey::JobsMaxJobs => Box::new(NonNegativeIntegerSpec),
            ConfigKey::JobsAlwaysUseMaxJobs => Box::new(BooleanSpec),
            ConfigKey::JobsHoldSlotsUntilCataloged => Box::new(BooleanSpec),
            ConfigKey::JobsCompletedHistory => Box::new(NonNegativeIntegerSpec),
            ConfigKey::ControllerCommandChannelCapacity => Box::new(PositiveIntegerSpec),
            ConfigKey::ControllerShutdownPollIntervalMs => Box::new(PositiveIntegerSpec),
            ConfigKey::ControllerShutdownMaxPolls => Box::new(PositiveIntegerSpec),
            ConfigKey::LoggingDirectory => Box::new(PathSpec),
            ConfigKey::LoggingFile => Box::new(PathSpec),
        }
    }

    /// Get all supported configuration keys.
    pub fn all() -> &'static [ConfigKey] {
        &[
            ConfigKey::JobsMaxJobs,
            ConfigKey::JobsAlwaysUseMaxJobs,
            ConfigKey::JobsHoldSlotsUntilCataloged,
            ConfigKey::JobsCompletedHistory,
            ConfigKey::ControllerCommandChannelCapacity,
            ConfigKey::ControllerShutdownPollIntervalMs,
            ConfigKey::ControllerShutdownMaxPolls,
            ConfigKey::LoggingDirectory,
            ConfigKey::LoggingFile,
        ]
    }
}

// ============================================================================
// Value Specifications (Specification Pattern)
// ============================================================================

/// Trait for value validation specifications.
trait ValueSpecification {
    /// Returns Ok(()) if valid, Err(reason) if invalid.
    fn is_satisfied_by(&self, value: &str) -> Result<(), String>;
}

/// Integers including zero.
struct NonNegativeIntegerSpec;

impl ValueSpecification for NonNegativeIntegerSpec {
    fn is_satisfied_by(&self, value: &str) -> Result<(), String> {
        value
            .parse::<u32>()
            .map(|_| ())
            .map_err(|_| "must be a non-negative integer".to_string())
    }
}

/// Integers of at least 1.
struct PositiveIntegerSpec;

impl ValueSpecification for PositiveIntegerSpec {
    fn is_satisfied_by(&self, value: &str) -> Result<(), String> {
        match value.parse::<u32>() {
            Ok(n) if n > 0 => Ok(()),
            _ => Err("must be a positive integer".to_string()),
        }
    }
}

/// Specification for boolean values.
struct BooleanSpec;

impl ValueSpecification for BooleanSpec {
    fn is_satisfied_by(&self, value: &str) -> Result<(), String> {
        let lower = value.to_lowercase();
        let valid = ["true", "false", "yes", "no", "1", "0", "on", "off"];
        if valid.contains(&lower.as_str()) {
            Ok(())
        } else {
            Err("must be true/false, yes/no, 1/0, or on/off".to_string())
        }
    }
}

/// Specification for path values (non-empty).
struct PathSpec;

impl ValueSpecification for PathSpec {
    fn is_satisfied_by(&self, value: &str) -> Result<(), String> {
        if value.is_empty() {
            Err("must be a valid path".to_string())
        } else {
            Ok(())
        }
    }
}

fn is_true(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}
