//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This module contains the `parse_ini()` function and its helpers.
//! It is the single place where INI key names are mapped to struct fields.

use ini::{Ini, Properties};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::file::ConfigFileError;
use super::settings::ConfigFile;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [jobs] section
    if let Some(section) = ini.section(Some("jobs")) {
        if let Some(v) = parse_number(section, "jobs", "max_jobs")? {
            config.jobs.max_jobs = v;
        }
        if let Some(v) = parse_bool(section, "jobs", "always_use_max_jobs")? {
            config.jobs.always_use_max_jobs = v;
        }
        if let Some(v) = parse_bool(section, "jobs", "hold_slots_until_cataloged")? {
            config.jobs.hold_slots_until_cataloged = v;
        }
        if let Some(v) = parse_number(section, "jobs", "completed_history")? {
            config.jobs.completed_history = v;
        }
    }

    // [controller] section
    if let Some(section) = ini.section(Some("controller")) {
        if let Some(v) = parse_number::<usize>(section, "controller", "command_channel_capacity")? {
            if v == 0 {
                return Err(invalid(
                    "controller",
                    "command_channel_capacity",
                    "0",
                    "must be at least 1",
                ));
            }
            config.controller.command_channel_capacity = v;
        }
        if let Some(v) = parse_number(section, "controller", "shutdown_poll_interval_ms")? {
            config.controller.shutdown_poll_interval = Duration::from_millis(v);
        }
        if let Some(v) = parse_number(section, "controller", "shutdown_max_polls")? {
            config.controller.shutdown_max_polls = v;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = v.to_string();
            }
        }
    }

    Ok(config)
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_number<T: FromStr>(
    section: &Properties,
    section_name: &str,
    key: &str,
) -> Result<Option<T>, ConfigFileError> {
    let Some(v) = section.get(key) else {
        return Ok(None);
    };
    v.trim()
        .parse()
        .map(Some)
        .map_err(|_| invalid(section_name, key, v, "must be a positive integer"))
}

fn parse_bool(
    section: &Properties,
    section_name: &str,
    key: &str,
) -> Result<Option<bool>, ConfigFileError> {
    let Some(v) = section.get(key) else {
        return Ok(None);
    };
    match v.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(Some(true)),
        "false" | "no" | "0" | "off" => Ok(Some(false)),
        _ => Err(invalid(
            section_name,
            key,
            v,
            "must be true/false, yes/no, 1/0, or on/off",
        )),
    }
}

/// Expand ~ to home directory in paths.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
