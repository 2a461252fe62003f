//! Slots command: show the job budget the controller would run with.

use assetproc::config::ConfigFile;
use assetproc::controller::ControllerConfig;
use assetproc::system::SystemInfo;

use crate::error::CliError;

/// Print the resolved concurrency budget.
pub fn run() -> Result<(), CliError> {
    let config = ConfigFile::load()?;
    let system = SystemInfo::detect();
    let controller =
        ControllerConfig::from_settings(&config.jobs, &config.controller, system.cpu_cores);
    let slots = controller.slots;

    let source = if config.jobs.max_jobs <= 1 {
        "auto"
    } else {
        "configured"
    };

    println!("Job Slots");
    println!("=========");
    println!();
    println!("  CPU cores:          {}", system.cpu_cores);
    println!("  Recommended:        {}", system.recommended_max_jobs());
    println!("  Max jobs:           {} ({})", slots.max_jobs(), source);
    println!("  Regular jobs:       {}", slots.regular_limit());
    println!("  Critical/escalated: {}", slots.escalated_limit());
    println!(
        "  Catalog hold:       {}",
        if controller.hold_slots_until_cataloged {
            "enabled"
        } else {
            "disabled"
        }
    );

    Ok(())
}
