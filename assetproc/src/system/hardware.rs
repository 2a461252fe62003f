//! CPU detection with a fallback for unsupported platforms.

use crate::controller::{auto_max_jobs, FALLBACK_CPU_COUNT};

/// Detected system hardware information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemInfo {
    /// Number of logical CPU cores
    pub cpu_cores: usize,
}

impl SystemInfo {
    /// Detect the current machine.
    pub fn detect() -> Self {
        Self {
            cpu_cores: detect_cpu_cores(),
        }
    }

    /// Create SystemInfo with specific values (for testing).
    #[cfg(test)]
    pub fn new(cpu_cores: usize) -> Self {
        Self { cpu_cores }
    }

    /// Job budget used when `max_jobs` is set to auto.
    pub fn recommended_max_jobs(&self) -> usize {
        auto_max_jobs(self.cpu_cores)
    }
}

/// Detect the number of logical CPU cores.
///
/// Falls back to [`FALLBACK_CPU_COUNT`] if detection fails.
pub fn detect_cpu_cores() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(FALLBACK_CPU_COUNT)
}
