//! System hardware detection.
//!
//! Used to pick a job budget when `max_jobs` is left on auto.
//!
//! # Example
//!
//! ```
//! use assetproc::system::SystemInfo;
//!
//! let info = SystemInfo::detect();
//! println!("CPU cores: {}", info.cpu_cores);
//! println!("Auto job budget: {}", info.recommended_max_jobs());
//! ```

mod hardware;

pub use hardware::{detect_cpu_cores, SystemInfo};
