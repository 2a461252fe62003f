//! assetproc - Asset processing job controller
//!
//! This library schedules asset build jobs: it deduplicates submissions,
//! ranks pending work, runs it under a concurrency budget and reports
//! every state change as an event. The actual builds are done by a
//! pluggable builder.
//!
//! # High-Level API
//!
//! The [`controller`] module provides an async service with a cloneable
//! handle:
//!
//! ```ignore
//! use assetproc::controller::{ControllerConfig, ControllerService};
//!
//! let (service, handle) = ControllerService::new(config, builder.clone(), builder);
//! tokio::spawn(service.run(shutdown.clone()));
//! handle.submit(details).await?;
//! ```

pub mod config;
pub mod controller;
pub mod logging;
pub mod system;

/// Version of the assetproc library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
