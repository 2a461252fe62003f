//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`config`] - Configuration management (get, set, list, path)
//! - [`simulate`] - Run the job controller against a synthetic workload
//! - [`slots`] - Show the resolved job budget

pub mod config;
pub mod simulate;
pub mod slots;
