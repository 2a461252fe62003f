//! assetproc CLI - Command-line interface
//!
//! This binary provides a command-line interface to the assetproc library:
//! configuration management, job budget inspection and a simulation mode
//! that runs the job controller on synthetic build jobs.

mod commands;
mod error;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::simulate::SimulateArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "assetproc")]
#[command(about = "Asset processing job controller", long_about = None)]
#[command(version = assetproc::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// View and modify configuration settings
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Show the job budget derived from configuration and CPU cores
    Slots,

    /// Run the job controller on a synthetic workload
    Simulate(SimulateArgs),
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Config(command) => commands::config::run(command),
        Commands::Slots => commands::slots::run(),
        Commands::Simulate(args) => commands::simulate::run(args),
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        e.exit();
    }
}
