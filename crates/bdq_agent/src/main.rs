//! BDQ agent launcher.
//!
//! The mail and task-queue adapters drive the engine in production; this
//! binary drives the same `run_job` entry point from the command line, for
//! operators and for local debugging of registry/provider setups.

use anyhow::Result;
use bdq_logging::{init_logging, LogConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

mod cli;
mod provider;

#[derive(Parser, Debug)]
#[command(name = "bdq-agent", about = "Darwin Core data-quality assessment pipeline")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run every applicable test over a dataset and write the artifacts
    Run(cli::run::RunArgs),
    /// Inspect the test registry
    Registry(cli::registry::RegistryArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();

    if let Err(err) = init_logging(LogConfig {
        app_name: "bdq_agent",
        verbose: args.verbose,
        log_file: args.log_file.clone(),
    }) {
        eprintln!("failed to initialize logging: {err:#}");
        return ExitCode::FAILURE;
    }

    let result: Result<()> = match args.command {
        Commands::Run(run_args) => cli::run::cmd_run(run_args).await,
        Commands::Registry(registry_args) => cli::registry::cmd_registry(registry_args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
