//! CLI command definitions and dispatch.

pub mod config;
pub mod run;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use mcr_common::config::RuntimeConfig;

use crate::logging::LogFormat;

/// mcr: run one command in an isolated, resource-limited container.
#[derive(Parser, Debug)]
#[command(name = "mcr", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a command inside a new container.
    Run(run::RunArgs),
    /// Print the effective runtime configuration.
    Config(config::ConfigArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli, config: RuntimeConfig) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::Run(args) => run::execute(args, config),
        Command::Config(args) => config::execute(&args, &config),
    }
}
