//! `mcr config`: Print the configuration snapshot.

use std::process::ExitCode;

use clap::Args;
use mcr_common::config::RuntimeConfig;

/// Arguments for the `config` command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Print compact JSON on a single line.
    #[arg(long)]
    pub compact: bool,
}

/// Executes the `config` command.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn execute(args: &ConfigArgs, config: &RuntimeConfig) -> anyhow::Result<ExitCode> {
    let json = if args.compact {
        serde_json::to_string(config)?
    } else {
        serde_json::to_string_pretty(config)?
    };
    #[allow(clippy::print_stdout)]
    {
        println!("{json}");
    }
    Ok(ExitCode::SUCCESS)
}
