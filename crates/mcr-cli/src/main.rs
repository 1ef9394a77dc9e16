//! # mcr: mini container runtime CLI
//!
//! Launches one command inside fresh namespaces, a confined root
//! filesystem and optional cgroup v2 limits, then mirrors its exit code.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

mod commands;
mod logging;
mod output;

use std::process::ExitCode;

use clap::Parser;
use mcr_common::config::RuntimeConfig;

use crate::commands::Cli;

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = RuntimeConfig::from_env()?;
    logging::init(&config.log_level, cli.log_format);
    commands::execute(cli, config)
}
