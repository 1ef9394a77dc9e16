//! `mcr run`: Launch one command in a new container.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use mcr_common::config::{NetworkMode, RuntimeConfig};
use mcr_common::constants::DEFAULT_HOSTNAME;
use mcr_common::types::{ContainerSpec, parse_cpu_percent, parse_memory};
use mcr_runtime::runtime::Runtime;
use mcr_runtime::supervisor::RunReport;

use crate::output::{format_bytes, format_duration};

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Directory that becomes the container's root (default: `<MCR_ROOT_FS>/rootfs`).
    #[arg(long)]
    pub rootfs: Option<PathBuf>,

    /// Hostname inside the container.
    #[arg(long)]
    pub hostname: Option<String>,

    /// Memory limit, e.g. `512M`, `128MiB`, `1G` or plain bytes.
    #[arg(short, long)]
    pub memory: Option<String>,

    /// CPU quota in microseconds per period.
    #[arg(long, conflicts_with = "cpus")]
    pub cpu_quota: Option<u64>,

    /// CPU bandwidth period in microseconds.
    #[arg(long)]
    pub cpu_period: Option<u64>,

    /// CPU limit as a percentage of one CPU, e.g. `50%`.
    #[arg(long)]
    pub cpus: Option<String>,

    /// Detach into a private network namespace.
    #[arg(long)]
    pub network: bool,

    /// Kill the container after this many seconds (`0` disables).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Print the run report as JSON on stdout.
    #[arg(long)]
    pub json: bool,

    /// Command and arguments to run inside the container.
    #[arg(last = true, required = true, num_args = 1..)]
    pub command: Vec<String>,
}

/// Executes the `run` command.
///
/// The process exit code mirrors the container's (`128 + signal` when it
/// was killed by a signal).
///
/// # Errors
///
/// Returns an error if the arguments are invalid or the launch fails.
pub fn execute(args: RunArgs, mut config: RuntimeConfig) -> anyhow::Result<ExitCode> {
    if let Some(secs) = args.timeout {
        config.default_timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }
    let spec = build_spec(&args, &config)?;
    tracing::info!(
        command = ?spec.command,
        rootfs = %spec.rootfs.display(),
        hostname = %spec.hostname,
        memory = ?spec.limits.memory_bytes.map(format_bytes),
        cpu_quota_us = ?spec.limits.cpu_quota_us,
        "launching container"
    );

    let runtime = Runtime::new(config).context("cannot start runtime")?;
    let report = runtime
        .run_container(spec)
        .context("container launch failed")?;
    print_report(&report, args.json)?;

    let code = u8::try_from(report.status.shell_code()).unwrap_or(u8::MAX);
    Ok(ExitCode::from(code))
}

/// Merges command-line arguments over the configuration defaults.
fn build_spec(args: &RunArgs, config: &RuntimeConfig) -> anyhow::Result<ContainerSpec> {
    let rootfs = args.rootfs.clone().unwrap_or_else(|| config.default_rootfs());
    let mut spec = ContainerSpec::new(args.command.clone(), rootfs)
        .hostname(args.hostname.as_deref().unwrap_or(DEFAULT_HOSTNAME))
        .network(args.network || config.network == NetworkMode::Private);
    spec.limits = config.default_limits.clone();

    if let Some(period) = args.cpu_period {
        spec = spec.cpu_period(period);
        if let Some(quota) = config.default_limits.cpu_quota_us {
            // Keep the configured share of CPU under the new period.
            let rescaled = rescale_quota(quota, config.default_limits.cpu_period_us, period)
                .context("configured CPU quota does not fit the requested period")?;
            spec = spec.cpu_quota(rescaled);
        }
    }
    if let Some(memory) = &args.memory {
        let bytes = parse_memory(memory)
            .with_context(|| format!("invalid memory size {memory:?}"))?;
        spec = spec.memory_limit(bytes);
    }
    if let Some(quota) = args.cpu_quota {
        spec = spec.cpu_quota(quota);
    } else if let Some(cpus) = &args.cpus {
        let quota = parse_cpu_percent(cpus, spec.limits.cpu_period_us)
            .with_context(|| format!("invalid CPU percentage {cpus:?}"))?;
        spec = spec.cpu_quota(quota);
    }

    spec.validate()?;
    Ok(spec)
}

fn rescale_quota(quota_us: u64, from_period_us: u64, to_period_us: u64) -> Option<u64> {
    if from_period_us == 0 {
        return None;
    }
    quota_us.checked_mul(to_period_us).map(|q| q / from_period_us)
}

fn print_report(report: &RunReport, json: bool) -> anyhow::Result<()> {
    if json {
        let rendered = serde_json::to_string_pretty(report)?;
        #[allow(clippy::print_stdout)]
        {
            println!("{rendered}");
        }
        return Ok(());
    }
    let elapsed = (report.finished_at - report.started_at)
        .to_std()
        .unwrap_or_default();
    tracing::info!(
        pid = report.pid,
        status = %report.status,
        elapsed = %format_duration(elapsed),
        timed_out = report.timed_out,
        "container finished"
    );
    Ok(())
}
