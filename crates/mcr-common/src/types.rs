//! Domain primitive types used across the mcr workspace.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_CPU_PERIOD_US, DEFAULT_HOSTNAME, HOSTNAME_MAX_LEN};
use crate::error::{McrError, Result};

/// Resource limits for a container.
///
/// A cgroup is only created when at least one limit is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Memory ceiling in bytes (`memory.max`).
    pub memory_bytes: Option<u64>,
    /// CPU quota in microseconds per period (`cpu.max`).
    pub cpu_quota_us: Option<u64>,
    /// CPU bandwidth period in microseconds.
    pub cpu_period_us: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_bytes: None,
            cpu_quota_us: None,
            cpu_period_us: DEFAULT_CPU_PERIOD_US,
        }
    }
}

impl ResourceLimits {
    /// Returns `true` when no limit was requested.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.memory_bytes.is_none() && self.cpu_quota_us.is_none()
    }

    fn validate(&self) -> Result<()> {
        if self.memory_bytes == Some(0) {
            return Err(McrError::invalid_spec("memory limit must be positive"));
        }
        if self.cpu_quota_us == Some(0) {
            return Err(McrError::invalid_spec("CPU quota must be positive"));
        }
        if self.cpu_period_us == 0 {
            return Err(McrError::invalid_spec("CPU period must be positive"));
        }
        Ok(())
    }
}

/// Immutable description of the single process to launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Command and arguments; the first element is the executable.
    pub command: Vec<String>,
    /// Directory that becomes the container's `/`.
    pub rootfs: PathBuf,
    /// Hostname inside the UTS namespace.
    pub hostname: String,
    /// Resource limits applied through cgroups v2.
    pub limits: ResourceLimits,
    /// Detach into a new network namespace (no interfaces are configured).
    pub network: bool,
}

impl ContainerSpec {
    /// Creates a spec with default hostname, no limits and a shared network.
    #[must_use]
    pub fn new(command: Vec<String>, rootfs: impl Into<PathBuf>) -> Self {
        Self {
            command,
            rootfs: rootfs.into(),
            hostname: DEFAULT_HOSTNAME.to_string(),
            limits: ResourceLimits::default(),
            network: false,
        }
    }

    /// Sets the container hostname.
    #[must_use]
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Sets the memory ceiling in bytes.
    #[must_use]
    pub const fn memory_limit(mut self, bytes: u64) -> Self {
        self.limits.memory_bytes = Some(bytes);
        self
    }

    /// Sets the CPU quota in microseconds per period.
    #[must_use]
    pub const fn cpu_quota(mut self, quota_us: u64) -> Self {
        self.limits.cpu_quota_us = Some(quota_us);
        self
    }

    /// Sets the CPU bandwidth period in microseconds.
    #[must_use]
    pub const fn cpu_period(mut self, period_us: u64) -> Self {
        self.limits.cpu_period_us = period_us;
        self
    }

    /// Requests a private network namespace.
    #[must_use]
    pub const fn network(mut self, isolate: bool) -> Self {
        self.network = isolate;
        self
    }

    /// Returns the executable (first command element).
    #[must_use]
    pub fn executable(&self) -> Option<&str> {
        self.command.first().map(String::as_str)
    }

    /// Checks every invariant that can be checked before fork.
    ///
    /// # Errors
    ///
    /// Returns [`McrError::InvalidSpec`] for an empty command, arguments
    /// containing NUL bytes, a rootfs that exists but is not a directory,
    /// an unusable hostname, or non-positive limits.
    pub fn validate(&self) -> Result<()> {
        match self.executable() {
            None => return Err(McrError::invalid_spec("command must not be empty")),
            Some("") => return Err(McrError::invalid_spec("executable must not be empty")),
            Some(_) => {}
        }
        if let Some(arg) = self.command.iter().find(|a| a.contains('\0')) {
            return Err(McrError::invalid_spec(format!(
                "argument contains a NUL byte: {arg:?}"
            )));
        }
        validate_rootfs(&self.rootfs)?;
        if self.hostname.is_empty() || self.hostname.len() > HOSTNAME_MAX_LEN {
            return Err(McrError::invalid_spec(format!(
                "hostname must be 1..={HOSTNAME_MAX_LEN} bytes, got {}",
                self.hostname.len()
            )));
        }
        if self.hostname.contains('\0') {
            return Err(McrError::invalid_spec("hostname contains a NUL byte"));
        }
        self.limits.validate()
    }
}

fn validate_rootfs(rootfs: &Path) -> Result<()> {
    if rootfs.as_os_str().is_empty() {
        return Err(McrError::invalid_spec("rootfs path must not be empty"));
    }
    if !rootfs.is_absolute() {
        return Err(McrError::invalid_spec(format!(
            "rootfs must be an absolute path: {}",
            rootfs.display()
        )));
    }
    if rootfs.exists() && !rootfs.is_dir() {
        return Err(McrError::invalid_spec(format!(
            "rootfs exists but is not a directory: {}",
            rootfs.display()
        )));
    }
    Ok(())
}

/// Terminal status of the managed process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum ExitStatus {
    /// The process called `exit` with this code.
    Exited(i32),
    /// The process was terminated by this signal number.
    Signaled(i32),
}

impl ExitStatus {
    /// Returns the exit code for a normal exit.
    #[must_use]
    pub const fn code(self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(code),
            Self::Signaled(_) => None,
        }
    }

    /// Returns `true` for a normal exit with code 0.
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self, Self::Exited(0))
    }

    /// Exit code a shell would report: the code itself, or `128 + signal`.
    #[must_use]
    pub const fn shell_code(self) -> i32 {
        match self {
            Self::Exited(code) => code,
            Self::Signaled(sig) => 128 + sig,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with code {code}"),
            Self::Signaled(sig) => write!(f, "terminated by signal {sig}"),
        }
    }
}

/// Lifecycle state of the managed process.
///
/// States are ordered; a process only ever moves forward, or to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Supervisor constructed, nothing touched yet.
    Created,
    /// Namespaces being detached.
    Isolating,
    /// Child confined to its root filesystem.
    RootConfined,
    /// Child blocked on the release barrier.
    AwaitingRelease,
    /// Child released to exec the target command.
    Executing,
    /// Child reaped.
    Exited,
    /// Launch aborted.
    Failed,
}

impl LifecycleState {
    /// Returns `true` for `Exited` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Exited | Self::Failed)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Isolating => write!(f, "isolating"),
            Self::RootConfined => write!(f, "root-confined"),
            Self::AwaitingRelease => write!(f, "awaiting-release"),
            Self::Executing => write!(f, "executing"),
            Self::Exited => write!(f, "exited"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Parses memory strings like `512M`, `128MiB`, `1GiB` or plain bytes.
///
/// Single-letter suffixes (`K`, `M`, `G`) are binary, matching cgroup and
/// `ulimit` conventions.
#[allow(clippy::option_if_let_else)]
#[must_use]
pub fn parse_memory(s: &str) -> Option<u64> {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    let s = s.trim();
    let (num_str, multiplier) = if let Some(n) = s.strip_suffix("GiB") {
        (n, GIB)
    } else if let Some(n) = s.strip_suffix("GB") {
        (n, 1_000_000_000)
    } else if let Some(n) = s.strip_suffix('G') {
        (n, GIB)
    } else if let Some(n) = s.strip_suffix("MiB") {
        (n, MIB)
    } else if let Some(n) = s.strip_suffix("MB") {
        (n, 1_000_000)
    } else if let Some(n) = s.strip_suffix('M') {
        (n, MIB)
    } else if let Some(n) = s.strip_suffix("KiB") {
        (n, KIB)
    } else if let Some(n) = s.strip_suffix("KB") {
        (n, 1000)
    } else if let Some(n) = s.strip_suffix('K') {
        (n, KIB)
    } else {
        (s, 1)
    };
    num_str
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
}

/// Converts a CPU percentage of one core (`"50%"`, `"150"`) into a quota
/// for the given period.
#[must_use]
pub fn parse_cpu_percent(s: &str, period_us: u64) -> Option<u64> {
    let s = s.trim();
    let pct = s.strip_suffix('%').unwrap_or(s).trim().parse::<u64>().ok()?;
    if pct == 0 {
        return None;
    }
    period_us.checked_mul(pct).map(|v| v / 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_spec() -> ContainerSpec {
        ContainerSpec::new(vec!["/bin/echo".into(), "hello".into()], "/tmp/rootfs")
    }

    #[test]
    fn new_spec_has_defaults() {
        let spec = echo_spec();
        assert_eq!(spec.hostname, DEFAULT_HOSTNAME);
        assert!(spec.limits.is_empty());
        assert_eq!(spec.limits.cpu_period_us, 100_000);
        assert!(!spec.network);
    }

    #[test]
    fn empty_command_is_rejected() {
        let spec = ContainerSpec::new(vec![], "/tmp/rootfs");
        assert!(matches!(spec.validate(), Err(McrError::InvalidSpec { .. })));
    }

    #[test]
    fn nul_in_argument_is_rejected() {
        let spec = ContainerSpec::new(vec!["/bin/echo".into(), "a\0b".into()], "/tmp/rootfs");
        assert!(matches!(spec.validate(), Err(McrError::InvalidSpec { .. })));
    }

    #[test]
    fn relative_rootfs_is_rejected() {
        let spec = ContainerSpec::new(vec!["/bin/true".into()], "rootfs");
        assert!(matches!(spec.validate(), Err(McrError::InvalidSpec { .. })));
    }

    #[test]
    fn rootfs_pointing_at_file_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let spec = ContainerSpec::new(vec!["/bin/true".into()], file.path());
        assert!(matches!(spec.validate(), Err(McrError::InvalidSpec { .. })));
    }

    #[test]
    fn overlong_hostname_is_rejected() {
        let spec = echo_spec().hostname("h".repeat(65));
        assert!(matches!(spec.validate(), Err(McrError::InvalidSpec { .. })));
    }

    #[test]
    fn zero_limits_are_rejected() {
        assert!(echo_spec().memory_limit(0).validate().is_err());
        assert!(echo_spec().cpu_quota(0).validate().is_err());
        assert!(echo_spec().cpu_quota(50_000).cpu_period(0).validate().is_err());
    }

    #[test]
    fn valid_spec_passes() {
        let spec = echo_spec()
            .hostname("test-container")
            .memory_limit(64 * 1024 * 1024)
            .cpu_quota(50_000);
        assert!(spec.validate().is_ok());
        assert!(!spec.limits.is_empty());
    }

    #[test]
    fn exit_status_shell_code() {
        assert_eq!(ExitStatus::Exited(3).shell_code(), 3);
        assert_eq!(ExitStatus::Signaled(9).shell_code(), 137);
        assert!(ExitStatus::Exited(0).success());
        assert!(!ExitStatus::Signaled(15).success());
    }

    #[test]
    fn lifecycle_states_are_ordered() {
        assert!(LifecycleState::Created < LifecycleState::Isolating);
        assert!(LifecycleState::AwaitingRelease < LifecycleState::Executing);
        assert!(LifecycleState::Exited.is_terminal());
        assert!(!LifecycleState::Executing.is_terminal());
    }

    #[test]
    fn parse_memory_units() {
        assert_eq!(parse_memory("512M"), Some(512 * 1024 * 1024));
        assert_eq!(parse_memory("128MiB"), Some(128 * 1024 * 1024));
        assert_eq!(parse_memory("1GiB"), Some(1024 * 1024 * 1024));
        assert_eq!(parse_memory("1GB"), Some(1_000_000_000));
        assert_eq!(parse_memory("1048576"), Some(1_048_576));
        assert_eq!(parse_memory("abc"), None);
    }

    #[test]
    fn parse_cpu_percent_scales_period() {
        assert_eq!(parse_cpu_percent("50%", 100_000), Some(50_000));
        assert_eq!(parse_cpu_percent("100%", 100_000), Some(100_000));
        assert_eq!(parse_cpu_percent("250", 100_000), Some(250_000));
        assert_eq!(parse_cpu_percent("0%", 100_000), None);
        assert_eq!(parse_cpu_percent("half", 100_000), None);
    }
}
