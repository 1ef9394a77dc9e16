//! System-wide constants and default paths.

/// Default storage location for container root filesystems.
pub const DEFAULT_DATA_DIR: &str = "/var/lib/mcr";

/// Directory under the data dir used as the default rootfs.
pub const ROOTFS_DIR_NAME: &str = "rootfs";

/// Cgroups v2 unified hierarchy mount point.
pub const CGROUP_V2_PATH: &str = "/sys/fs/cgroup";

/// Prefix of the per-container cgroup name (`mini_<pid>`).
pub const CGROUP_NAME_PREFIX: &str = "mini_";

/// Default container hostname.
pub const DEFAULT_HOSTNAME: &str = "mini_container";

/// Default CPU bandwidth period in microseconds.
pub const DEFAULT_CPU_PERIOD_US: u64 = 100_000;

/// Longest hostname accepted by `sethostname(2)` (`HOST_NAME_MAX`).
pub const HOSTNAME_MAX_LEN: usize = 64;

/// Default interval between heartbeats while waiting on the child, in seconds.
pub const DEFAULT_HEARTBEAT_SECS: u64 = 5;

/// Default log level when neither `RUST_LOG` nor `MCR_LOG_LEVEL` is set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Environment variable names recognised by [`crate::config::RuntimeConfig`].
pub mod env {
    /// Root filesystem storage location.
    pub const ROOT_FS: &str = "MCR_ROOT_FS";
    /// Cgroup hierarchy root.
    pub const CGROUP_ROOT: &str = "MCR_CGROUP_ROOT";
    /// Default memory limit.
    pub const MEMORY_LIMIT: &str = "MCR_MEMORY_LIMIT";
    /// Default CPU limit as a percentage.
    pub const CPU_LIMIT: &str = "MCR_CPU_LIMIT";
    /// Network namespace mode.
    pub const NET_NS: &str = "MCR_NET_NS";
    /// Log verbosity.
    pub const LOG_LEVEL: &str = "MCR_LOG_LEVEL";
    /// Heartbeat interval in seconds.
    pub const HEARTBEAT_INTERVAL: &str = "MCR_HEARTBEAT_INTERVAL";
    /// Default command timeout in seconds.
    pub const DEFAULT_TIMEOUT: &str = "MCR_DEFAULT_TIMEOUT";
}
