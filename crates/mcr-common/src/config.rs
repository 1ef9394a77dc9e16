//! Runtime configuration snapshot.
//!
//! The environment is read exactly once, by [`RuntimeConfig::from_env`], and
//! the resulting value is passed explicitly to the runtime. Nothing inside
//! the launch pipeline reads environment variables.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{self, env};
use crate::error::{McrError, Result};
use crate::types::{ResourceLimits, parse_cpu_percent, parse_memory};

/// How the container's network namespace is handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    /// Share the host network stack.
    #[default]
    Host,
    /// Detach into an empty network namespace.
    Private,
}

impl NetworkMode {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "host" | "" => Ok(Self::Host),
            "private" | "isolated" | "none" => Ok(Self::Private),
            other => Err(McrError::config(format!(
                "{}: unknown network mode {other:?}",
                env::NET_NS
            ))),
        }
    }
}

/// Root configuration for the mcr runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Base directory for container root filesystems.
    pub data_dir: PathBuf,
    /// Cgroup v2 hierarchy root.
    pub cgroup_root: PathBuf,
    /// Limits applied when the caller does not override them.
    pub default_limits: ResourceLimits,
    /// Network namespace handling.
    pub network: NetworkMode,
    /// Log filter directive.
    pub log_level: String,
    /// Interval between heartbeat events while waiting on the child.
    pub heartbeat_interval: Option<Duration>,
    /// Deadline after which the child is killed.
    pub default_timeout: Option<Duration>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(constants::DEFAULT_DATA_DIR),
            cgroup_root: PathBuf::from(constants::CGROUP_V2_PATH),
            default_limits: ResourceLimits::default(),
            network: NetworkMode::Host,
            log_level: constants::DEFAULT_LOG_LEVEL.to_string(),
            heartbeat_interval: Some(Duration::from_secs(constants::DEFAULT_HEARTBEAT_SECS)),
            default_timeout: None,
        }
    }
}

impl RuntimeConfig {
    /// Builds the snapshot from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`McrError::Config`] if a variable holds an unparsable value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the snapshot from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`McrError::Config`] if a variable holds an unparsable value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup(env::ROOT_FS) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(root) = lookup(env::CGROUP_ROOT) {
            config.cgroup_root = PathBuf::from(root);
        }
        if let Some(mem) = lookup(env::MEMORY_LIMIT) {
            let bytes = parse_memory(&mem).filter(|b| *b > 0).ok_or_else(|| {
                McrError::config(format!("{}: invalid memory size {mem:?}", env::MEMORY_LIMIT))
            })?;
            config.default_limits.memory_bytes = Some(bytes);
        }
        if let Some(cpu) = lookup(env::CPU_LIMIT) {
            let period = config.default_limits.cpu_period_us;
            let quota = parse_cpu_percent(&cpu, period).ok_or_else(|| {
                McrError::config(format!("{}: invalid CPU percentage {cpu:?}", env::CPU_LIMIT))
            })?;
            config.default_limits.cpu_quota_us = Some(quota);
        }
        if let Some(mode) = lookup(env::NET_NS) {
            config.network = NetworkMode::parse(&mode)?;
        }
        if let Some(level) = lookup(env::LOG_LEVEL) {
            config.log_level = level.trim().to_ascii_lowercase();
        }
        if let Some(secs) = lookup(env::HEARTBEAT_INTERVAL) {
            config.heartbeat_interval = parse_seconds(env::HEARTBEAT_INTERVAL, &secs)?;
        }
        if let Some(secs) = lookup(env::DEFAULT_TIMEOUT) {
            config.default_timeout = parse_seconds(env::DEFAULT_TIMEOUT, &secs)?;
        }

        Ok(config)
    }

    /// Default root filesystem path (`<data_dir>/rootfs`).
    #[must_use]
    pub fn default_rootfs(&self) -> PathBuf {
        self.data_dir.join(constants::ROOTFS_DIR_NAME)
    }
}

/// Parses a whole number of seconds; `0` disables the feature.
fn parse_seconds(key: &str, value: &str) -> Result<Option<Duration>> {
    let secs = value
        .trim()
        .parse::<u64>()
        .map_err(|e| McrError::config(format!("{key}: invalid seconds {value:?}: {e}")))?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = RuntimeConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert!(config.default_limits.is_empty());
        assert_eq!(config.default_rootfs(), PathBuf::from("/var/lib/mcr/rootfs"));
    }

    #[test]
    fn environment_overrides_are_applied() {
        let config = RuntimeConfig::from_lookup(lookup_from(&[
            ("MCR_ROOT_FS", "/srv/mcr"),
            ("MCR_CGROUP_ROOT", "/tmp/cg"),
            ("MCR_MEMORY_LIMIT", "512M"),
            ("MCR_CPU_LIMIT", "50%"),
            ("MCR_NET_NS", "private"),
            ("MCR_LOG_LEVEL", "DEBUG"),
            ("MCR_HEARTBEAT_INTERVAL", "0"),
            ("MCR_DEFAULT_TIMEOUT", "60"),
        ]))
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/srv/mcr"));
        assert_eq!(config.cgroup_root, PathBuf::from("/tmp/cg"));
        assert_eq!(config.default_limits.memory_bytes, Some(512 * 1024 * 1024));
        assert_eq!(config.default_limits.cpu_quota_us, Some(50_000));
        assert_eq!(config.network, NetworkMode::Private);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.heartbeat_interval, None);
        assert_eq!(config.default_timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for pair in [
            ("MCR_MEMORY_LIMIT", "lots"),
            ("MCR_CPU_LIMIT", "fast"),
            ("MCR_NET_NS", "bridge"),
            ("MCR_DEFAULT_TIMEOUT", "-1"),
        ] {
            let result = RuntimeConfig::from_lookup(lookup_from(&[pair]));
            assert!(
                matches!(result, Err(McrError::Config { .. })),
                "{pair:?} should be rejected"
            );
        }
    }
}
