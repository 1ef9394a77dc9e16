//! Unified error taxonomy for the mcr workspace.
//!
//! Every OS-call failure in the launch pipeline maps to exactly one variant.
//! Failures that happen inside the forked child never reach this type
//! directly: the child exits with a reserved code and the supervisor
//! re-hydrates it into the matching variant.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum McrError {
    /// The caller is not the host superuser.
    #[error("permission denied: mcr must run as root (effective uid {euid})")]
    Privilege {
        /// Effective uid observed at construction time.
        euid: u32,
    },

    /// The container specification was rejected before fork.
    #[error("invalid container spec: {message}")]
    InvalidSpec {
        /// Description of the rejected field.
        message: String,
    },

    /// `fork(2)` failed; nothing was created yet.
    #[error("fork failed: {source}")]
    Fork {
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// `unshare(2)` or mount propagation change was rejected.
    #[error("namespace isolation failed: {message}")]
    Isolation {
        /// Description of the failed request.
        message: String,
        /// Underlying OS error, absent when reported through an exit code.
        source: Option<std::io::Error>,
    },

    /// `sethostname(2)` was rejected.
    #[error("failed to set hostname {hostname:?}")]
    Hostname {
        /// Requested hostname.
        hostname: String,
        /// Underlying OS error, absent when reported through an exit code.
        source: Option<std::io::Error>,
    },

    /// Root filesystem confinement failed.
    #[error("rootfs confinement failed at {path}: {message}")]
    Rootfs {
        /// Requested root filesystem.
        path: PathBuf,
        /// Description of the failed step.
        message: String,
    },

    /// Writing a cgroup control file failed.
    ///
    /// Limits written before the failing one are listed in `applied`, so a
    /// half-applied set is reported as one failure.
    #[error("resource limit failed: {control} in {cgroup}: {source} (already applied: {applied:?})")]
    ResourceLimit {
        /// Cgroup directory being configured.
        cgroup: PathBuf,
        /// Control file or step that failed.
        control: String,
        /// Control files successfully written before the failure.
        applied: Vec<String>,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The child could not replace its image with the target command.
    #[error("failed to execute {command:?}")]
    Exec {
        /// Executable that could not be started.
        command: String,
    },

    /// An I/O operation outside the cgroup surface failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },
}

impl McrError {
    /// Shorthand for an [`McrError::InvalidSpec`].
    pub fn invalid_spec(message: impl Into<String>) -> Self {
        Self::InvalidSpec {
            message: message.into(),
        }
    }

    /// Shorthand for an [`McrError::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, McrError>;
