//! Reserved exit codes: the error wire format from child to supervisor.
//!
//! The forked child cannot hand a typed error across the process boundary.
//! It exits with one of these codes instead and the supervisor turns the
//! code back into an [`McrError`].

use mcr_common::error::McrError;
use mcr_common::types::ContainerSpec;

/// Why the container child exited before (or instead of) running the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ChildExit {
    /// Root filesystem confinement failed.
    RootfsFailed = 121,
    /// `sethostname(2)` failed.
    HostnameFailed = 122,
    /// The handshake with the supervisor broke before release.
    ReleaseAborted = 123,
    /// `execvp(3)` failed.
    ExecFailed = 124,
}

impl ChildExit {
    /// Every reserved code.
    pub const ALL: [Self; 4] = [
        Self::RootfsFailed,
        Self::HostnameFailed,
        Self::ReleaseAborted,
        Self::ExecFailed,
    ];

    /// Process exit code carrying this reason.
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Decodes a reserved exit code.
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    /// Rebuilds the typed error the child could not return.
    #[must_use]
    pub fn into_error(self, spec: &ContainerSpec) -> McrError {
        match self {
            Self::RootfsFailed => McrError::Rootfs {
                path: spec.rootfs.clone(),
                message: format!("container child exited with code {}", self.code()),
            },
            Self::HostnameFailed => McrError::Hostname {
                hostname: spec.hostname.clone(),
                source: None,
            },
            Self::ReleaseAborted => McrError::Isolation {
                message: "container child aborted at the release barrier".into(),
                source: None,
            },
            Self::ExecFailed => McrError::Exec {
                command: spec.executable().unwrap_or_default().to_string(),
            },
        }
    }
}
