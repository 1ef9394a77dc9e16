//! Container lifecycle events.
//!
//! The supervisor reports each transition it observes to an injected
//! [`LifecycleObserver`]. The default [`TracingObserver`] turns them into
//! `tracing` records; tests substitute a recording observer.

use std::time::Duration;

use mcr_common::types::ExitStatus;
use mcr_core::namespace::NamespaceSet;

/// A lifecycle transition observed by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The supervisor detached into new namespaces.
    Isolated {
        /// Namespaces requested.
        namespaces: NamespaceSet,
    },
    /// The container child was forked.
    Forked {
        /// Child pid in the supervisor's PID namespace.
        pid: u32,
    },
    /// The child reported a confined root filesystem.
    Confined {
        /// Child pid.
        pid: u32,
    },
    /// Resource limits are in force for the child.
    Limited {
        /// Child pid.
        pid: u32,
        /// Cgroup name.
        cgroup: String,
        /// Control files written.
        applied: Vec<String>,
    },
    /// The child was released to exec the target command.
    Released {
        /// Child pid.
        pid: u32,
    },
    /// The child is still running.
    Heartbeat {
        /// Child pid.
        pid: u32,
        /// Time since release.
        elapsed: Duration,
    },
    /// The caller's deadline expired and the child is being killed.
    DeadlineExpired {
        /// Child pid.
        pid: u32,
        /// Configured deadline.
        deadline: Duration,
    },
    /// The supervisor killed the child before release.
    Terminated {
        /// Child pid.
        pid: u32,
        /// Why it was killed.
        reason: String,
    },
    /// The child was reaped.
    Exited {
        /// Child pid.
        pid: u32,
        /// Terminal status.
        status: ExitStatus,
    },
    /// The launch failed.
    Failed {
        /// Rendered error.
        error: String,
    },
}

/// Receives lifecycle events from the supervisor.
///
/// Called only in the supervisor process, never in the forked child.
pub trait LifecycleObserver: Send + Sync {
    /// Handles one event.
    fn on_event(&self, event: &LifecycleEvent);
}

/// Observer that logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl LifecycleObserver for TracingObserver {
    fn on_event(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::Isolated { namespaces } => {
                tracing::info!(%namespaces, "namespaces isolated");
            }
            LifecycleEvent::Forked { pid } => tracing::info!(pid, "container process forked"),
            LifecycleEvent::Confined { pid } => tracing::info!(pid, "root filesystem confined"),
            LifecycleEvent::Limited {
                pid,
                cgroup,
                applied,
            } => tracing::info!(pid, %cgroup, ?applied, "resource limits applied"),
            LifecycleEvent::Released { pid } => tracing::info!(pid, "container released"),
            LifecycleEvent::Heartbeat { pid, elapsed } => {
                tracing::debug!(pid, elapsed_secs = elapsed.as_secs(), "container running");
            }
            LifecycleEvent::DeadlineExpired { pid, deadline } => {
                tracing::warn!(pid, deadline_secs = deadline.as_secs(), "deadline expired, killing container");
            }
            LifecycleEvent::Terminated { pid, reason } => {
                tracing::warn!(pid, %reason, "container terminated before release");
            }
            LifecycleEvent::Exited { pid, status } => tracing::info!(pid, %status, "container exited"),
            LifecycleEvent::Failed { error } => tracing::error!(%error, "container launch failed"),
        }
    }
}

/// Observer that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl LifecycleObserver for NullObserver {
    fn on_event(&self, _event: &LifecycleEvent) {}
}
